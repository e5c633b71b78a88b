//! Flowmap CLI - inspect and prepare flow map documents.

use anyhow::{bail, Context, Result};
use flowmap::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage(&args[0]);
        return;
    }

    let result = match args[1].as_str() {
        "stats" => with_document(&args, show_stats),
        "nodes" => with_document(&args, |map| print_table(&map.node_table(false))),
        "flows" => with_document(&args, |map| print_table(&map.flow_table())),
        "prepare" => prepare(&args[2..]),
        "help" | "--help" | "-h" => {
            print_usage(&args[0]);
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            print_usage(&args[0]);
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn print_usage(program: &str) {
    println!("🗺️  Flowmap - Flow Map Graph Engine v{}", flowmap::VERSION);
    println!();
    println!("Usage: {} <command> [options]", program);
    println!();
    println!("Commands:");
    println!("  stats <doc>       Show node and flow statistics");
    println!("  nodes <doc>       Print the node table as JSON");
    println!("  flows <doc>       Print the flow table as JSON");
    println!("  prepare <doc> [options]  Compute flow geometry");
    println!("  help              Show this help message");
    println!();
    println!("Prepare options:");
    println!("  --settings <toml>   Use settings from a TOML file");
    println!("  --output <doc>      Write the prepared document (default: summary only)");
}

fn load(path: &str) -> Result<FlowMap> {
    FlowMap::load(path).with_context(|| format!("could not load {}", path))
}

fn with_document(args: &[String], action: impl FnOnce(&FlowMap) -> Result<()>) -> Result<()> {
    let Some(path) = args.get(2) else {
        bail!("please specify a document");
    };
    action(&load(path)?)
}

fn show_stats(map: &FlowMap) -> Result<()> {
    let stats = map.aggregates();
    println!("Flows: {}", stats.flow_count);
    println!(
        "  value  min {:.3}  max {:.3}  mean {}",
        stats.min_flow_value,
        stats.max_flow_value,
        format_mean(stats.mean_flow_value())
    );
    println!(
        "  length min {:.3}  max {:.3}",
        stats.min_flow_length, stats.max_flow_length
    );
    println!("Nodes: {}", stats.node_count);
    println!(
        "  value  min {:.3}  max {:.3}  mean {}",
        stats.min_node_value,
        stats.max_node_value,
        format_mean(stats.mean_node_value())
    );

    let paired = map.graph().flows().filter(|f| f.opposite().is_some()).count();
    let locked = map.locks().into_iter().filter(|l| *l).count();
    println!("Opposite pairs: {}  Locked flows: {}", paired / 2, locked);
    Ok(())
}

fn format_mean(mean: Option<f64>) -> String {
    mean.map_or_else(|| "-".to_string(), |m| format!("{:.3}", m))
}

fn print_table(table: &Table) -> Result<()> {
    println!("{}", table.to_json()?);
    Ok(())
}

fn prepare(args: &[String]) -> Result<()> {
    let Some(input) = args.first() else {
        bail!("please specify a document");
    };

    let mut settings_path: Option<PathBuf> = None;
    let mut output: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--settings" if i + 1 < args.len() => {
                settings_path = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--output" if i + 1 < args.len() => {
                output = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                i += 1;
            }
        }
    }

    let mut map = load(input)?;
    if let Some(path) = settings_path {
        let settings = Settings::load(&path)
            .with_context(|| format!("could not read settings from {}", path.display()))?;
        map.set_settings(settings)?;
    }

    let options = JobOptions::default().with_progress(Arc::new(|update| match update {
        ProgressUpdate::PhaseStarted { phase, index, total } => {
            println!("  [{}/{}] {}", index + 1, total, phase);
        }
        ProgressUpdate::Completed { total_duration_ms } => {
            println!("✅ Done in {}ms", total_duration_ms);
        }
        _ => {}
    }));

    println!("⚙️  Preparing {} flows from {}", map.graph().flow_count(), input);
    let prepared = spawn_prepare(&map, options).wait()?;
    map.commit(prepared)?;

    let hidden = map
        .graph()
        .flows()
        .filter(|f| f.line_segments().map_or(false, |s| s.is_empty()))
        .count();
    let arrows = map.graph().flows().filter(|f| f.arrow().is_some()).count();
    println!("Arrows: {}  Hidden by node symbols: {}", arrows, hidden);

    if let Some(path) = output {
        map.save(&path)
            .with_context(|| format!("could not write {}", path.display()))?;
        println!("💾 Saved to {}", path.display());
    }
    Ok(())
}
