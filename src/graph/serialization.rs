//! Flow map document format for saving and loading.
//!
//! A document carries the flat settings record, optional arrow and draw
//! settings, and the flows. Nodes are implicit in the flow endpoints.

use crate::core::error::FlowMapResult;
use crate::core::settings::{ArrowSettings, DrawSettings, Settings};
use crate::graph::flow::FlowRecord;
use crate::graph::structure::FlowGraph;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Serializable representation of a complete flow map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowMapDocument {
    /// Flat settings record, applied strictly on load.
    pub settings: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrow_settings: Option<ArrowSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draw_settings: Option<DrawSettings>,
    #[serde(default)]
    pub flows: Vec<FlowRecord>,
}

impl FlowMapDocument {
    /// A document with the given settings and no flows.
    pub fn new(settings: &Settings) -> Self {
        Self {
            settings: settings.to_record(),
            arrow_settings: None,
            draw_settings: None,
            flows: Vec::new(),
        }
    }

    pub fn with_arrow_settings(mut self, arrow: ArrowSettings) -> Self {
        self.arrow_settings = Some(arrow);
        self
    }

    pub fn with_draw_settings(mut self, draw: DrawSettings) -> Self {
        self.draw_settings = Some(draw);
        self
    }

    /// Take the flows of a graph, in flow order.
    pub fn with_flows_from(mut self, graph: &FlowGraph) -> Self {
        self.flows = flow_records(graph);
        self
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Serialize to compact JSON (no whitespace).
    pub fn to_json_compact(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Write the document to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> FlowMapResult<()> {
        std::fs::write(path.as_ref(), self.to_json()?)?;
        log::info!("Saved {} flows to {}", self.flows.len(), path.as_ref().display());
        Ok(())
    }

    /// Read a document from a file.
    pub fn load(path: impl AsRef<Path>) -> FlowMapResult<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Ok(Self::from_json(&json)?)
    }
}

/// Every flow as a record with both endpoints and its control point.
pub fn flow_records(graph: &FlowGraph) -> Vec<FlowRecord> {
    graph
        .flows()
        .filter_map(|flow| {
            let (start, end) = graph.flow_endpoints(flow.id)?;
            Some(FlowRecord {
                start_pt: start.to_record(),
                end_pt: end.to_record(),
                c_pt: Some(flow.ctrl),
                value: Some(flow.value),
                id: flow.record_id.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::projection::Equirectangular;
    use crate::core::types::Point;
    use crate::graph::node::PointRecord;

    #[test]
    fn test_serialize_document() {
        let mut graph = FlowGraph::new();
        graph
            .add_flow(
                &FlowRecord::new(PointRecord::new(1.0, 2.0).with_value(4.0), PointRecord::new(3.0, 4.0), 9.0)
                    .with_ctrl_pt(Point::new(5.0, 6.0)),
                &Equirectangular::default(),
            )
            .unwrap();

        let doc = FlowMapDocument::new(&Settings::default()).with_flows_from(&graph);
        let json = doc.to_json().unwrap();
        assert!(json.contains("\"maxFlowPoints\": 20"));
        assert!(json.contains("\"cPt\""));
        assert!(!json.contains("arrowSettings"));

        let back = FlowMapDocument::from_json(&json).unwrap();
        assert_eq!(back, doc);
        assert_eq!(back.flows[0].c_pt, Some(Point::new(5.0, 6.0)));
        assert_eq!(back.flows[0].start_pt.value, Some(4.0));
    }

    #[test]
    fn test_optional_blocks() {
        let json = r#"{
            "settings": {},
            "drawSettings": {"drawNodes": true},
            "flows": []
        }"#;
        let doc = FlowMapDocument::from_json(json).unwrap();
        assert!(doc.arrow_settings.is_none());
        let draw = doc.draw_settings.unwrap();
        assert!(draw.draw_nodes);
        assert!(draw.draw_flows);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.json");
        let doc = FlowMapDocument::new(&Settings::default()).with_arrow_settings(ArrowSettings::default());
        doc.save(&path).unwrap();
        assert_eq!(FlowMapDocument::load(&path).unwrap(), doc);
    }
}
