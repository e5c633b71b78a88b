//! Editable node and flow tables for data-grid widgets.

use crate::core::types::RecordId;
use crate::graph::structure::FlowGraph;
use serde::Serialize;
use serde_json::{json, Value};

/// Data type of a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Double,
    Html,
}

/// Column description.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableColumn {
    pub name: String,
    pub label: String,
    pub datatype: ColumnType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decimal_point: Option<char>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thousands_separator: Option<char>,
    pub editable: bool,
}

impl TableColumn {
    fn new(name: &str, label: &str, datatype: ColumnType, editable: bool) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            datatype,
            decimal_point: None,
            thousands_separator: None,
            editable,
        }
    }

    /// Numbers shown with `.` as decimal point and `,` between thousands.
    fn grouped(mut self) -> Self {
        self.decimal_point = Some('.');
        self.thousands_separator = Some(',');
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub id: RecordId,
    pub values: serde_json::Map<String, Value>,
}

/// Column metadata plus rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub metadata: Vec<TableColumn>,
    pub data: Vec<TableRow>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&TableColumn> {
        self.metadata.iter().find(|c| c.name == name)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn row_id(record_id: Option<&RecordId>, index: usize) -> RecordId {
    record_id.cloned().unwrap_or(RecordId::Number(index as i64))
}

/// One row per node. Nodes without a record id are keyed by row index.
pub fn node_table(graph: &FlowGraph, editable: bool) -> Table {
    let metadata = vec![
        TableColumn::new("id", "ID", ColumnType::String, false),
        TableColumn::new("lat", "LAT", ColumnType::Double, editable),
        TableColumn::new("lng", "LNG", ColumnType::Double, editable),
        TableColumn::new("value", "VALUE", ColumnType::Double, editable).grouped(),
        TableColumn::new("action", " ", ColumnType::Html, false),
    ];

    let data = graph
        .nodes()
        .enumerate()
        .map(|(i, node)| {
            let id = row_id(node.record_id.as_ref(), i);
            let mut values = serde_json::Map::new();
            values.insert("id".to_string(), json!(id));
            values.insert("lat".to_string(), json!(node.lat));
            values.insert("lng".to_string(), json!(node.lng));
            values.insert("value".to_string(), json!(node.value));
            TableRow { id, values }
        })
        .collect();

    Table { metadata, data }
}

/// One row per flow, in flow order.
pub fn flow_table(graph: &FlowGraph) -> Table {
    let metadata = vec![
        TableColumn::new("id", "ID", ColumnType::String, false),
        TableColumn::new("start", "START", ColumnType::String, false),
        TableColumn::new("end", "END", ColumnType::String, false),
        TableColumn::new("value", "VALUE", ColumnType::Double, true).grouped(),
        TableColumn::new("action", " ", ColumnType::Html, false),
    ];

    let data = graph
        .flows()
        .enumerate()
        .map(|(i, flow)| {
            let id = row_id(flow.record_id.as_ref(), i);
            let endpoint_id = |node| {
                graph
                    .node(node)
                    .and_then(|n| n.record_id.as_ref())
                    .map_or(Value::Null, |r| json!(r))
            };
            let mut values = serde_json::Map::new();
            values.insert("id".to_string(), json!(id));
            values.insert("start".to_string(), endpoint_id(flow.start()));
            values.insert("end".to_string(), endpoint_id(flow.end()));
            values.insert("value".to_string(), json!(flow.value));
            TableRow { id, values }
        })
        .collect();

    Table { metadata, data }
}
