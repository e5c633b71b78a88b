//! Layout, appearance, arrow and draw settings.
//!
//! Settings are plain values. The geometry formulas borrow them read-only and
//! the layout optimizer receives them verbatim through the persisted
//! document. Applying a flat record is strict: every recognized key must be
//! present, unknown keys are ignored.

use crate::core::error::{SettingsError, SettingsResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Layout and map appearance parameters.
///
/// Field names serialize in camelCase to match the document format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    // Layout
    pub max_flow_points: u32,
    pub distance_weight_exponent: f64,
    pub peripheral_stiffness_factor: f64,
    pub max_flow_length_spring_constant: f64,
    pub min_flow_length_spring_constant: f64,
    pub enforce_rangebox: bool,
    pub flow_rangebox_height: f64,
    pub anti_torsion_weight: f64,
    pub angular_distribution_weight: f64,
    pub node_weight: f64,
    pub node_tolerance_px: f64,
    pub move_flows_intersecting_nodes: bool,
    pub multiple_iterations: bool,
    pub iteration_count: u32,
    pub show_force_animation: bool,
    pub flow_distance_threshold: f64,
    pub check_flow_bounding_boxes: bool,
    pub max_flows: u32,
    pub map_scale: f64,

    // Map appearance
    pub max_flow_width: f64,
    pub max_node_radius: f64,
    pub is_show_locked_flows: bool,
    pub flow_distance_from_start_point_pixel: f64,
    pub flow_distance_from_end_point_pixel: f64,
    pub node_stroke_width: f64,

    pub dataset_name: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_flow_points: 20,
            distance_weight_exponent: 3.0,
            peripheral_stiffness_factor: 0.1,
            max_flow_length_spring_constant: 0.05,
            min_flow_length_spring_constant: 0.5,
            enforce_rangebox: true,
            flow_rangebox_height: 0.3,
            anti_torsion_weight: 0.8,
            angular_distribution_weight: 0.5,
            node_weight: 0.0,
            node_tolerance_px: 5.0,
            move_flows_intersecting_nodes: true,
            multiple_iterations: true,
            iteration_count: 100,
            show_force_animation: false,
            flow_distance_threshold: 0.000_000_01,
            check_flow_bounding_boxes: true,
            max_flows: 50,
            map_scale: 0.5,
            max_flow_width: 30.0,
            max_node_radius: 5.0,
            is_show_locked_flows: true,
            flow_distance_from_start_point_pixel: 5.0,
            flow_distance_from_end_point_pixel: 5.0,
            node_stroke_width: 0.5,
            dataset_name: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyKind {
    Count,
    Number,
    Flag,
    OptionalText,
}

/// Every key a settings record must carry, with its expected JSON type.
const RECOGNIZED_KEYS: &[(&str, KeyKind)] = &[
    ("maxFlowPoints", KeyKind::Count),
    ("distanceWeightExponent", KeyKind::Number),
    ("peripheralStiffnessFactor", KeyKind::Number),
    ("maxFlowLengthSpringConstant", KeyKind::Number),
    ("minFlowLengthSpringConstant", KeyKind::Number),
    ("enforceRangebox", KeyKind::Flag),
    ("flowRangeboxHeight", KeyKind::Number),
    ("maxFlowWidth", KeyKind::Number),
    ("maxNodeRadius", KeyKind::Number),
    ("antiTorsionWeight", KeyKind::Number),
    ("angularDistributionWeight", KeyKind::Number),
    ("nodeWeight", KeyKind::Number),
    ("nodeTolerancePx", KeyKind::Number),
    ("moveFlowsIntersectingNodes", KeyKind::Flag),
    ("multipleIterations", KeyKind::Flag),
    ("isShowLockedFlows", KeyKind::Flag),
    ("nodeStrokeWidth", KeyKind::Number),
    ("iterationCount", KeyKind::Count),
    ("showForceAnimation", KeyKind::Flag),
    ("flowDistanceThreshold", KeyKind::Number),
    ("flowDistanceFromStartPointPixel", KeyKind::Number),
    ("flowDistanceFromEndPointPixel", KeyKind::Number),
    ("checkFlowBoundingBoxes", KeyKind::Flag),
    ("maxFlows", KeyKind::Count),
    ("mapScale", KeyKind::Number),
    ("datasetName", KeyKind::OptionalText),
];

/// Older documents spell a few keys differently.
const LEGACY_ALIASES: &[(&str, &str)] = &[
    ("NODE_STROKE_WIDTH", "nodeStrokeWidth"),
    ("NBR_ITERATIONS", "iterationCount"),
    ("FLOW_DISTANCE_THRESHOLD", "flowDistanceThreshold"),
];

/// Map scales that suit individual US state datasets.
const STATE_SCALES: &[(&str, f64)] = &[("wv", 0.5)];

impl Settings {
    /// Names of all keys `apply_record` requires.
    pub fn recognized_keys() -> impl Iterator<Item = &'static str> {
        RECOGNIZED_KEYS.iter().map(|(key, _)| *key)
    }

    /// Build settings from a flat record, starting from the defaults.
    pub fn from_record(record: &Value) -> SettingsResult<Self> {
        let mut settings = Self::default();
        settings.apply_record(record)?;
        Ok(settings)
    }

    /// Overwrite every recognized parameter from a flat key/value record.
    ///
    /// Fails without modifying `self` when a recognized key is missing or has
    /// the wrong type.
    pub fn apply_record(&mut self, record: &Value) -> SettingsResult<()> {
        let record = record.as_object().ok_or(SettingsError::NotAnObject)?;

        let mut merged = match serde_json::to_value(&*self) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(SettingsError::NotAnObject),
            Err(e) => {
                return Err(SettingsError::InvalidValue {
                    key: "settings".to_string(),
                    reason: e.to_string(),
                })
            }
        };

        for &(key, kind) in RECOGNIZED_KEYS {
            let value = lookup(record, key).ok_or_else(|| SettingsError::MissingKey(key.to_string()))?;
            check_kind(key, kind, value)?;
            merged.insert(key.to_string(), value.clone());
        }

        let updated: Settings =
            serde_json::from_value(Value::Object(merged)).map_err(|e| SettingsError::InvalidValue {
                key: "settings".to_string(),
                reason: e.to_string(),
            })?;
        updated.validate()?;

        *self = updated;
        Ok(())
    }

    /// The settings as a flat JSON record.
    pub fn to_record(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Parse settings from TOML. Missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> SettingsResult<Self> {
        let settings: Settings = toml::from_str(source)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> SettingsResult<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }

    /// Reject values no formula can work with.
    pub fn validate(&self) -> SettingsResult<()> {
        let non_negative = [
            ("maxFlowWidth", self.max_flow_width),
            ("maxNodeRadius", self.max_node_radius),
            ("nodeStrokeWidth", self.node_stroke_width),
            ("flowDistanceFromStartPointPixel", self.flow_distance_from_start_point_pixel),
            ("flowDistanceFromEndPointPixel", self.flow_distance_from_end_point_pixel),
            ("nodeTolerancePx", self.node_tolerance_px),
            ("flowDistanceThreshold", self.flow_distance_threshold),
        ];
        for (key, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(SettingsError::InvalidValue {
                    key: key.to_string(),
                    reason: format!("expected a finite non-negative number, got {}", value),
                });
            }
        }
        if !self.map_scale.is_finite() || self.map_scale <= 0.0 {
            return Err(SettingsError::InvalidValue {
                key: "mapScale".to_string(),
                reason: format!("expected a positive number, got {}", self.map_scale),
            });
        }
        Ok(())
    }

    /// Apply the preset map scale for a US state, if one is known.
    pub fn use_state_map_scale(&mut self, state: &str) -> bool {
        match state_map_scale(state) {
            Some(scale) => {
                self.map_scale = scale;
                true
            }
            None => false,
        }
    }
}

/// The preset map scale for a US state code (lowercase postal code).
pub fn state_map_scale(state: &str) -> Option<f64> {
    let state = state.to_ascii_lowercase();
    STATE_SCALES
        .iter()
        .find(|(code, _)| *code == state)
        .map(|(_, scale)| *scale)
}

fn lookup<'a>(record: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    record.get(key).or_else(|| {
        LEGACY_ALIASES
            .iter()
            .find(|(_, canonical)| *canonical == key)
            .and_then(|(alias, _)| record.get(*alias))
    })
}

fn check_kind(key: &str, kind: KeyKind, value: &Value) -> SettingsResult<()> {
    let ok = match kind {
        KeyKind::Count => value.as_u64().map_or(false, |n| n <= u64::from(u32::MAX)),
        KeyKind::Number => value.is_number(),
        KeyKind::Flag => value.is_boolean(),
        KeyKind::OptionalText => value.is_null() || value.is_string(),
    };
    if ok {
        Ok(())
    } else {
        let expected = match kind {
            KeyKind::Count => "a non-negative integer",
            KeyKind::Number => "a number",
            KeyKind::Flag => "a boolean",
            KeyKind::OptionalText => "a string or null",
        };
        Err(SettingsError::InvalidValue {
            key: key.to_string(),
            reason: format!("expected {}, got {}", expected, value),
        })
    }
}

/// Shape parameters for flow arrowheads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArrowSettings {
    pub size_ratio: f64,
    pub length_ratio: f64,
    pub length_scale_factor: f64,
    pub width_scale_factor: f64,
    pub edge_ctrl_length: f64,
    pub edge_ctrl_width: f64,
    pub corner_position: f64,
    pub point_towards_endpoint: bool,
}

impl Default for ArrowSettings {
    fn default() -> Self {
        Self {
            size_ratio: 0.1,
            length_ratio: 0.2,
            length_scale_factor: 1.6,
            width_scale_factor: 0.8,
            edge_ctrl_length: 0.5,
            edge_ctrl_width: 0.5,
            corner_position: 0.0,
            point_towards_endpoint: true,
        }
    }
}

/// Which layers the renderer draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DrawSettings {
    pub draw_flows: bool,
    pub draw_nodes: bool,
    pub draw_arrows: bool,
    pub draw_control_points: bool,
    pub draw_intermediate_flow_points: bool,
    pub draw_rangeboxes: bool,
}

impl Default for DrawSettings {
    fn default() -> Self {
        Self {
            draw_flows: true,
            draw_nodes: false,
            draw_arrows: true,
            draw_control_points: false,
            draw_intermediate_flow_points: false,
            draw_rangeboxes: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn full_record() -> Value {
        Settings::default().to_record()
    }

    #[test]
    fn test_record_round_trip() {
        let record = full_record();
        assert_eq!(record.as_object().unwrap().len(), RECOGNIZED_KEYS.len());
        let settings = Settings::from_record(&record).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_apply_overwrites_and_ignores_unknown() {
        let mut record = full_record();
        record["maxFlowWidth"] = json!(12.5);
        record["maxFlowPoints"] = json!(40);
        record["datasetName"] = json!("migration");
        record["somethingElse"] = json!("ignored");

        let mut settings = Settings::default();
        settings.apply_record(&record).unwrap();
        assert_eq!(settings.max_flow_width, 12.5);
        assert_eq!(settings.max_flow_points, 40);
        assert_eq!(settings.dataset_name.as_deref(), Some("migration"));
    }

    #[test]
    fn test_missing_key_fails_and_keeps_settings() {
        let mut record = full_record();
        record["maxNodeRadius"] = json!(99.0);
        record.as_object_mut().unwrap().remove("maxFlowWidth");

        let mut settings = Settings::default();
        let result = settings.apply_record(&record);
        assert!(matches!(result, Err(SettingsError::MissingKey(ref k)) if k == "maxFlowWidth"));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_legacy_aliases() {
        let mut record = full_record();
        let map = record.as_object_mut().unwrap();
        map.remove("nodeStrokeWidth");
        map.remove("iterationCount");
        map.remove("flowDistanceThreshold");
        map.insert("NODE_STROKE_WIDTH".to_string(), json!(2.0));
        map.insert("NBR_ITERATIONS".to_string(), json!(250));
        map.insert("FLOW_DISTANCE_THRESHOLD".to_string(), json!(0.5));

        let settings = Settings::from_record(&record).unwrap();
        assert_eq!(settings.node_stroke_width, 2.0);
        assert_eq!(settings.iteration_count, 250);
        assert_eq!(settings.flow_distance_threshold, 0.5);
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let mut record = full_record();
        record["enforceRangebox"] = json!("yes");
        let result = Settings::from_record(&record);
        assert!(matches!(result, Err(SettingsError::InvalidValue { ref key, .. }) if key == "enforceRangebox"));
    }

    #[test]
    fn test_negative_width_is_rejected() {
        let mut record = full_record();
        record["maxFlowWidth"] = json!(-1.0);
        assert!(Settings::from_record(&record).is_err());
    }

    #[test]
    fn test_not_an_object() {
        assert!(matches!(
            Settings::from_record(&json!([1, 2])),
            Err(SettingsError::NotAnObject)
        ));
    }

    #[test]
    fn test_toml_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "maxFlowWidth = 18.0").unwrap();
        writeln!(file, "datasetName = \"census\"").unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.max_flow_width, 18.0);
        assert_eq!(settings.dataset_name.as_deref(), Some("census"));
        assert_eq!(settings.max_flow_points, 20);
    }

    #[test]
    fn test_state_map_scale() {
        assert_eq!(state_map_scale("WV"), Some(0.5));
        assert_eq!(state_map_scale("ca"), None);

        let mut settings = Settings::default();
        settings.map_scale = 1.0;
        assert!(settings.use_state_map_scale("wv"));
        assert_eq!(settings.map_scale, 0.5);
    }
}
