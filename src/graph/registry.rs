//! The point registry: canonical, deduplicated node storage.
//!
//! Two points with the same coordinates are the same node. Coordinates are
//! normalized into a [`CoordinateKey`] and looked up in a hash index, so
//! deduplication is O(1) per point instead of a scan over all nodes.

use crate::core::error::{IngestError, IngestResult, NodeId};
use crate::core::projection::Projection;
use crate::core::types::RecordId;
use crate::graph::node::{Node, PointRecord};
use indexmap::IndexMap;
use std::collections::HashMap;

/// How coordinates are compared when deduplicating points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DedupPolicy {
    /// Bit-identical coordinates only (`-0.0` equals `0.0`).
    #[default]
    Exact,
    /// Coordinates rounded to a fixed number of decimal places.
    Rounded { decimals: u32 },
}

/// Normalized coordinate pair used as the dedup hash key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinateKey {
    Exact(u64, u64),
    Rounded(i64, i64),
}

impl CoordinateKey {
    pub fn new(lat: f64, lng: f64, policy: DedupPolicy) -> Self {
        match policy {
            // Adding 0.0 folds -0.0 into 0.0.
            DedupPolicy::Exact => CoordinateKey::Exact((lat + 0.0).to_bits(), (lng + 0.0).to_bits()),
            DedupPolicy::Rounded { decimals } => {
                let factor = 10f64.powi(decimals.min(12) as i32);
                CoordinateKey::Rounded((lat * factor).round() as i64, (lng * factor).round() as i64)
            }
        }
    }
}

const MICRODEGREE: f64 = 1e-6;

/// Microdegree bucket used to warn about near-duplicate points.
///
/// Points within one microdegree of each other are at most one bucket apart
/// on each axis.
fn micro_key(lat: f64, lng: f64) -> (i64, i64) {
    ((lat / MICRODEGREE).floor() as i64, (lng / MICRODEGREE).floor() as i64)
}

/// Owns the canonical set of nodes.
///
/// Uses IndexMap to keep registration order for consistent iteration.
#[derive(Debug, Clone, Default)]
pub struct PointRegistry {
    nodes: IndexMap<NodeId, Node>,
    index: HashMap<CoordinateKey, NodeId>,
    near: HashMap<(i64, i64), Vec<NodeId>>,
    policy: DedupPolicy,
}

impl PointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: DedupPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> DedupPolicy {
        self.policy
    }

    /// The canonical node at these coordinates, if any.
    pub fn find(&self, lat: f64, lng: f64) -> Option<NodeId> {
        self.index.get(&CoordinateKey::new(lat, lng, self.policy)).copied()
    }

    /// Return the canonical node matching `candidate`'s coordinates, or adopt
    /// `candidate` as canonical.
    ///
    /// The boolean is `true` when the candidate was adopted.
    pub fn find_or_adopt(&mut self, candidate: Node) -> (NodeId, bool) {
        let key = CoordinateKey::new(candidate.lat, candidate.lng, self.policy);
        if let Some(&existing) = self.index.get(&key) {
            return (existing, false);
        }

        if let Some(other) = self.near_duplicate(candidate.lat, candidate.lng) {
            log::warn!(
                "Point ({}, {}) is within a microdegree of node {} but is registered separately",
                candidate.lat,
                candidate.lng,
                other
            );
        }

        let id = candidate.id;
        self.near
            .entry(micro_key(candidate.lat, candidate.lng))
            .or_default()
            .push(id);
        self.index.insert(key, id);
        self.nodes.insert(id, candidate);
        (id, true)
    }

    /// A node within one microdegree of these coordinates on both axes.
    pub fn near_duplicate(&self, lat: f64, lng: f64) -> Option<NodeId> {
        let (klat, klng) = micro_key(lat, lng);
        (-1..=1)
            .flat_map(|dlat| (-1..=1).map(move |dlng| (klat + dlat, klng + dlng)))
            .filter_map(|key| self.near.get(&key))
            .flatten()
            .copied()
            .find(|id| {
                self.nodes.get(id).map_or(false, |n| {
                    (n.lat - lat).abs() <= MICRODEGREE && (n.lng - lng).abs() <= MICRODEGREE
                })
            })
    }

    /// Register a point, projecting it when it lacks x/y.
    ///
    /// A missing, zero or NaN value is set to 1. Existing nodes are returned
    /// unchanged.
    pub fn register(&mut self, record: &PointRecord, projection: &dyn Projection) -> IngestResult<(NodeId, bool)> {
        let lat = record.lat.filter(|v| v.is_finite()).ok_or_else(|| IngestError::MissingPointCoordinate {
            field: "lat".to_string(),
        })?;
        let lng = record.lng.filter(|v| v.is_finite()).ok_or_else(|| IngestError::MissingPointCoordinate {
            field: "lng".to_string(),
        })?;
        Ok(self.register_checked(record, lat, lng, projection))
    }

    /// Register a point whose coordinates were already validated.
    pub(crate) fn register_checked(
        &mut self,
        record: &PointRecord,
        lat: f64,
        lng: f64,
        projection: &dyn Projection,
    ) -> (NodeId, bool) {
        if let Some(existing) = self.find(lat, lng) {
            return (existing, false);
        }
        let position = record.position().unwrap_or_else(|| projection.project(lat, lng));
        let mut node = Node::from_record(record, lat, lng, position);
        node.repair_value();
        self.find_or_adopt(node)
    }

    /// Remove a node by identity. Flows are not touched.
    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        let node = self.nodes.shift_remove(&id)?;
        let key = CoordinateKey::new(node.lat, node.lng, self.policy);
        if self.index.get(&key) == Some(&id) {
            self.index.remove(&key);
        }
        let near = micro_key(node.lat, node.lng);
        if let Some(bucket) = self.near.get_mut(&near) {
            bucket.retain(|n| *n != id);
            if bucket.is_empty() {
                self.near.remove(&near);
            }
        }
        Some(node)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// All nodes in registration order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// First node carrying the given record id.
    pub fn find_by_record_id(&self, record_id: &RecordId) -> Option<&Node> {
        self.nodes.values().find(|n| n.record_id.as_ref() == Some(record_id))
    }

    /// Recompute every node's position with a new projection.
    pub fn reproject(&mut self, projection: &dyn Projection) {
        for node in self.nodes.values_mut() {
            node.position = projection.project(node.lat, node.lng);
        }
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.index.clear();
        self.near.clear();
    }
}
