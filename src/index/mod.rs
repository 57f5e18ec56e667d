//! Index Module
//!
//! In-memory ordering of queued items.
//!
//! ## Responsibilities
//! - Hold every live item of a queue (payload, features, sequence)
//! - Yield the highest-priority item in O(1), insert/remove in O(log n)
//! - Derive priority from the queue's feature schema
//!
//! ## Ordering
//! Items are compared feature by feature in schema order (higher value wins,
//! an absent feature loses to any present value), then by ascending insertion
//! sequence. The order is total, so the head of the queue is always well defined.

mod priority;

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{QueueError, Result};

pub use priority::PriorityIndex;

/// A named scalar attached to an item at enqueue time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    pub value: f64,
}

impl Feature {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Ordered list of feature names declared when a queue is created
///
/// Earlier names take precedence. Immutable once the queue exists.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    /// Build a schema, rejecting empty or duplicate names
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();

        for (i, name) in names.iter().enumerate() {
            if name.is_empty() {
                return Err(QueueError::InvalidArgument(format!(
                    "feature name at position {} is empty",
                    i
                )));
            }
            if names[..i].contains(name) {
                return Err(QueueError::InvalidArgument(format!(
                    "feature '{}' declared more than once",
                    name
                )));
            }
        }

        Ok(Self { names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Position of a feature name in the schema
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// A queued item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Insertion sequence, unique and increasing within a queue
    pub sequence: u64,

    /// Opaque payload
    pub payload: Bytes,

    /// Feature values by name
    pub features: BTreeMap<String, f64>,
}

impl Item {
    pub fn new(sequence: u64, payload: Bytes, features: BTreeMap<String, f64>) -> Self {
        Self {
            sequence,
            payload,
            features,
        }
    }
}

/// Check a feature list from a request and turn it into a name → value map
///
/// Rejects duplicate names and non-finite values. Names outside the schema
/// are kept on the item but never influence ordering.
pub fn collect_features(features: &[Feature]) -> Result<BTreeMap<String, f64>> {
    let mut map = BTreeMap::new();

    for feature in features {
        if feature.name.is_empty() {
            return Err(QueueError::InvalidArgument(
                "feature name must not be empty".to_string(),
            ));
        }
        if !feature.value.is_finite() {
            return Err(QueueError::InvalidArgument(format!(
                "feature '{}' has non-finite value {}",
                feature.name, feature.value
            )));
        }
        if map.insert(feature.name.clone(), feature.value).is_some() {
            return Err(QueueError::InvalidArgument(format!(
                "feature '{}' given more than once",
                feature.name
            )));
        }
    }

    Ok(map)
}
