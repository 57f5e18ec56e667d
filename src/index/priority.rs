//! Priority index implementation
//!
//! Binary heap keyed by the schema-derived rank of each item.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::{FeatureSchema, Item};

/// Heap entry: the rank key is computed once at insertion
#[derive(Debug)]
struct Ranked {
    /// One slot per schema feature, `None` when the item omits it
    key: Vec<Option<f64>>,
    item: Item,
}

impl Ranked {
    fn new(schema: &FeatureSchema, item: Item) -> Self {
        let key = schema
            .names()
            .iter()
            // + 0.0 folds -0.0 into 0.0 so total_cmp treats them as equal
            .map(|name| item.features.get(name).map(|v| v + 0.0))
            .collect();

        Self { key, item }
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.key.iter().zip(other.key.iter()) {
            let ord = match (a, b) {
                (Some(a), Some(b)) => a.total_cmp(b),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }

        // Older items first among ties
        other.item.sequence.cmp(&self.item.sequence)
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

/// Items of one queue ordered by priority
///
/// Not synchronized; the owning queue guards it with its lock.
#[derive(Debug)]
pub struct PriorityIndex {
    schema: FeatureSchema,
    heap: BinaryHeap<Ranked>,
}

impl PriorityIndex {
    /// Create an empty index ordered by `schema`
    pub fn new(schema: FeatureSchema) -> Self {
        Self {
            schema,
            heap: BinaryHeap::new(),
        }
    }

    /// Schema used for ranking
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Insert an item (O(log n))
    pub fn insert(&mut self, item: Item) {
        self.heap.push(Ranked::new(&self.schema, item));
    }

    /// Highest-priority item, if any (O(1))
    pub fn peek_max(&self) -> Option<&Item> {
        self.heap.peek().map(|ranked| &ranked.item)
    }

    /// Remove and return the highest-priority item (O(log n))
    pub fn pop_max(&mut self) -> Option<Item> {
        self.heap.pop().map(|ranked| ranked.item)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// All items in unspecified order
    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.heap.iter().map(|ranked| &ranked.item)
    }
}
