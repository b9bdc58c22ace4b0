use crate::model::Measurement;
use std::collections::HashMap;

/// Mapping timestamp -> measurements sharing it, keyed in first-occurrence order.
#[derive(Debug, Clone, Default)]
pub struct TimestampIndex {
    keys: Vec<String>,
    slices: HashMap<String, Vec<Measurement>>,
}

impl TimestampIndex {
    pub fn build(measurements: &[Measurement]) -> Self {
        let mut index = Self::default();
        for measurement in measurements {
            match index.slices.get_mut(&measurement.timestamp) {
                Some(slice) => slice.push(measurement.clone()),
                None => {
                    index.keys.push(measurement.timestamp.clone());
                    index
                        .slices
                        .insert(measurement.timestamp.clone(), vec![measurement.clone()]);
                }
            }
        }
        index
    }

    pub fn get(&self, timestamp: &str) -> Option<&[Measurement]> {
        self.slices.get(timestamp).map(Vec::as_slice)
    }

    /// Timestamps in order of first occurrence.
    pub fn timestamps(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Measurement])> {
        self.keys.iter().filter_map(move |key| {
            self.slices
                .get(key)
                .map(|slice| (key.as_str(), slice.as_slice()))
        })
    }
}
