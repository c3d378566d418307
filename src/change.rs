use std::collections::HashMap;

/// Last propagated value per registry key.
///
/// Keys are never evicted; the map is bounded by the sensor population.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    last: HashMap<String, f64>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// True on first sighting of `key` or when `value` differs from the last
    /// propagated one. Records `value` whenever it returns true.
    pub fn should_propagate(&mut self, key: &str, value: f64) -> bool {
        match self.last.get(key) {
            Some(prev) if *prev == value => false,
            _ => {
                self.last.insert(key.to_string(), value);
                true
            }
        }
    }

    /// Store `value` as the last propagated one without gating.
    pub fn record(&mut self, key: &str, value: f64) {
        self.last.insert(key.to_string(), value);
    }

    pub fn last_value(&self, key: &str) -> Option<f64> {
        self.last.get(key).copied()
    }
}
