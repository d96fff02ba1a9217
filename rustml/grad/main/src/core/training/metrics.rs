use std::collections::BTreeMap;

/// Running averages of named scalar losses over an epoch.
#[derive(Debug, Default, Clone)]
pub struct LossMeter {
    sums: BTreeMap<String, f64>,
    counts: BTreeMap<String, usize>,
}

impl LossMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, name: &str, value: f32) {
        *self.sums.entry(name.to_string()).or_insert(0.0) += value as f64;
        *self.counts.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn mean(&self, name: &str) -> Option<f64> {
        let count = *self.counts.get(name)?;
        if count == 0 {
            return None;
        }
        Some(self.sums[name] / count as f64)
    }

    /// `(name, mean)` pairs in name order.
    pub fn means(&self) -> Vec<(String, f64)> {
        self.sums
            .keys()
            .filter_map(|k| self.mean(k).map(|m| (k.clone(), m)))
            .collect()
    }

    /// `name=value` pairs for log lines.
    pub fn summary(&self) -> String {
        self.means()
            .iter()
            .map(|(k, v)| format!("{k}={v:.4}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn reset(&mut self) {
        self.sums.clear();
        self.counts.clear();
    }
}
