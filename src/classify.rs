use crate::types::{Attribute, StatRecord};

/// Quantile color scale over the currently expressed attribute.
///
/// The domain is every finite value of the attribute across all records —
/// including records that never joined to a geometry. Missing or
/// unparseable values are excluded from the domain; callers substitute the
/// no-data color for those instead of calling `color`.
///
/// Rebuilt from scratch on every selection change. The dataset is a few
/// dozen rows, so recomputation is cheaper than any caching scheme.
#[derive(Debug, Clone)]
pub struct QuantileScale {
    thresholds: Vec<f64>,
    colors: Vec<String>,
}

impl QuantileScale {
    pub fn from_records(records: &[StatRecord], attr: Attribute, colors: &[String]) -> Self {
        let mut domain: Vec<f64> = records
            .iter()
            .filter_map(|r| r.value(attr))
            .filter(|v| v.is_finite())
            .collect();
        domain.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let n = colors.len();
        let mut thresholds = Vec::with_capacity(n.saturating_sub(1));
        if !domain.is_empty() {
            for k in 1..n {
                thresholds.push(quantile_sorted(&domain, k as f64 / n as f64));
            }
        }

        QuantileScale {
            thresholds,
            colors: colors.to_vec(),
        }
    }

    /// Index of the class a value falls into, 0-based, low to high.
    pub fn class_index(&self, value: f64) -> usize {
        // bisect-right over the thresholds
        let mut idx = 0;
        for t in &self.thresholds {
            if value >= *t {
                idx += 1;
            } else {
                break;
            }
        }
        idx.min(self.colors.len() - 1)
    }

    pub fn color(&self, value: f64) -> &str {
        &self.colors[self.class_index(value)]
    }

    pub fn class_count(&self) -> usize {
        self.colors.len()
    }
}

/// Linear-interpolation quantile on an already-sorted slice. `p` in [0, 1].
fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let h = (n - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}
