//! Statistical functions: median, quartiles, interquartile-range fences.


/// Tukey fence multiplier for the interquartile range.
pub const IQR_FENCE: f64 = 1.5;

/// Calculate the median of f64 values in-place.
///
/// Mutates the input buffer (partial sort via quickselect). NaN values must
/// be filtered out by the caller.
#[inline]
pub fn median_f64_mut(data: &mut [f64]) -> f64 {
    debug_assert!(!data.is_empty());

    let len = data.len();
    let mid = len / 2;

    if len & 1 == 1 {
        let (_, median, _) = data.select_nth_unstable_by(mid, f64::total_cmp);
        *median
    } else {
        let (left_part, right_median, _) = data.select_nth_unstable_by(mid, f64::total_cmp);
        let right = *right_median;
        let left = left_part.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (left + right) * 0.5
    }
}

/// Median of integer values, `None` for an empty slice.
pub fn median_i32(values: &[i32]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut scratch: Vec<f64> = values.iter().map(|&v| v as f64).collect();
    Some(median_f64_mut(&mut scratch))
}

/// Lower quartile, median and upper quartile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quartiles {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
}

impl Quartiles {
    /// Quartiles as medians of the halves below and above the median.
    ///
    /// For odd lengths the median element belongs to neither half. A single
    /// value yields all three quartiles equal to it.
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_unstable_by(f64::total_cmp);

        let n = sorted.len();
        let median = median_sorted(&sorted);
        if n == 1 {
            return Some(Self {
                q1: median,
                median,
                q3: median,
            });
        }
        let lower = &sorted[..n / 2];
        let upper = &sorted[n.div_ceil(2)..];
        Some(Self {
            q1: median_sorted(lower),
            median,
            q3: median_sorted(upper),
        })
    }

    #[inline]
    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }

    /// Inclusive `[q1 - k*iqr, q3 + k*iqr]` fence with `k = 1.5`.
    #[inline]
    pub fn fences(&self) -> (f64, f64) {
        let spread = IQR_FENCE * self.iqr();
        (self.q1 - spread, self.q3 + spread)
    }
}

fn median_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n & 1 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) * 0.5
    }
}
