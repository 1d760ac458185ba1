use serde::Serialize;

/// Running weighted mean of a scalar.
///
/// `val` is the most recent value, `avg` is `sum / count` (0 until the first
/// non-empty update).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RunningStat {
    pub val: f64,
    pub sum: f64,
    pub count: usize,
    pub avg: f64,
}

impl RunningStat {
    pub fn new() -> RunningStat {
        RunningStat::default()
    }

    /// Records `val` as the mean of `n` observations.
    pub fn update(&mut self, val: f64, n: usize) {
        self.val = val;
        self.sum += val * n as f64;
        self.count += n;
        if self.count > 0 {
            self.avg = self.sum / self.count as f64;
        }
    }
}
