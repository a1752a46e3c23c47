/// Weighted streaming mean.
///
/// Keeps only the weighted sum and the total weight; `average()` is always
/// `sum / count`, or `0.0` before any weight has been added.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningAverage {
    last: f64,
    sum: f64,
    count: u64,
}

impl RunningAverage {
    pub fn new() -> RunningAverage {
        RunningAverage::default()
    }

    pub fn reset(&mut self) {
        *self = RunningAverage::default();
    }

    /// Adds `value` with multiplicity `weight`. A zero weight changes nothing.
    pub fn update(&mut self, value: f64, weight: u64) {
        if weight == 0 {
            return;
        }
        self.last = value;
        self.sum += value * weight as f64;
        self.count += weight;
    }

    /// Most recent value passed to `update`.
    pub fn last(&self) -> f64 {
        self.last
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}
