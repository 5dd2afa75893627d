use serde::{Deserialize, Serialize};

/// Running mean and variance (Welford).
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    n_vals: usize,
    mean: f64,
    diff_2_sum: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccumulatorReport {
    /// `None` without samples.
    pub mean: Option<f64>,
    /// `None` with fewer than two samples.
    pub std_dev: Option<f64>,
    pub n_vals: usize,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, val: f64) {
        self.n_vals += 1;

        let diff_a = val - self.mean;
        self.mean += diff_a / self.n_vals as f64;

        let diff_b = val - self.mean;
        self.diff_2_sum += diff_a * diff_b;
    }

    pub fn report(&self) -> AccumulatorReport {
        AccumulatorReport {
            mean: (self.n_vals > 0).then_some(self.mean),
            std_dev: (self.n_vals > 1)
                .then(|| (self.diff_2_sum / (self.n_vals as f64 - 1.0)).sqrt()),
            n_vals: self.n_vals,
        }
    }
}

/// Least-squares line through equally spaced samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

const MIN_FIT_VALS: usize = 3;

/// Fit `vals[i] ~ intercept + slope * i`; `None` with fewer than three samples.
pub fn linear_fit(vals: &[f64]) -> Option<LinearFit> {
    let n_vals = vals.len();
    if n_vals < MIN_FIT_VALS {
        return None;
    }
    let n = n_vals as f64;
    let sum_x: f64 = (0..n_vals).map(|i| i as f64).sum();
    let sum_y: f64 = vals.iter().sum();
    let sum_xy: f64 = vals.iter().enumerate().map(|(i, &y)| i as f64 * y).sum();
    let sum_x2: f64 = (0..n_vals).map(|i| (i * i) as f64).sum();

    let den = n * sum_x2 - sum_x * sum_x;
    if den == 0.0 {
        return None;
    }
    let slope = (n * sum_xy - sum_x * sum_y) / den;
    let intercept = (sum_y - slope * sum_x) / n;
    Some(LinearFit { slope, intercept })
}

/// Ordered samples with summary statistics.
#[derive(Debug, Clone, Default)]
pub struct TimeSeries {
    vals: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesReport {
    pub summary: AccumulatorReport,
    pub first: Option<f64>,
    pub last: Option<f64>,
    /// Slope per sample, `None` with too few samples.
    pub slope: Option<f64>,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, val: f64) {
        self.vals.push(val);
    }

    pub fn report(&self) -> TimeSeriesReport {
        let mut acc = Accumulator::new();
        self.vals.iter().for_each(|&val| acc.add(val));
        TimeSeriesReport {
            summary: acc.report(),
            first: self.vals.first().copied(),
            last: self.vals.last().copied(),
            slope: linear_fit(&self.vals).map(|fit| fit.slope),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_reports_no_data_when_empty() {
        let acc = Accumulator::new();
        let rep = acc.report();
        assert_eq!(rep.mean, None);
        assert_eq!(rep.std_dev, None);
    }

    #[test]
    fn accumulator_matches_direct_computation() {
        let mut acc = Accumulator::new();
        for val in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            acc.add(val);
        }
        let rep = acc.report();
        assert!((rep.mean.unwrap_or_default() - 5.0).abs() < 1e-12);
        assert!((rep.std_dev.unwrap_or_default() - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn linear_fit_recovers_line_and_rejects_short_input() {
        assert!(linear_fit(&[1.0, 2.0]).is_none());
        let fit = linear_fit(&[3.0, 1.0, -1.0, -3.0]).expect("enough samples");
        assert!((fit.slope + 2.0).abs() < 1e-12);
        assert!((fit.intercept - 3.0).abs() < 1e-12);
    }

    #[test]
    fn time_series_report_tracks_endpoints() {
        let mut series = TimeSeries::new();
        for val in [1.0, 2.0, 3.0] {
            series.push(val);
        }
        let rep = series.report();
        assert_eq!(rep.first, Some(1.0));
        assert_eq!(rep.last, Some(3.0));
        assert!((rep.slope.unwrap_or_default() - 1.0).abs() < 1e-12);
    }
}
