use crate::config::Config;
use crate::economy::Phase;
use crate::landscape::OUR_COMPANY;
use crate::snapshot::{DailySnapshot, Metrics};
use crate::stats::{Accumulator, TimeSeries};
use anyhow::{Context, Result};
use rmp_serde::{decode, encode};
use serde::Serialize;
use serde_value::Value;
use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

pub trait Obs {
    fn update(&mut self, snapshot: &DailySnapshot) -> Result<()>;
    fn report(&self) -> Result<Value>;
}

fn named<T: Serialize>(name: &str, report: T) -> Result<Value> {
    serde_value::to_value(BTreeMap::from([(name, report)]))
        .with_context(|| format!("failed to convert {name} report"))
}

pub struct PhaseOccupancy {
    acc_vec: Vec<Accumulator>,
}

impl PhaseOccupancy {
    pub fn new() -> Self {
        let mut acc_vec = Vec::new();
        acc_vec.resize_with(Phase::ALL.len(), Accumulator::new);
        Self { acc_vec }
    }
}

impl Obs for PhaseOccupancy {
    fn update(&mut self, snapshot: &DailySnapshot) -> Result<()> {
        let phase = snapshot.market.conditions.phase;
        for (acc, candidate) in self.acc_vec.iter_mut().zip(Phase::ALL) {
            acc.add(if candidate == phase { 1.0 } else { 0.0 });
        }
        Ok(())
    }

    fn report(&self) -> Result<Value> {
        let reports: BTreeMap<&str, _> = Phase::ALL
            .iter()
            .zip(&self.acc_vec)
            .map(|(phase, acc)| (phase.name(), acc.report()))
            .collect();
        named("phase_occupancy", reports)
    }
}

/// Time series of every metric in one group of the snapshot.
pub struct MetricGroup {
    name: &'static str,
    select: fn(&DailySnapshot) -> &Metrics,
    series: BTreeMap<String, TimeSeries>,
}

impl MetricGroup {
    pub fn new(name: &'static str, select: fn(&DailySnapshot) -> &Metrics) -> Self {
        Self {
            name,
            select,
            series: BTreeMap::new(),
        }
    }
}

impl Obs for MetricGroup {
    fn update(&mut self, snapshot: &DailySnapshot) -> Result<()> {
        for (metric, &val) in (self.select)(snapshot) {
            self.series.entry(metric.clone()).or_default().push(val);
        }
        Ok(())
    }

    fn report(&self) -> Result<Value> {
        let reports: BTreeMap<&str, _> = self
            .series
            .iter()
            .map(|(metric, series)| (metric.as_str(), series.report()))
            .collect();
        named(self.name, reports)
    }
}

pub struct CustomerCount {
    time_series: TimeSeries,
}

impl CustomerCount {
    pub fn new() -> Self {
        Self {
            time_series: TimeSeries::new(),
        }
    }
}

impl Obs for CustomerCount {
    fn update(&mut self, snapshot: &DailySnapshot) -> Result<()> {
        let n_customers = snapshot.market.customers.metrics.total_customers;
        self.time_series.push(n_customers as f64);
        Ok(())
    }

    fn report(&self) -> Result<Value> {
        named("n_customers", self.time_series.report())
    }
}

pub struct OurShare {
    time_series: TimeSeries,
}

impl OurShare {
    pub fn new() -> Self {
        Self {
            time_series: TimeSeries::new(),
        }
    }
}

impl Obs for OurShare {
    fn update(&mut self, snapshot: &DailySnapshot) -> Result<()> {
        if let Some(share) = snapshot.market.landscape.share_of(OUR_COMPANY) {
            self.time_series.push(share);
        }
        Ok(())
    }

    fn report(&self) -> Result<Value> {
        named("our_share", self.time_series.report())
    }
}

pub struct Analyzer {
    saves_per_file: usize,
    obs_ptr_vec: Vec<Box<dyn Obs>>,
}

impl Analyzer {
    pub fn new(cfg: &Config) -> Self {
        let obs_ptr_vec: Vec<Box<dyn Obs>> = vec![
            Box::new(PhaseOccupancy::new()),
            Box::new(MetricGroup::new("organizational_health", |snap| {
                &snap.organizational_health
            })),
            Box::new(MetricGroup::new("performance_metrics", |snap| {
                &snap.performance_metrics
            })),
            Box::new(MetricGroup::new("financial_metrics", |snap| {
                &snap.financial_metrics
            })),
            Box::new(CustomerCount::new()),
            Box::new(OurShare::new()),
        ];
        Self {
            saves_per_file: cfg.output.saves_per_file,
            obs_ptr_vec,
        }
    }

    pub fn add_snapshot(&mut self, snapshot: &DailySnapshot) -> Result<()> {
        for obs in &mut self.obs_ptr_vec {
            obs.update(snapshot).context("failed to update observable")?;
        }
        Ok(())
    }

    pub fn add_file<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);

        for _ in 0..self.saves_per_file {
            let snapshot: DailySnapshot =
                decode::from_read(&mut reader).context("failed to read snapshot")?;
            self.add_snapshot(&snapshot)?;
        }
        Ok(())
    }

    pub fn reports(&self) -> Result<Vec<Value>> {
        self.obs_ptr_vec.iter().map(|obs| obs.report()).collect()
    }

    pub fn save_results<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);

        let reports = self.reports()?;
        encode::write(&mut writer, &reports).context("failed to serialize results")?;
        writer.flush().context("failed to flush writer stream")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DayOutcome, Engine};

    fn snapshots(n_days: usize) -> Vec<DailySnapshot> {
        let mut engine =
            Engine::new(Config::default().with_seed(11)).expect("failed to create engine");
        (0..n_days)
            .map(|_| match engine.advance_day().expect("failed to advance day") {
                DayOutcome::Advanced(snapshot) => *snapshot,
                DayOutcome::NotRunning => panic!("engine is not running"),
            })
            .collect()
    }

    fn entry<'a>(report: &'a Value, key: &str) -> &'a Value {
        let Value::Map(map) = report else {
            panic!("report is not a map");
        };
        map.get(&Value::String(key.to_string()))
            .unwrap_or_else(|| panic!("missing key {key}"))
    }

    #[test]
    fn phase_occupancy_sums_to_one() {
        let mut obs = PhaseOccupancy::new();
        for snapshot in snapshots(5) {
            obs.update(&snapshot).expect("failed to update");
        }
        let total: f64 = obs
            .acc_vec
            .iter()
            .filter_map(|acc| acc.report().mean)
            .sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn reports_cover_every_observable() {
        let mut analyzer = Analyzer::new(&Config::default());
        for snapshot in snapshots(4) {
            analyzer.add_snapshot(&snapshot).expect("failed to add snapshot");
        }
        let reports = analyzer.reports().expect("failed to build reports");
        assert_eq!(reports.len(), 6);

        let health = entry(&reports[1], "organizational_health");
        let morale = entry(health, "morale");
        assert_eq!(entry(entry(morale, "summary"), "n_vals"), &Value::U64(4));
    }

    #[test]
    fn empty_analyzer_reports_no_data() {
        let analyzer = Analyzer::new(&Config::default());
        let reports = analyzer.reports().expect("failed to build reports");
        let count = entry(&reports[4], "n_customers");
        assert_eq!(entry(count, "first"), &Value::Option(None));
    }
}
