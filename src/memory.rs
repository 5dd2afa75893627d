use crate::Day;
use crate::payload::{Payload, render};
use crate::snapshot::DailySnapshot;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    fmt,
};

const SEARCH_LIMIT: usize = 10;
const MIN_TOKEN_OVERLAP: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rec-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Decision,
    Lesson,
    BestPractice,
    Event,
}

/// Immutable entry of the organizational memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: RecordId,
    pub kind: RecordKind,
    pub recorded_at: Day,
    pub category: String,
    pub summary: String,
    pub payload: Payload,
}

impl MemoryRecord {
    /// Text that keyword search runs against.
    pub fn searchable_text(&self) -> String {
        format!(
            "{} {} {}",
            self.summary,
            self.category,
            render(&self.payload)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub day: Day,
    pub value: f64,
}

/// Relevance of a record to a free-text query; zero means no match.
pub trait Scorer {
    fn score(&self, query: &str, record: &MemoryRecord) -> f64;
}

/// Substring match first, then token overlap.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordScorer;

impl Scorer for KeywordScorer {
    fn score(&self, query: &str, record: &MemoryRecord) -> f64 {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return 0.0;
        }
        let text = record.searchable_text().to_lowercase();
        if text.contains(&query) {
            return 1.0;
        }

        let query_tokens = tokens(&query);
        if query_tokens.is_empty() {
            return 0.0;
        }
        let text_tokens = tokens(&text);
        let n_common = query_tokens.intersection(&text_tokens).count();
        // Overlap relative to the query, so long records are not penalized.
        let overlap = n_common as f64 / query_tokens.len() as f64;
        if overlap >= MIN_TOKEN_OVERLAP {
            overlap * 0.9
        } else {
            0.0
        }
    }
}

fn tokens(text: &str) -> BTreeSet<&str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|tok| tok.len() > 2)
        .collect()
}

/// Append-only store of decisions, lessons, best practices, events and metric series.
///
/// Only metric series and the snapshot window are bounded; the record logs grow
/// without limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrgMemory {
    today: Day,
    next_id: u64,
    decisions: Vec<MemoryRecord>,
    lessons: Vec<MemoryRecord>,
    best_practices: Vec<MemoryRecord>,
    events: Vec<MemoryRecord>,
    metrics: BTreeMap<String, VecDeque<MetricPoint>>,
    metric_series_cap: usize,
    snapshots: VecDeque<DailySnapshot>,
    snapshot_cap: usize,
}

impl OrgMemory {
    pub fn new(metric_series_cap: usize, snapshot_cap: usize) -> Self {
        Self {
            today: 0,
            next_id: 0,
            decisions: Vec::new(),
            lessons: Vec::new(),
            best_practices: Vec::new(),
            events: Vec::new(),
            metrics: BTreeMap::new(),
            metric_series_cap: metric_series_cap.max(1),
            snapshots: VecDeque::new(),
            snapshot_cap: snapshot_cap.max(1),
        }
    }

    pub fn set_today(&mut self, day: Day) {
        self.today = day;
    }

    fn make_record(
        &mut self,
        kind: RecordKind,
        category: &str,
        summary: &str,
        payload: Payload,
    ) -> MemoryRecord {
        self.next_id += 1;
        MemoryRecord {
            id: RecordId(self.next_id),
            kind,
            recorded_at: self.today,
            category: category.to_string(),
            summary: summary.to_string(),
            payload,
        }
    }

    pub fn record_decision(&mut self, summary: &str, category: &str, payload: Payload) -> RecordId {
        let rec = self.make_record(RecordKind::Decision, category, summary, payload);
        let id = rec.id;
        self.decisions.push(rec);
        id
    }

    pub fn record_lesson(&mut self, summary: &str, category: &str, payload: Payload) -> RecordId {
        let rec = self.make_record(RecordKind::Lesson, category, summary, payload);
        let id = rec.id;
        self.lessons.push(rec);
        id
    }

    pub fn record_best_practice(
        &mut self,
        summary: &str,
        category: &str,
        payload: Payload,
    ) -> RecordId {
        let rec = self.make_record(RecordKind::BestPractice, category, summary, payload);
        let id = rec.id;
        self.best_practices.push(rec);
        id
    }

    pub fn log_event(&mut self, summary: &str, event_type: &str, payload: Payload) -> RecordId {
        let rec = self.make_record(RecordKind::Event, event_type, summary, payload);
        let id = rec.id;
        self.events.push(rec);
        id
    }

    pub fn record_metric(&mut self, name: &str, value: f64, day: Day) {
        let cap = self.metric_series_cap;
        let series = self.metrics.entry(name.to_string()).or_default();
        series.push_back(MetricPoint { day, value });
        while series.len() > cap {
            series.pop_front();
        }
    }

    /// Record every value of `values` under `"{group}.{name}"`.
    pub fn record_metrics(&mut self, group: &str, values: &BTreeMap<String, f64>, day: Day) {
        for (name, &value) in values {
            self.record_metric(&format!("{group}.{name}"), value, day);
        }
    }

    pub fn decisions(&self) -> &[MemoryRecord] {
        &self.decisions
    }

    pub fn lessons(&self) -> &[MemoryRecord] {
        &self.lessons
    }

    pub fn best_practices(&self) -> &[MemoryRecord] {
        &self.best_practices
    }

    pub fn events(&self) -> &[MemoryRecord] {
        &self.events
    }

    pub fn metric_names(&self) -> impl Iterator<Item = &str> {
        self.metrics.keys().map(String::as_str)
    }

    /// Keyword search with the default scorer.
    pub fn search(&self, query: &str, category: Option<&str>) -> Vec<&MemoryRecord> {
        self.search_with(&KeywordScorer, query, category)
    }

    /// Decisions first, then lessons, then best practices; at most ten results.
    pub fn search_with<S: Scorer + ?Sized>(
        &self,
        scorer: &S,
        query: &str,
        category: Option<&str>,
    ) -> Vec<&MemoryRecord> {
        let mut results = Vec::with_capacity(SEARCH_LIMIT);
        for group in [&self.decisions, &self.lessons, &self.best_practices] {
            let mut hits: Vec<(f64, &MemoryRecord)> = group
                .iter()
                .filter(|rec| category.is_none_or(|cat| rec.category == cat))
                .map(|rec| (scorer.score(query, rec), rec))
                .filter(|&(score, _)| score > 0.0)
                .collect();
            hits.sort_by(|a, b| b.0.total_cmp(&a.0));
            results.extend(hits.into_iter().map(|(_, rec)| rec));
            if results.len() >= SEARCH_LIMIT {
                break;
            }
        }
        results.truncate(SEARCH_LIMIT);
        results
    }

    /// The most recent `periods` points of a metric, oldest first.
    pub fn trend(&self, metric: &str, periods: usize) -> Vec<MetricPoint> {
        let Some(series) = self.metrics.get(metric) else {
            return Vec::new();
        };
        let skip = series.len().saturating_sub(periods);
        series.iter().skip(skip).copied().collect()
    }

    /// Linear extrapolation of a metric `ahead` periods past its last point.
    pub fn forecast(&self, metric: &str, ahead: usize) -> Option<Vec<f64>> {
        let series = self.metrics.get(metric)?;
        let vals: Vec<f64> = series.iter().map(|pt| pt.value).collect();
        let fit = crate::stats::linear_fit(&vals)?;
        let n_vals = vals.len() as f64;
        Some(
            (0..ahead)
                .map(|i_ahead| fit.intercept + fit.slope * (n_vals + i_ahead as f64))
                .collect(),
        )
    }

    pub fn commit_snapshot(&mut self, snapshot: DailySnapshot) {
        self.snapshots.push_back(snapshot);
        while self.snapshots.len() > self.snapshot_cap {
            self.snapshots.pop_front();
        }
    }

    pub fn snapshots(&self) -> &VecDeque<DailySnapshot> {
        &self.snapshots
    }

    pub fn recent_snapshots(&self, n: usize) -> Vec<&DailySnapshot> {
        let skip = self.snapshots.len().saturating_sub(n);
        self.snapshots.iter().skip(skip).collect()
    }

    pub fn total_records(&self) -> usize {
        self.decisions.len() + self.lessons.len() + self.best_practices.len() + self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::{DayOutcome, Engine};
    use crate::payload::{number, payload, text};

    fn seeded() -> OrgMemory {
        let mut mem = OrgMemory::new(100, 365);
        mem.record_lesson(
            "Collaboration between CEO and CFO on strategic_budget_review",
            "collaboration",
            payload([("effectiveness", number(0.7))]),
        );
        mem.record_decision(
            "Crisis Response: key_talent_loss",
            "crisis",
            payload([("context", text("Key team members leaving the company"))]),
        );
        mem.record_best_practice(
            "Weekly budget review with finance",
            "finance",
            Payload::new(),
        );
        mem.log_event("budget event that search must skip", "internal", Payload::new());
        mem
    }

    #[test]
    fn search_prioritizes_decisions_and_skips_events() {
        let mem = seeded();
        let hits = mem.search("budget", None);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].kind, RecordKind::Lesson);
        assert_eq!(hits[1].kind, RecordKind::BestPractice);

        let hits = mem.search("KEY TALENT", None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].kind, RecordKind::Decision);

        let mut mem = mem;
        mem.record_decision("Approve budget increase", "finance", Payload::new());
        let hits = mem.search("budget", None);
        assert_eq!(hits[0].kind, RecordKind::Decision);
    }

    #[test]
    fn search_is_idempotent_and_capped() {
        let mut mem = OrgMemory::new(100, 365);
        for i_rec in 0..25 {
            mem.record_decision(&format!("hiring decision {i_rec}"), "people", Payload::new());
        }
        let first: Vec<RecordId> = mem.search("hiring", None).iter().map(|rec| rec.id).collect();
        let second: Vec<RecordId> = mem.search("hiring", None).iter().map(|rec| rec.id).collect();
        assert_eq!(first.len(), SEARCH_LIMIT);
        assert_eq!(first, second);
    }

    #[test]
    fn category_filter_applies_to_every_group() {
        let mem = seeded();
        let hits = mem.search("budget", Some("finance"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].kind, RecordKind::BestPractice);
    }

    #[test]
    fn token_overlap_matches_reordered_words() {
        let mem = seeded();
        let hits = mem.search("review budget strategic", None);
        assert!(!hits.is_empty());
        assert_eq!(hits[0].kind, RecordKind::Lesson);
        assert!(mem.search("quantum teleportation", None).is_empty());
    }

    struct ExactCategory;

    impl Scorer for ExactCategory {
        fn score(&self, query: &str, record: &MemoryRecord) -> f64 {
            if record.category == query { 1.0 } else { 0.0 }
        }
    }

    #[test]
    fn scorer_is_pluggable() {
        let mem = seeded();
        let hits = mem.search_with(&ExactCategory, "crisis", None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].summary, "Crisis Response: key_talent_loss");
    }

    #[test]
    fn metric_series_are_capped_and_trend_is_recent_first_to_last() {
        let mut mem = OrgMemory::new(5, 365);
        for day in 1..=8 {
            mem.record_metric("morale", day as f64 / 10.0, day);
        }
        let trend = mem.trend("morale", 3);
        let days: Vec<Day> = trend.iter().map(|pt| pt.day).collect();
        assert_eq!(days, vec![6, 7, 8]);
        assert_eq!(mem.trend("morale", 100).len(), 5);
        assert!(mem.trend("unknown", 3).is_empty());
    }

    #[test]
    fn grouped_metrics_are_namespaced() {
        let mut mem = OrgMemory::new(100, 365);
        let values = BTreeMap::from([("revenue".to_string(), 0.4), ("morale".to_string(), 0.7)]);
        mem.record_metrics("performance", &values, 3);
        let names: Vec<&str> = mem.metric_names().collect();
        assert_eq!(names, vec!["performance.morale", "performance.revenue"]);
        assert_eq!(mem.trend("performance.revenue", 1)[0].value, 0.4);
    }

    #[test]
    fn record_logs_are_not_capped() {
        let mut mem = OrgMemory::new(2, 2);
        for _ in 0..50 {
            mem.record_lesson("lesson", "general", Payload::new());
        }
        assert_eq!(mem.lessons().len(), 50);
    }

    #[test]
    fn recent_snapshots_are_the_tail_oldest_first() {
        let cfg = Config::default().with_seed(12);
        let mut engine = Engine::new(cfg).expect("failed to create engine");
        let mut mem = OrgMemory::new(100, 4);
        for _ in 0..6 {
            let outcome = engine.advance_day().expect("failed to advance day");
            if let DayOutcome::Advanced(snapshot) = outcome {
                mem.commit_snapshot(*snapshot);
            }
        }

        let days: Vec<Day> = mem.recent_snapshots(2).iter().map(|snap| snap.day).collect();
        assert_eq!(days, vec![5, 6]);
        let days: Vec<Day> = mem.recent_snapshots(10).iter().map(|snap| snap.day).collect();
        assert_eq!(days, vec![3, 4, 5, 6]);
        assert!(mem.recent_snapshots(0).is_empty());
    }

    #[test]
    fn forecast_extrapolates_linear_series() {
        let mut mem = OrgMemory::new(100, 365);
        assert!(mem.forecast("revenue", 2).is_none());
        for day in 0..10 {
            mem.record_metric("revenue", 2.0 * day as f64 + 1.0, day);
        }
        let pred = mem.forecast("revenue", 2).expect("enough data");
        assert!((pred[0] - 21.0).abs() < 1e-9);
        assert!((pred[1] - 23.0).abs() < 1e-9);
    }
}
