use crate::memory::RecordId;
use crate::snapshot::Metrics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named shock with per-metric deltas at full severity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crisis {
    pub kind: &'static str,
    pub description: &'static str,
    pub impact: &'static [(&'static str, f64)],
}

pub static CATALOGUE: [Crisis; 5] = [
    Crisis {
        kind: "market_downturn",
        description: "Major market downturn affecting customer demand",
        impact: &[("revenue", -0.3), ("morale", -0.2), ("market_share", -0.1)],
    },
    Crisis {
        kind: "competitor_threat",
        description: "Major competitor launches disruptive product",
        impact: &[("market_share", -0.2), ("innovation_pressure", 0.3)],
    },
    Crisis {
        kind: "key_talent_loss",
        description: "Key team members leaving the company",
        impact: &[("productivity", -0.3), ("morale", -0.4)],
    },
    Crisis {
        kind: "funding_challenge",
        description: "Difficulty raising next funding round",
        impact: &[("budget", -0.5), ("runway", -0.3), ("stress", 0.4)],
    },
    Crisis {
        kind: "regulatory_change",
        description: "New regulations affecting business operations",
        impact: &[("compliance_cost", 0.2), ("operational_complexity", 0.3)],
    },
];

pub fn lookup(kind: &str) -> Option<&'static Crisis> {
    CATALOGUE.iter().find(|crisis| crisis.kind == kind)
}

pub fn kinds() -> Vec<String> {
    CATALOGUE.iter().map(|crisis| crisis.kind.to_string()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricChange {
    pub before: f64,
    pub after: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CrisisOutcome {
    Injected {
        kind: String,
        description: String,
        severity: f64,
        changes: BTreeMap<String, MetricChange>,
        decision: RecordId,
        n_notified: usize,
    },
    Unknown {
        kind: String,
        available: Vec<String>,
    },
    /// Severity was NaN or infinite; nothing was changed.
    InvalidSeverity {
        kind: String,
        severity: f64,
    },
}

impl Crisis {
    /// Apply scaled deltas to whichever map holds each metric, clamped to `[0, 1]`.
    ///
    /// Performance metrics take precedence; metrics found in neither map are skipped.
    pub fn apply(
        &self,
        severity: f64,
        performance: &mut Metrics,
        health: &mut Metrics,
    ) -> BTreeMap<String, MetricChange> {
        let mut changes = BTreeMap::new();
        for &(metric, delta) in self.impact {
            let target = if performance.contains_key(metric) {
                performance.get_mut(metric)
            } else {
                health.get_mut(metric)
            };
            let Some(val) = target else {
                continue;
            };
            let before = *val;
            *val = (before + delta * severity).clamp(0.0, 1.0);
            changes.insert(metric.to_string(), MetricChange { before, after: *val });
        }
        changes
    }
}
