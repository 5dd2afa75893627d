use crate::economy::EconomicState;
use anyhow::Result;
use rand::prelude::*;
use rand_distr::Bernoulli;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const INDUSTRIES: [&str; 6] = [
    "Technology",
    "Healthcare",
    "Finance",
    "Retail",
    "Manufacturing",
    "Education",
];

const FEATURES: [(&str, f64, f64); 6] = [
    ("security", 0.3, 1.0),
    ("scalability", 0.2, 0.9),
    ("usability", 0.4, 1.0),
    ("integration", 0.3, 0.8),
    ("performance", 0.5, 1.0),
    ("support", 0.3, 0.9),
];

const MAX_CHURN_PROB: f64 = 0.8;
const EXPANSION_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Segment {
    Enterprise,
    MidMarket,
    Smb,
    Startup,
}

impl Segment {
    pub const ALL: [Segment; 4] = [
        Segment::Enterprise,
        Segment::MidMarket,
        Segment::Smb,
        Segment::Startup,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Segment::Enterprise => "enterprise",
            Segment::MidMarket => "mid_market",
            Segment::Smb => "smb",
            Segment::Startup => "startup",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|seg| seg.name() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpansionKind {
    SeatExpansion,
    FeatureUpgrade,
    AdditionalProduct,
}

/// Expansion opportunity of a surviving customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expansion {
    pub customer_id: String,
    pub kind: ExpansionKind,
    pub value: f64,
    pub potential: f64,
    pub probability: f64,
}

/// Read-only context shared by every customer update of a tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    /// Announced price increase as a fraction (zero when none).
    pub price_increase: f64,
    /// Pressure from competitors in `[0, 1]`.
    pub competitive_pressure: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub segment: Segment,
    pub industry: String,
    pub size: u32,
    pub budget: f64,
    pub satisfaction: f64,
    pub loyalty: f64,
    churn_prob: f64,
    pub lifetime_value: f64,
    pub decision_speed: f64,
    pub price_sensitivity: f64,
    pub feature_preferences: BTreeMap<String, f64>,
    pub expansion_potential: f64,
    pub contract_length: u32,
    pub renewal_probability: f64,
}

impl Customer {
    fn generate<R: Rng + ?Sized>(idx: usize, rng: &mut R) -> Self {
        let &segment = Segment::ALL.choose(rng).unwrap_or(&Segment::Smb);
        let industry = INDUSTRIES.choose(rng).copied().unwrap_or("Technology");

        let (size, budget) = match segment {
            Segment::Enterprise => (
                rng.random_range(1_000..=10_000),
                rng.random_range(100_000.0..1_000_000.0),
            ),
            Segment::MidMarket => (
                rng.random_range(100..=1_000),
                rng.random_range(25_000.0..200_000.0),
            ),
            Segment::Smb => (
                rng.random_range(10..=100),
                rng.random_range(5_000.0..50_000.0),
            ),
            Segment::Startup => (
                rng.random_range(5..=50),
                rng.random_range(1_000.0..25_000.0),
            ),
        };

        let feature_preferences = FEATURES
            .iter()
            .map(|&(name, lo, hi)| (name.to_string(), rng.random_range(lo..hi)))
            .collect();

        Self {
            id: format!("customer_{idx:03}"),
            segment,
            industry: industry.to_string(),
            size,
            budget,
            satisfaction: rng.random_range(0.4..0.8),
            loyalty: rng.random_range(0.2..0.7),
            churn_prob: rng.random_range(0.05..0.15),
            lifetime_value: budget * rng.random_range(1.5..3.0),
            decision_speed: rng.random_range(0.2..0.8),
            price_sensitivity: rng.random_range(0.2..0.8),
            feature_preferences,
            expansion_potential: rng.random_range(0.1..0.6),
            contract_length: 12,
            renewal_probability: 0.8,
        }
    }

    /// Churn probability computed by the last update.
    pub fn churn_prob(&self) -> f64 {
        self.churn_prob
    }

    /// Recompute churn probability from satisfaction, loyalty and market conditions.
    pub fn update_churn_prob(&mut self, economy: &EconomicState, ctx: &MarketContext) -> f64 {
        let mut prob = 0.1;
        prob += (1.0 - self.satisfaction) * 0.3;
        prob += (1.0 - self.loyalty) * 0.2;

        if ctx.competitive_pressure > 0.5 {
            prob += 0.1;
        }
        if economy.gdp_growth < 0.0 {
            prob += 0.15;
        }
        if economy.unemployment_rate > 0.08 {
            prob += 0.05;
        }
        if ctx.price_increase > 0.0 {
            prob += self.price_sensitivity * ctx.price_increase * 0.2;
        }

        self.churn_prob = prob.clamp(0.0, MAX_CHURN_PROB);
        self.churn_prob
    }

    /// Best expansion opportunity, if the customer qualifies for one.
    pub fn expansion(&self) -> Option<Expansion> {
        if self.satisfaction < 0.6 || self.loyalty < 0.4 {
            return None;
        }
        if self.expansion_potential <= EXPANSION_THRESHOLD {
            return None;
        }

        let ep = self.expansion_potential;
        let candidates = [
            (ExpansionKind::SeatExpansion, self.size as f64 * 0.1 * ep),
            (ExpansionKind::FeatureUpgrade, self.budget * 0.2 * ep),
            (ExpansionKind::AdditionalProduct, self.lifetime_value * 0.3 * ep),
        ];
        let (kind, value) = candidates
            .into_iter()
            .fold(candidates[0], |best, cand| if cand.1 > best.1 { cand } else { best });

        Some(Expansion {
            customer_id: self.id.clone(),
            kind,
            value,
            potential: ep,
            probability: (self.satisfaction * self.loyalty).min(MAX_CHURN_PROB),
        })
    }

    /// Adjust satisfaction according to how much the customer cares about each changed feature.
    pub fn react_to_product_changes(&mut self, changes: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
        let mut reactions = BTreeMap::new();
        for (feature, &impact) in changes {
            if let Some(&weight) = self.feature_preferences.get(feature) {
                let reaction = impact * weight;
                self.satisfaction = (self.satisfaction + reaction * 0.1).clamp(0.0, 1.0);
                reactions.insert(feature.clone(), reaction);
            }
        }
        reactions
    }
}

/// Aggregate customer statistics of one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerMetrics {
    pub total_customers: usize,
    pub churned_customers: usize,
    /// `None` when there was nobody to churn.
    pub churn_rate: Option<f64>,
    pub expansion_opportunities: usize,
    /// `None` when the population is empty.
    pub avg_satisfaction: Option<f64>,
    pub avg_loyalty: Option<f64>,
}

/// Result of one population update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationUpdate {
    pub churned: Vec<String>,
    pub expansions: Vec<Expansion>,
    pub metrics: CustomerMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentReport {
    pub count: usize,
    pub avg_satisfaction: f64,
    pub avg_loyalty: f64,
    pub avg_lifetime_value: f64,
    pub churn_risk: f64,
    pub expansion_potential: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CampaignImpact {
    pub customers_affected: usize,
    pub satisfaction_improvement: f64,
    pub loyalty_improvement: f64,
    pub acquisition_potential: f64,
}

/// Synthetic customer base.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Population {
    customers: Vec<Customer>,
}

impl Population {
    pub fn generate<R: Rng + ?Sized>(n_customers: usize, rng: &mut R) -> Self {
        let customers = (0..n_customers)
            .map(|idx| Customer::generate(idx, rng))
            .collect();
        Self { customers }
    }

    pub fn from_customers(customers: Vec<Customer>) -> Self {
        Self { customers }
    }

    pub fn customers(&self) -> &[Customer] {
        &self.customers
    }

    pub fn len(&self) -> usize {
        self.customers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.customers.is_empty()
    }

    /// Update every customer against the tick's economy and remove the churned ones.
    pub fn update<R: Rng + ?Sized>(
        &mut self,
        economy: &EconomicState,
        ctx: &MarketContext,
        rng: &mut R,
    ) -> Result<PopulationUpdate> {
        let mut churned = Vec::new();
        let mut expansions = Vec::new();
        let mut churn_flags = Vec::with_capacity(self.customers.len());

        for cus in &mut self.customers {
            let prob = cus.update_churn_prob(economy, ctx);
            let churns = Bernoulli::new(prob)?.sample(rng);
            if churns {
                churned.push(cus.id.clone());
            } else if let Some(exp) = cus.expansion() {
                expansions.push(exp);
            }
            churn_flags.push(churns);
        }

        let mut flags = churn_flags.into_iter();
        self.customers.retain(|_| !flags.next().unwrap_or_default());

        let total = self.customers.len();
        let n_churned = churned.len();
        let metrics = CustomerMetrics {
            total_customers: total,
            churned_customers: n_churned,
            churn_rate: ratio(n_churned as f64, (total + n_churned) as f64),
            expansion_opportunities: expansions.len(),
            avg_satisfaction: self.average(|cus| cus.satisfaction),
            avg_loyalty: self.average(|cus| cus.loyalty),
        };
        log::debug!("{n_churned} customers churned, {total} remain");

        Ok(PopulationUpdate {
            churned,
            expansions,
            metrics,
        })
    }

    /// Mean of a customer attribute, `None` on an empty population.
    pub fn average<F: Fn(&Customer) -> f64>(&self, attr: F) -> Option<f64> {
        mean(self.customers.iter().map(attr))
    }

    pub fn segment_analysis(&self) -> BTreeMap<Segment, SegmentReport> {
        let mut reports = BTreeMap::new();
        for seg in Segment::ALL {
            let members: Vec<&Customer> =
                self.customers.iter().filter(|cus| cus.segment == seg).collect();
            if members.is_empty() {
                continue;
            }
            let avg = |attr: fn(&Customer) -> f64| {
                mean(members.iter().map(|cus| attr(cus))).unwrap_or_default()
            };
            reports.insert(
                seg,
                SegmentReport {
                    count: members.len(),
                    avg_satisfaction: avg(|cus| cus.satisfaction),
                    avg_loyalty: avg(|cus| cus.loyalty),
                    avg_lifetime_value: avg(|cus| cus.lifetime_value),
                    churn_risk: avg(|cus| cus.churn_prob),
                    expansion_potential: avg(|cus| cus.expansion_potential),
                },
            );
        }
        reports
    }

    /// Apply a marketing campaign; unknown campaign kinds affect nobody.
    pub fn apply_campaign(&mut self, kind: &str, segment: Option<Segment>) -> CampaignImpact {
        let (satisfaction, loyalty, acquisition) = match kind {
            "brand_awareness" => (0.05, 0.03, 0.1),
            "product_demo" => (0.1, 0.05, 0.15),
            "customer_success" => (0.15, 0.1, 0.05),
            "pricing_promotion" => (0.08, 0.02, 0.2),
            _ => {
                return CampaignImpact {
                    customers_affected: 0,
                    satisfaction_improvement: 0.0,
                    loyalty_improvement: 0.0,
                    acquisition_potential: 0.0,
                };
            }
        };

        let mut affected = 0;
        for cus in &mut self.customers {
            if segment.is_some_and(|seg| seg != cus.segment) {
                continue;
            }
            cus.satisfaction = (cus.satisfaction + satisfaction).min(1.0);
            cus.loyalty = (cus.loyalty + loyalty).min(1.0);
            affected += 1;
        }

        CampaignImpact {
            customers_affected: affected,
            satisfaction_improvement: satisfaction,
            loyalty_improvement: loyalty,
            acquisition_potential: acquisition,
        }
    }

    pub fn react_to_product_changes(&mut self, changes: &BTreeMap<String, f64>) {
        for cus in &mut self.customers {
            cus.react_to_product_changes(changes);
        }
    }
}

fn mean<I: Iterator<Item = f64>>(vals: I) -> Option<f64> {
    let (sum, n_vals) = vals.fold((0.0, 0usize), |(sum, n), val| (sum + val, n + 1));
    ratio(sum, n_vals as f64)
}

fn ratio(num: f64, den: f64) -> Option<f64> {
    if den > 0.0 { Some(num / den) } else { None }
}
