use crate::customers::{Expansion, MarketContext, Population, PopulationUpdate};
use crate::economy::{EconomicState, Phase};
use crate::landscape::Landscape;
use anyhow::{Context, Result};
use rand::prelude::*;
use rand_distr::Bernoulli;
use serde::{Deserialize, Serialize};

pub const TOTAL_MARKET_SIZE: f64 = 10_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MarketEventKind {
    EconomicDownturn,
    SectorBoom,
    CompetitorLaunch,
    TechDisruption,
    RegulatoryChange,
}

impl MarketEventKind {
    pub fn name(self) -> &'static str {
        match self {
            MarketEventKind::EconomicDownturn => "economic_downturn",
            MarketEventKind::SectorBoom => "sector_boom",
            MarketEventKind::CompetitorLaunch => "competitor_launch",
            MarketEventKind::TechDisruption => "technology_disruption",
            MarketEventKind::RegulatoryChange => "regulatory_change",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Impact {
    Positive,
    Negative,
    Mixed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketEvent {
    pub kind: MarketEventKind,
    pub description: String,
    pub impact: Impact,
    pub severity: f64,
}

/// Flattened macro indicators as reported to consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConditions {
    pub phase: Phase,
    pub phase_duration: u32,
    pub gdp_growth: f64,
    pub unemployment_rate: f64,
    pub interest_rate: f64,
    pub inflation_rate: f64,
    pub volatility: f64,
    pub sector_performance: f64,
}

impl From<&EconomicState> for MarketConditions {
    fn from(state: &EconomicState) -> Self {
        Self {
            phase: state.phase,
            phase_duration: state.phase_duration,
            gdp_growth: state.gdp_growth,
            unemployment_rate: state.unemployment_rate,
            interest_rate: state.interest_rate,
            inflation_rate: state.inflation_rate,
            volatility: state.volatility,
            sector_performance: state.sector_performance,
        }
    }
}

/// Everything the market produced in one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketResult {
    pub conditions: MarketConditions,
    pub customers: PopulationUpdate,
    pub events: Vec<MarketEvent>,
    pub landscape: Landscape,
    pub market_size: f64,
}

impl MarketResult {
    pub fn expansions(&self) -> &[Expansion] {
        &self.customers.expansions
    }

    /// Highest competitor-launch severity of the tick, zero when none.
    pub fn competitive_pressure(&self) -> f64 {
        self.events
            .iter()
            .filter(|evt| evt.kind == MarketEventKind::CompetitorLaunch)
            .map(|evt| evt.severity)
            .fold(0.0, f64::max)
    }
}

/// Economy, customers and competitors advanced together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    economy: EconomicState,
    population: Population,
    landscape: Landscape,
}

impl Market {
    pub fn generate<R: Rng + ?Sized>(n_customers: usize, rng: &mut R) -> Self {
        Self {
            economy: EconomicState::default(),
            population: Population::generate(n_customers, rng),
            landscape: Landscape::default(),
        }
    }

    pub fn from_parts(economy: EconomicState, population: Population, landscape: Landscape) -> Self {
        Self {
            economy,
            population,
            landscape,
        }
    }

    pub fn economy(&self) -> &EconomicState {
        &self.economy
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn population_mut(&mut self) -> &mut Population {
        &mut self.population
    }

    pub fn landscape(&self) -> &Landscape {
        &self.landscape
    }

    pub fn conditions(&self) -> MarketConditions {
        MarketConditions::from(&self.economy)
    }

    /// Advance one tick: cycle, then population, then landscape, then events.
    pub fn tick<R: Rng + ?Sized>(&mut self, ctx: &MarketContext, rng: &mut R) -> Result<MarketResult> {
        self.economy.advance(rng);

        let customers = self
            .population
            .update(&self.economy, ctx, rng)
            .context("failed to update population")?;

        self.landscape.update(&self.economy, rng);

        let events = generate_events(&self.economy, rng).context("failed to generate events")?;

        Ok(MarketResult {
            conditions: self.conditions(),
            customers,
            events,
            landscape: self.landscape.clone(),
            market_size: TOTAL_MARKET_SIZE,
        })
    }
}

fn generate_events<R: Rng + ?Sized>(economy: &EconomicState, rng: &mut R) -> Result<Vec<MarketEvent>> {
    let mut events = Vec::new();

    if economy.gdp_growth < 0.0 {
        events.push(MarketEvent {
            kind: MarketEventKind::EconomicDownturn,
            description: "Economic downturn affecting customer budgets".to_string(),
            impact: Impact::Negative,
            severity: economy.gdp_growth.abs() * 10.0,
        });
    }

    if economy.sector_performance > 0.9 {
        events.push(MarketEvent {
            kind: MarketEventKind::SectorBoom,
            description: "Tech sector boom - increased investment".to_string(),
            impact: Impact::Positive,
            severity: (economy.sector_performance - 0.5) * 2.0,
        });
    }

    let random_events = [
        (
            MarketEventKind::CompetitorLaunch,
            0.1,
            "Major competitor launches new product",
            Impact::Negative,
            0.2..0.7,
        ),
        (
            MarketEventKind::TechDisruption,
            0.05,
            "New technology disruption in market",
            Impact::Mixed,
            0.3..0.8,
        ),
        (
            MarketEventKind::RegulatoryChange,
            0.03,
            "New data privacy regulations announced",
            Impact::Negative,
            0.1..0.5,
        ),
    ];
    for (kind, prob, description, impact, severity) in random_events {
        if Bernoulli::new(prob)?.sample(rng) {
            events.push(MarketEvent {
                kind,
                description: description.to_string(),
                impact,
                severity: rng.random_range(severity),
            });
        }
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha12Rng;

    #[test]
    fn tick_sees_the_same_economy_everywhere() {
        let mut rng = ChaCha12Rng::seed_from_u64(31);
        let mut market = Market::generate(100, &mut rng);
        let res = market
            .tick(&MarketContext::default(), &mut rng)
            .expect("failed to tick market");

        assert_eq!(res.conditions.phase_duration, 1);
        assert_eq!(res.conditions, market.conditions());
        assert_eq!(&res.landscape, market.landscape());
        assert_eq!(res.customers.metrics.total_customers, market.population().len());
    }

    #[test]
    fn downturn_event_tracks_negative_growth() {
        let mut rng = ChaCha12Rng::seed_from_u64(32);
        let mut economy = EconomicState::in_phase(Phase::Recession, &mut rng);
        economy.gdp_growth = -0.02;
        let events = generate_events(&economy, &mut rng).expect("failed to generate events");
        let downturn = events
            .iter()
            .find(|evt| evt.kind == MarketEventKind::EconomicDownturn)
            .expect("downturn event missing");
        assert!((downturn.severity - 0.2).abs() < 1e-9);
    }

    #[test]
    fn random_events_stay_in_severity_bounds() {
        let mut rng = ChaCha12Rng::seed_from_u64(33);
        let economy = EconomicState::default();
        let mut n_launches = 0;
        for _ in 0..2_000 {
            for evt in generate_events(&economy, &mut rng).expect("failed to generate events") {
                match evt.kind {
                    MarketEventKind::CompetitorLaunch => {
                        n_launches += 1;
                        assert!((0.2..0.7).contains(&evt.severity));
                    }
                    MarketEventKind::TechDisruption => assert!((0.3..0.8).contains(&evt.severity)),
                    MarketEventKind::RegulatoryChange => assert!((0.1..0.5).contains(&evt.severity)),
                    _ => panic!("unexpected threshold event in calm economy"),
                }
            }
        }
        assert!(n_launches > 100 && n_launches < 300);
    }
}
