use crate::economy::EconomicState;
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const OUR_COMPANY: &str = "our_company";

const MIN_SHARE: f64 = 0.01;
const MAX_SHARE: f64 = 0.8;
const MAX_DRIFT: f64 = 0.02;
const RECESSION_BIAS: f64 = 0.01;
const STRONG: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Competitor {
    pub share: f64,
    pub strength: f64,
}

/// Market shares of the named competitors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Landscape {
    competitors: BTreeMap<String, Competitor>,
}

impl Default for Landscape {
    fn default() -> Self {
        let competitors = [
            ("market_leader", 0.35, 0.9),
            ("challenger_1", 0.25, 0.8),
            ("challenger_2", 0.20, 0.7),
            (OUR_COMPANY, 0.05, 0.6),
            ("others", 0.15, 0.5),
        ]
        .into_iter()
        .map(|(name, share, strength)| (name.to_string(), Competitor { share, strength }))
        .collect();
        Self { competitors }
    }
}

impl Landscape {
    pub fn new(competitors: BTreeMap<String, Competitor>) -> Self {
        Self { competitors }
    }

    pub fn competitors(&self) -> &BTreeMap<String, Competitor> {
        &self.competitors
    }

    pub fn share_of(&self, name: &str) -> Option<f64> {
        self.competitors.get(name).map(|comp| comp.share)
    }

    /// Perturb every share, favour strong competitors in a contraction, then renormalize.
    pub fn update<R: Rng + ?Sized>(&mut self, economy: &EconomicState, rng: &mut R) -> &Self {
        for comp in self.competitors.values_mut() {
            let mut change = rng.random_range(-MAX_DRIFT..=MAX_DRIFT);
            if economy.gdp_growth < 0.0 {
                change += if comp.strength > STRONG {
                    RECESSION_BIAS
                } else {
                    -RECESSION_BIAS
                };
            }
            comp.share = (comp.share + change).clamp(MIN_SHARE, MAX_SHARE);
        }

        let total: f64 = self.competitors.values().map(|comp| comp.share).sum();
        if total > 0.0 {
            for comp in self.competitors.values_mut() {
                comp.share /= total;
            }
        }

        self
    }

    pub fn total_share(&self) -> f64 {
        self.competitors.values().map(|comp| comp.share).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::economy::Phase;
    use rand_chacha::ChaCha12Rng;

    #[test]
    fn shares_always_sum_to_one() {
        let mut rng = ChaCha12Rng::seed_from_u64(21);
        let mut economy = EconomicState::default();
        let mut landscape = Landscape::default();
        for _ in 0..1_000 {
            economy.advance(&mut rng);
            landscape.update(&economy, &mut rng);
            assert!((landscape.total_share() - 1.0).abs() < 1e-9);
            for comp in landscape.competitors().values() {
                assert!((0.0..=1.0).contains(&comp.share));
            }
        }
    }

    #[test]
    fn recession_favours_strong_competitors() {
        let mut rng = ChaCha12Rng::seed_from_u64(22);
        let mut economy = EconomicState::in_phase(Phase::Recession, &mut rng);
        economy.gdp_growth = -0.02;
        let mut landscape = Landscape::default();
        let leader = landscape.share_of("market_leader").unwrap_or_default();
        let others = landscape.share_of("others").unwrap_or_default();
        for _ in 0..50 {
            landscape.update(&economy, &mut rng);
        }
        assert!(landscape.share_of("market_leader").unwrap_or_default() > leader);
        assert!(landscape.share_of("others").unwrap_or_default() < others);
    }

    #[test]
    fn monopoly_is_capped_before_renormalization() {
        let mut rng = ChaCha12Rng::seed_from_u64(23);
        let competitors = BTreeMap::from([
            (
                "giant".to_string(),
                Competitor {
                    share: 0.99,
                    strength: 1.0,
                },
            ),
            (
                "dwarf".to_string(),
                Competitor {
                    share: 0.0,
                    strength: 0.1,
                },
            ),
        ]);
        let mut landscape = Landscape::new(competitors);
        landscape.update(&EconomicState::default(), &mut rng);
        let dwarf = landscape.share_of("dwarf").unwrap_or_default();
        assert!(dwarf > 0.0);
        assert!((landscape.total_share() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_landscape_is_a_noop() {
        let mut rng = ChaCha12Rng::seed_from_u64(24);
        let mut landscape = Landscape::new(BTreeMap::new());
        landscape.update(&EconomicState::default(), &mut rng);
        assert!(landscape.competitors().is_empty());
    }
}
