use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::{fmt, ops::Range};

/// Macro-economic regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    Growth,
    Boom,
    Recession,
    Recovery,
    Stagnation,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Growth,
        Phase::Boom,
        Phase::Recession,
        Phase::Recovery,
        Phase::Stagnation,
    ];

    /// Minimum duration that must be exceeded, transition probability and next phase.
    fn transition(self) -> (u32, f64, Phase) {
        match self {
            Phase::Growth => (24, 0.3, Phase::Boom),
            Phase::Boom => (12, 0.4, Phase::Recession),
            Phase::Recession => (18, 0.5, Phase::Recovery),
            Phase::Recovery => (15, 0.6, Phase::Growth),
            Phase::Stagnation => (20, 0.3, Phase::Recovery),
        }
    }

    fn bounds(self) -> &'static IndicatorBounds {
        match self {
            Phase::Growth => &GROWTH,
            Phase::Boom => &BOOM,
            Phase::Recession => &RECESSION,
            Phase::Recovery => &RECOVERY,
            Phase::Stagnation => &STAGNATION,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::Growth => "growth",
            Phase::Boom => "boom",
            Phase::Recession => "recession",
            Phase::Recovery => "recovery",
            Phase::Stagnation => "stagnation",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

struct IndicatorBounds {
    gdp_growth: Range<f64>,
    unemployment: Range<f64>,
    interest: Range<f64>,
    inflation: Range<f64>,
    volatility: Range<f64>,
    sector: Range<f64>,
}

const GROWTH: IndicatorBounds = IndicatorBounds {
    gdp_growth: 0.02..0.04,
    unemployment: 0.03..0.06,
    interest: 0.02..0.06,
    inflation: 0.02..0.035,
    volatility: 0.05..0.15,
    sector: 0.7..0.9,
};

const BOOM: IndicatorBounds = IndicatorBounds {
    gdp_growth: 0.04..0.07,
    unemployment: 0.02..0.04,
    interest: 0.01..0.04,
    inflation: 0.03..0.06,
    volatility: 0.1..0.25,
    sector: 0.8..1.0,
};

const RECESSION: IndicatorBounds = IndicatorBounds {
    gdp_growth: -0.03..0.01,
    unemployment: 0.06..0.12,
    interest: 0.0..0.02,
    inflation: 0.0..0.02,
    volatility: 0.2..0.4,
    sector: 0.3..0.6,
};

const RECOVERY: IndicatorBounds = IndicatorBounds {
    gdp_growth: 0.01..0.03,
    unemployment: 0.05..0.08,
    interest: 0.01..0.03,
    inflation: 0.01..0.03,
    volatility: 0.1..0.2,
    sector: 0.6..0.8,
};

const STAGNATION: IndicatorBounds = IndicatorBounds {
    gdp_growth: -0.01..0.01,
    unemployment: 0.05..0.07,
    interest: 0.02..0.04,
    inflation: 0.01..0.04,
    volatility: 0.05..0.15,
    sector: 0.5..0.7,
};

/// Current macro-economic state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomicState {
    pub phase: Phase,
    pub phase_duration: u32,
    pub gdp_growth: f64,
    pub unemployment_rate: f64,
    pub interest_rate: f64,
    pub inflation_rate: f64,
    pub volatility: f64,
    pub sector_performance: f64,
}

impl Default for EconomicState {
    fn default() -> Self {
        Self {
            phase: Phase::Growth,
            phase_duration: 0,
            gdp_growth: 0.025,
            unemployment_rate: 0.04,
            interest_rate: 0.05,
            inflation_rate: 0.03,
            volatility: 0.1,
            sector_performance: 0.8,
        }
    }
}

impl EconomicState {
    /// State pinned to a phase with freshly drawn indicators.
    pub fn in_phase<R: Rng + ?Sized>(phase: Phase, rng: &mut R) -> Self {
        let mut state = Self {
            phase,
            ..Self::default()
        };
        state.redraw_indicators(rng);
        state
    }

    /// Advance the cycle by one tick.
    pub fn advance<R: Rng + ?Sized>(&mut self, rng: &mut R) -> &Self {
        self.phase_duration += 1;

        let (min_duration, prob, next) = self.phase.transition();
        if self.phase_duration > min_duration && rng.random_bool(prob) {
            log::debug!("economy moved from {} to {next}", self.phase);
            self.phase = next;
            self.phase_duration = 0;
        }

        self.redraw_indicators(rng);
        self
    }

    fn redraw_indicators<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let bounds = self.phase.bounds();
        self.gdp_growth = rng.random_range(bounds.gdp_growth.clone());
        self.unemployment_rate = rng.random_range(bounds.unemployment.clone());
        self.interest_rate = rng.random_range(bounds.interest.clone());
        self.inflation_rate = rng.random_range(bounds.inflation.clone());
        self.volatility = rng.random_range(bounds.volatility.clone());
        self.sector_performance = rng.random_range(bounds.sector.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha12Rng;

    #[test]
    fn first_advance_increments_duration_without_transition() {
        let mut rng = ChaCha12Rng::seed_from_u64(7);
        let mut state = EconomicState::default();
        state.advance(&mut rng);
        assert_eq!(state.phase, Phase::Growth);
        assert_eq!(state.phase_duration, 1);
    }

    #[test]
    fn indicators_stay_within_phase_bounds() {
        let mut rng = ChaCha12Rng::seed_from_u64(11);
        let mut state = EconomicState::default();
        for _ in 0..2_000 {
            state.advance(&mut rng);
            let bounds = state.phase.bounds();
            assert!(bounds.gdp_growth.contains(&state.gdp_growth));
            assert!(bounds.unemployment.contains(&state.unemployment_rate));
            assert!(bounds.interest.contains(&state.interest_rate));
            assert!(bounds.inflation.contains(&state.inflation_rate));
            assert!(bounds.volatility.contains(&state.volatility));
            assert!(bounds.sector.contains(&state.sector_performance));
        }
    }

    #[test]
    fn transitions_follow_the_cycle_and_reset_duration() {
        let mut rng = ChaCha12Rng::seed_from_u64(3);
        let mut state = EconomicState::default();
        let mut seen = vec![state.phase];
        for _ in 0..1_000 {
            let before = state.phase;
            let before_duration = state.phase_duration;
            state.advance(&mut rng);
            if state.phase != before {
                assert_eq!(state.phase, before.transition().2);
                assert_eq!(state.phase_duration, 0);
                assert!(before_duration + 1 > before.transition().0);
                seen.push(state.phase);
            }
        }
        assert!(seen.contains(&Phase::Boom));
        assert!(seen.contains(&Phase::Recession));
        assert!(!seen.contains(&Phase::Stagnation));
    }

    #[test]
    fn stagnation_eventually_recovers() {
        let mut rng = ChaCha12Rng::seed_from_u64(5);
        let mut state = EconomicState::in_phase(Phase::Stagnation, &mut rng);
        for _ in 0..500 {
            state.advance(&mut rng);
        }
        assert_ne!(state.phase, Phase::Stagnation);
    }
}
