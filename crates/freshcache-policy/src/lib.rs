//! The freshness-policy decision engine: maps an EW estimate plus static
//! cost constants onto one of `{Invalidate, Update, Skip}` for each write.

use freshcache_tracker::NO_EVIDENCE;

/// Cost constants the break-even inequality is evaluated against.
/// `c_m()` (the cost of a cold miss) is always `c_i + c_u`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostConstants {
    pub c_i: f64,
    pub c_u: f64,
}

impl CostConstants {
    pub fn new(c_i: f64, c_u: f64) -> Self {
        Self { c_i, c_u }
    }

    pub fn c_m(&self) -> f64 {
        self.c_i + self.c_u
    }
}

impl Default for CostConstants {
    /// The spec's own defaults: `C_I = 10`, `C_U = 46`.
    fn default() -> Self {
        Self { c_i: 10.0, c_u: 46.0 }
    }
}

/// Static deployment-wide override of the adaptive EW-driven decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum PolicyMode {
    /// Evaluate the break-even inequality against the tracker's EW estimate.
    #[default]
    Adaptive,
    /// Never invalidate, never proactively update; rely on TTL alone.
    TtlOnly,
    /// Invalidate every write regardless of EW.
    InvalidateAlways,
    /// Update every write regardless of EW.
    UpdateAlways,
}

/// The action a write dispatches to the cache shard for its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Invalidate,
    Update,
    Skip,
}

/// Map an EW estimate onto an action under the given mode and cost
/// constants. Deterministic and pure: the same `(ew, costs, mode)` always
/// yields the same action.
///
/// `ew == NO_EVIDENCE` (`-1.0`) always invalidates under `Adaptive`,
/// regardless of cost constants: a key never read carries no information
/// the break-even inequality could use.
pub fn decide(ew: f64, costs: CostConstants, mode: PolicyMode) -> Action {
    match mode {
        PolicyMode::TtlOnly => Action::Skip,
        PolicyMode::InvalidateAlways => Action::Invalidate,
        PolicyMode::UpdateAlways => Action::Update,
        PolicyMode::Adaptive => {
            if ew == NO_EVIDENCE {
                Action::Invalidate
            } else if costs.c_u * ew > costs.c_m() {
                Action::Invalidate
            } else {
                Action::Update
            }
        }
    }
}

/// Reserved `ew` sentinel values carried on the wire's `DBPut.ew` field,
/// alongside positive client-supplied estimates.
pub mod wire {
    /// Server should consult its own tracker for the estimate.
    pub const ADAPTIVE: f64 = 0.0;
    pub const TTL_ONLY: f64 = -2.0;
    pub const INVALIDATE_ALWAYS: f64 = -3.0;
    pub const UPDATE_ALWAYS: f64 = -4.0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn break_even_scenario_from_the_spec() {
        let costs = CostConstants::new(10.0, 46.0);
        assert_eq!(costs.c_m(), 56.0);

        // 46 * 1.3 = 59.8 > 56 -> invalidate
        assert_eq!(decide(1.3, costs, PolicyMode::Adaptive), Action::Invalidate);
        // 46 * 1.1 = 50.6 < 56 -> update
        assert_eq!(decide(1.1, costs, PolicyMode::Adaptive), Action::Update);
        // no evidence -> invalidate
        assert_eq!(decide(NO_EVIDENCE, costs, PolicyMode::Adaptive), Action::Invalidate);
    }

    #[test]
    fn static_modes_ignore_ew() {
        let costs = CostConstants::default();
        assert_eq!(decide(0.0, costs, PolicyMode::TtlOnly), Action::Skip);
        assert_eq!(decide(1000.0, costs, PolicyMode::InvalidateAlways), Action::Invalidate);
        assert_eq!(decide(1000.0, costs, PolicyMode::UpdateAlways), Action::Update);
    }

    #[test]
    fn decision_is_a_pure_function_of_ew() {
        let costs = CostConstants::new(10.0, 46.0);
        for ew_millis in -2000..2000 {
            let ew = ew_millis as f64 / 1000.0;
            let a = decide(ew, costs, PolicyMode::Adaptive);
            let b = decide(ew, costs, PolicyMode::Adaptive);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn exact_break_even_point_updates() {
        // C_U * EW == C_M exactly: spec's ">" means equality still updates.
        let costs = CostConstants::new(10.0, 46.0);
        let ew = costs.c_m() / costs.c_u;
        assert_eq!(decide(ew, costs, PolicyMode::Adaptive), Action::Update);
    }
}
