pub mod completion;
pub mod duplicate_reflection;
pub mod marathon;
pub mod time_concentration;

use crate::events::PatternSignal;
use crate::state::window::UserWindow;

/// Run every pattern heuristic over one learner's window.
/// Heuristics returning None (not enough data / no signal) are dropped.
pub fn run_all(window: &UserWindow<'_>) -> Vec<PatternSignal> {
    let (tc, dup, comp, mar) = (
        time_concentration::analyze(window),
        duplicate_reflection::analyze(window),
        completion::analyze(window),
        marathon::analyze(window),
    );

    [tc, dup, comp, mar].into_iter().flatten().collect()
}
