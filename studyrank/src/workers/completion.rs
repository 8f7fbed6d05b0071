// studyrank/src/workers/completion.rs
//
// Implausible self-reported completion: nearly every session claims ~100%.
// Only evaluated once more than MIN_REPORTS sessions carry a completion percent.

use crate::events::{PatternKind, PatternSignal};
use crate::state::window::UserWindow;

const MIN_REPORTS: usize = 5;
const HIGH_COMPLETION: f64 = 95.0;
const HIGH_RATIO: f64 = 0.80;
const POINTS: u32 = 25;

pub fn analyze(window: &UserWindow<'_>) -> Option<PatternSignal> {
    let reported: Vec<f64> = window
        .sessions
        .iter()
        .filter_map(|t| t.session.achievement)
        .filter(|a| a.is_finite())
        .collect();

    let n = reported.len();
    if n <= MIN_REPORTS {
        return None;
    }

    let high = reported.iter().filter(|&&a| a >= HIGH_COMPLETION).count();
    let ratio = high as f64 / n as f64;
    if ratio <= HIGH_RATIO {
        return None;
    }

    Some(PatternSignal {
        kind:     PatternKind::ImplausibleCompletion,
        points:   POINTS,
        evidence: format!("completion_ge_95:{}_of_{}", high, n),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::test_support::{at_hour, window_of};

    fn with_achievement(values: &[f64]) -> Vec<crate::events::Session> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mut s = at_hour(i as i64, 9 + i as u32 % 10);
                s.achievement = Some(*v);
                s
            })
            .collect()
    }

    #[test]
    fn fires_when_almost_everything_is_perfect() {
        let sessions = with_achievement(&[100.0, 99.0, 98.0, 100.0, 96.0, 100.0]);
        assert_eq!(analyze(&window_of(&sessions)).unwrap().points, 25);
    }

    #[test]
    fn needs_more_than_five_reports() {
        let sessions = with_achievement(&[100.0; 5]);
        assert_eq!(analyze(&window_of(&sessions)), None);
    }

    #[test]
    fn realistic_spread_is_quiet() {
        let sessions = with_achievement(&[100.0, 80.0, 60.0, 95.0, 70.0, 100.0, 50.0]);
        assert_eq!(analyze(&window_of(&sessions)), None);
    }
}
