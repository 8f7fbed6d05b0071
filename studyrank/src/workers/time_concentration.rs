// studyrank/src/workers/time_concentration.rs
//
// Hour-of-day concentration. Genuine study drifts across the day; scripted
// or back-filled logging tends to land in the same hour every time.

use std::collections::HashMap;

use crate::events::{PatternKind, PatternSignal};
use crate::state::window::UserWindow;

const DOMINANT_HOUR_RATIO: f64 = 0.80;
const POINTS: u32 = 20;

pub fn analyze(window: &UserWindow<'_>) -> Option<PatternSignal> {
    let n = window.len();
    if n == 0 {
        return None;
    }

    let mut per_hour: HashMap<u32, usize> = HashMap::new();
    for t in &window.sessions {
        *per_hour.entry(window.policy().hour_of(t.at)).or_insert(0) += 1;
    }
    // Lowest hour wins ties so evidence is stable across runs.
    let (hour, count) = per_hour
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))?;

    let ratio = count as f64 / n as f64;
    if ratio <= DOMINANT_HOUR_RATIO {
        return None;
    }

    Some(PatternSignal {
        kind:     PatternKind::TimeConcentration,
        points:   POINTS,
        evidence: format!("hour_{:02}:{:.0}%_of_{}", hour, ratio * 100.0, n),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::test_support::{at_hour, window_of};

    #[test]
    fn fires_when_one_hour_dominates() {
        let sessions: Vec<_> = (0..10).map(|d| at_hour(d, 22)).collect();
        let sig = analyze(&window_of(&sessions)).unwrap();
        assert_eq!(sig.points, 20);
        assert!(sig.evidence.starts_with("hour_22"));
    }

    #[test]
    fn silent_at_exactly_eighty_percent() {
        let mut sessions: Vec<_> = (0..8).map(|d| at_hour(d, 22)).collect();
        sessions.push(at_hour(8, 9));
        sessions.push(at_hour(9, 15));
        assert_eq!(analyze(&window_of(&sessions)), None);
    }
}
