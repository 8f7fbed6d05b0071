// studyrank/src/workers/marathon.rs
//
// Marathon sessions: most logged sessions run three hours or longer,
// which is how inflated durations usually look.

use crate::events::{PatternKind, PatternSignal};
use crate::state::window::UserWindow;

const MARATHON_MINUTES: u32 = 180;
const MARATHON_RATIO: f64 = 0.70;
const POINTS: u32 = 25;

pub fn analyze(window: &UserWindow<'_>) -> Option<PatternSignal> {
    let n = window.len();
    if n == 0 {
        return None;
    }

    let long = window
        .sessions
        .iter()
        .filter(|t| t.session.duration >= MARATHON_MINUTES)
        .count();
    let ratio = long as f64 / n as f64;
    if ratio <= MARATHON_RATIO {
        return None;
    }

    Some(PatternSignal {
        kind:     PatternKind::MarathonSession,
        points:   POINTS,
        evidence: format!("sessions_ge_{}min:{:.0}%", MARATHON_MINUTES, ratio * 100.0),
    })
}
