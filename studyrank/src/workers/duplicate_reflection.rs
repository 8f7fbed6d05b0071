// studyrank/src/workers/duplicate_reflection.rs
//
// Copy-pasted reflections. Text is normalized (trim, lowercase, collapse
// whitespace) before counting, so trivial edits do not hide a duplicate.
//
// Only evaluated once more than MIN_REFLECTIONS sessions carry a reflection.

use std::collections::HashSet;

use crate::events::{PatternKind, PatternSignal};
use crate::state::window::UserWindow;

const MIN_REFLECTIONS: usize = 3;
const DUPLICATE_RATIO: f64 = 0.50;
const POINTS: u32 = 30;

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn analyze(window: &UserWindow<'_>) -> Option<PatternSignal> {
    let reflections: Vec<String> = window
        .sessions
        .iter()
        .filter_map(|t| t.session.reflection_text())
        .map(normalize)
        .collect();

    let count = reflections.len();
    if count <= MIN_REFLECTIONS {
        return None;
    }

    let distinct = reflections.iter().collect::<HashSet<_>>().len();
    let ratio = (count - distinct) as f64 / count as f64;
    if ratio <= DUPLICATE_RATIO {
        return None;
    }

    Some(PatternSignal {
        kind:     PatternKind::DuplicateReflection,
        points:   POINTS,
        evidence: format!("duplicate_reflections:{}_distinct_of_{}", distinct, count),
    })
}
