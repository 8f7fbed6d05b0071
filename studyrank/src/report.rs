// studyrank/src/report.rs
//
// Markdown output for operators and reviewers: leaderboard snapshots, the
// suspicious-learner review queue, and run summaries.

use std::fmt::Write;

use crate::events::{ActivityAlert, FlaggedStudent, ValidationResult};
use crate::scheduler::RunReport;
use crate::store::LeaderboardView;

pub fn leaderboard_markdown(view: &LeaderboardView) -> String {
    let mut out = String::new();
    let (doc, note) = match view {
        LeaderboardView::Exact(doc) => (doc, None),
        LeaderboardView::Fallback(doc) => (
            doc,
            Some(format!("_Requested day not aggregated; showing {}._", doc.aggregation_date)),
        ),
        LeaderboardView::NotGenerated => {
            out.push_str("Leaderboard has not been generated yet.\n");
            return out;
        }
    };

    let _ = writeln!(out, "# Leaderboard: {} / {}", doc.period, doc.scope);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "**Date**: {}  **Participants**: {}  **Updated**: {}",
        doc.aggregation_date,
        doc.total_participants,
        doc.last_updated.format("%Y-%m-%d %H:%M UTC")
    );
    if let Some(note) = note {
        let _ = writeln!(out, "{}", note);
    }
    let _ = writeln!(out);
    if doc.entries.is_empty() {
        let _ = writeln!(out, "No entries.");
        return out;
    }

    let school_scope = doc.entries.iter().any(|e| e.school_rank.is_some());
    let _ = writeln!(out, "| Rank | Name | School | Score | Cons | Qual | Eng | Streak | Sessions |");
    let _ = writeln!(out, "|------|------|--------|-------|------|------|-----|--------|----------|");
    for e in &doc.entries {
        let rank = if school_scope { e.school_rank.unwrap_or(e.rank) } else { e.rank };
        let b = &e.breakdown;
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} | {} | {} | {} |",
            rank, e.name, e.school, e.score, b.consistency, b.quality, b.engagement, b.streak, e.session_count
        );
    }
    out
}

pub fn flagged_markdown(flagged: &[FlaggedStudent], threshold: f64) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Review Queue");
    let _ = writeln!(out);
    let _ = writeln!(out, "**Flagged**: {}  **Threshold**: {:.2}", flagged.len(), threshold);
    let _ = writeln!(out);
    if flagged.is_empty() {
        let _ = writeln!(out, "No learners above threshold.");
        return out;
    }
    let _ = writeln!(out, "| Learner | Level | Issues |");
    let _ = writeln!(out, "|---------|-------|--------|");
    for f in flagged {
        let _ = writeln!(out, "| {} | {:.2} | {} |", f.user_id, f.suspicious_level, f.issues.join(", "));
    }
    out
}

pub fn run_markdown(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "| Run       | Value |");
    let _ = writeln!(out, "|-----------|-------|");
    let _ = writeln!(out, "| State     | {} |", report.state);
    if let Some(at) = report.started_at {
        let _ = writeln!(out, "| Started   | {} |", at.to_rfc3339());
    }
    if let Some(at) = report.finished_at {
        let _ = writeln!(out, "| Finished  | {} |", at.to_rfc3339());
    }
    let _ = writeln!(out, "| Documents | {} |", report.documents_written);
    let _ = writeln!(out, "| Scored    | {} |", report.users_scored);
    let _ = writeln!(out, "| Failures  | {} |", report.user_failures);
    if let Some(e) = &report.error {
        let _ = writeln!(out, "| Error     | {} |", e);
    }
    out
}

pub fn alert_markdown(user_id: &str, alert: &ActivityAlert) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "**{}**: {} ({} sessions in 24h, {} rapid pairs)",
        user_id, alert.alert_level, alert.sessions_last_24h, alert.rapid_pairs
    );
    for r in &alert.recommendations {
        let _ = writeln!(out, "- {}", r);
    }
    out
}

pub fn validation_markdown(result: &ValidationResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "**{}**", if result.is_valid { "ACCEPTED" } else { "REJECTED" });
    for w in &result.warnings {
        let _ = writeln!(out, "- {}", w);
    }
    out
}
