//! Human-readable session summaries, composed from the session log.

use stepwise_core::{ExecutionSession, LogLevel, SessionMode, SessionTarget};

pub(crate) fn compose(session: &ExecutionSession) -> String {
    let headline = match &session.target {
        SessionTarget::Macro {
            macro_id,
            speed,
            loops,
        } => format!("Replayed macro {macro_id} ×{loops} at speed {speed}"),
        SessionTarget::Goal { task } => format!("Goal \"{}\"", task.goal_text),
    };

    let failed: Vec<String> = session
        .logs
        .iter()
        .filter(|l| l.level == LogLevel::Error && l.strategy.is_none())
        .filter(|l| l.message.contains(" failed: ") && !l.message.starts_with("session "))
        .map(|l| match (session.mode, l.step_index) {
            (SessionMode::Macro, Some(i)) => format!("loop {} step {i}", l.loop_index + 1),
            (_, Some(i)) => format!("iteration {}", i + 1),
            (_, None) => "unknown step".into(),
        })
        .collect();
    let recoveries = session.logs.iter().filter(|l| l.strategy.is_some()).count();

    let mut summary = format!("{headline}: {} actions", session.steps_executed);
    if !failed.is_empty() {
        summary.push_str(&format!(", {} failed ({})", failed.len(), failed.join(", ")));
    }
    if recoveries > 0 {
        summary.push_str(&format!(", {recoveries} failed recovery attempts"));
    }
    if let Some(elapsed) = session.elapsed() {
        summary.push_str(&format!(", {} ms", elapsed.num_milliseconds()));
    }
    if let Some(done) = session
        .logs
        .iter()
        .rev()
        .find_map(|l| l.message.strip_prefix("planner done: "))
    {
        summary.push_str(&format!(". {done}"));
    }
    if let Some(failure) = &session.failure {
        summary.push_str(&format!(". Ended with: {}", failure.error));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use stepwise_core::{AutonomousTask, PermissionScope};

    #[test]
    fn macro_summary_lists_failed_steps() {
        let now = Utc::now();
        let target = SessionTarget::Macro {
            macro_id: "m1".into(),
            speed: 2.0,
            loops: 1,
        };
        let mut s = ExecutionSession::new("s1", target, now);
        s.started_at = Some(now);
        s.steps_executed = 4;
        s.current_step_index = 2;
        s.log(LogLevel::Error, "type(selector=#pass) failed: no element", now);
        s.finished_at = Some(now + Duration::milliseconds(750));

        let text = compose(&s);
        assert_eq!(
            text,
            "Replayed macro m1 ×1 at speed 2: 4 actions, 1 failed (loop 1 step 2), 750 ms"
        );
    }

    #[test]
    fn goal_summary_includes_planner_note() {
        let now = Utc::now();
        let task = AutonomousTask::new("find the invoice", PermissionScope::Read);
        let mut s = ExecutionSession::new("s2", SessionTarget::Goal { task }, now);
        s.steps_executed = 3;
        s.log(LogLevel::Info, "planner done: invoice #42 found", now);
        let text = compose(&s);
        assert!(text.starts_with("Goal \"find the invoice\": 3 actions"));
        assert!(text.ends_with(". invoice #42 found"));
    }
}
