//! `stepwise goal`: Pursue a goal with a scripted plan.
//!
//! The plan file stands in for a language-model planner: its steps are
//! proposed in order, then the planner reports done. Gated steps prompt for
//! approval on stdin unless `--approve` is given.

use std::path::Path;
use std::sync::Arc;
use stepwise_api::AutomationApi;
use stepwise_core::{AutonomousTask, DomainEvent, PermissionScope, SessionStatus};
use stepwise_tools::ScriptedPlanner;
use tokio::sync::broadcast::error::RecvError;

use super::{load_config, read_steps};
use crate::commands::session::print_session;

pub async fn run(
    goal: &str,
    plan: &Path,
    domain: Option<&str>,
    scope: PermissionScope,
    visual: bool,
    auto_approve: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let steps = read_steps(plan)?;
    let api = AutomationApi::builder(load_config()?)
        .with_planner(Arc::new(ScriptedPlanner::from_steps(steps)))
        .build()
        .await?;

    let mut task = AutonomousTask::new(goal, scope).with_visual_perception(visual);
    if let Some(domain) = domain {
        task = task.with_domain(domain);
    }

    let mut rx = api.subscribe();
    let id = api.run_task(task).await?;
    println!("▶️  Session {id} queued (scope: {scope})");

    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        };
        let DomainEvent::SessionStatusChanged {
            session_id, status, ..
        } = &*event
        else {
            continue;
        };
        if session_id != &id {
            continue;
        }
        if status.is_terminal() {
            break;
        }
        if *status == SessionStatus::AwaitingApproval {
            let session = api.get_session(&id).await?;
            let step = session
                .pending_step
                .map(|s| s.to_string())
                .unwrap_or_default();
            if auto_approve || confirm(&step).await? {
                api.approve(&id).await?;
            } else {
                api.cancel(&id).await?;
            }
        }
    }

    let session = api.wait_for_session(&id).await?;
    print_session(&session);
    Ok(())
}

async fn confirm(step: &str) -> Result<bool, Box<dyn std::error::Error>> {
    println!("⚠️  Approval needed for: {step}");
    println!("   Proceed? [y/N]");
    let answer = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| line)
    })
    .await??;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
