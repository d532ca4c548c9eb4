use tracing::{debug, info, warn};

use super::repo;
use crate::issues::repo::{Issue, IssueStatus};
use crate::state::AppState;
use crate::users::repo::UserProfile;

fn status_label(status: IssueStatus) -> &'static str {
    match status {
        IssueStatus::Open => "open",
        IssueStatus::InProgress => "in progress",
        IssueStatus::Resolved => "resolved",
    }
}

/// Tells the reporter their issue changed status: one notification row, one
/// best-effort push. Honors the reporter's notify_status_updates preference
/// for the push; the row is always written so the in-app list stays complete.
pub async fn notify_status_change(st: &AppState, issue: &Issue) -> anyhow::Result<()> {
    let title = format!("Your report is now {}", status_label(issue.status));
    let body = issue.title.clone();
    let data = serde_json::json!({
        "issue_id": issue.id,
        "status": issue.status,
    });

    repo::insert(&st.db, issue.reporter_id, &title, &body, &data).await?;
    info!(issue_id = %issue.id, reporter_id = %issue.reporter_id, status = ?issue.status,
          "status notification stored");

    let Some(reporter) = UserProfile::find_by_id(&st.db, issue.reporter_id).await? else {
        return Ok(());
    };
    if !reporter.notify_status_updates {
        debug!(user_id = %reporter.id, "push skipped by preference");
        return Ok(());
    }
    let Some(token) = reporter.push_token.as_deref() else {
        return Ok(());
    };

    // Try once, log, continue.
    if let Err(e) = st.push.send(token, &title, &body, &data).await {
        warn!(error = %e, user_id = %reporter.id, "push delivery failed");
    }

    Ok(())
}
