//! Output formatting for CLI display.

use crate::model::{ActionItem, AffectedEndpoint, Branch, Endpoint};
use crate::onboard::OnboardingReport;
use crate::reconcile::{FanOut, TickReport};

/// One line per registered branch.
pub(super) fn format_branch(repository_url: &str, branch: &Branch) -> String {
    let extensions = if branch.included_extensions.is_empty() {
        "all files".to_string()
    } else {
        branch.included_extensions.join(" ")
    };
    format!(
        "{repository_url}@{} [{}] ({extensions})",
        branch.branch, branch.status
    )
}

pub(super) fn format_endpoint(endpoint: &Endpoint) -> String {
    if endpoint.description.is_empty() {
        return format!("#{} {} {}", endpoint.id, endpoint.method, endpoint.url);
    }
    format!(
        "#{} {} {}  {}",
        endpoint.id, endpoint.method, endpoint.url, endpoint.description
    )
}

pub(super) fn format_change(change: &AffectedEndpoint) -> String {
    format!(
        "change #{} [{}] {} from {} {}",
        change.id, change.status, change.kind, change.origin, change.origin_id
    )
}

pub(super) fn format_action_item(item: &ActionItem) -> String {
    format!("action item #{} [{}] {}", item.id, item.kind, item.status)
}

pub(super) fn format_fan_out(fan: &FanOut) -> String {
    let mut line = format!(
        "change #{}: {} client(s) impacted, {} item(s) created",
        fan.change_id, fan.clients_impacted, fan.items_created
    );
    if fan.items_flagged > 0 {
        line.push_str(&format!(", {} item(s) flagged updated", fan.items_flagged));
    }
    if fan.already_impacted > 0 {
        line.push_str(&format!(", {} already impacted", fan.already_impacted));
    }
    line
}

pub(super) fn format_tick(tick: &TickReport) -> String {
    if tick.completed.is_empty() && tick.failed.is_empty() {
        return "Nothing to reconcile".to_string();
    }
    let mut lines: Vec<String> = tick.completed.iter().map(format_fan_out).collect();
    lines.extend(
        tick.failed
            .iter()
            .map(|id| format!("change #{id}: failed, will retry")),
    );
    lines.join("\n")
}

pub(super) fn format_onboarding(report: &OnboardingReport) -> String {
    let mut line = format!(
        "{} endpoint(s) exposed, {} link(s) added, {} already linked",
        report.endpoints, report.linked, report.already_linked
    );
    if !report.skipped.is_empty() {
        line.push_str(&format!(
            "\nSkipped (not registered yet): {}",
            report.skipped.join(", ")
        ));
    }
    line
}
