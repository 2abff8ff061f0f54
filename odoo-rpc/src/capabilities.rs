use serde_json::json;

use crate::Transport;

/// Optional surfaces a connected instance may or may not expose. Detected
/// once per account and assumed stable for the session.
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    /// Timesheet rows can link to a ticket (`helpdesk_ticket_id`).
    pub ticket_link: bool,
    /// Running timers are tracked in a companion `timer.timer` model.
    pub companion_timer_model: bool,
}

impl Capabilities {
    pub async fn detect(transport: &dyn Transport) -> Self {
        let caps = Self {
            ticket_link: probe_field(transport, "account.analytic.line", "helpdesk_ticket_id")
                .await,
            companion_timer_model: probe_model(transport, "timer.timer").await,
        };
        tracing::debug!(?caps, "capabilities detected");
        caps
    }
}

/// Whether reading `field` off one record of `model` succeeds. Servers signal
/// unknown fields with generic errors, so any failure means "absent".
pub async fn probe_field(transport: &dyn Transport, model: &str, field: &str) -> bool {
    transport
        .read_filtered(model, json!([]), &["id", field], Some(1))
        .await
        .is_ok()
}

/// Whether `model` exists at all on this instance.
pub async fn probe_model(transport: &dyn Transport, model: &str) -> bool {
    transport
        .read_filtered(model, json!([]), &["id"], Some(1))
        .await
        .is_ok()
}
