use async_trait::async_trait;
use odoo_rpc::{Capabilities, RpcError, Transport};
use serde_json::{json, Value};

use crate::domain::{models, TimerRecord, TimerSource};

use super::TimerBackend;

/// Newer-generation semantics: `timer_start` on the timesheet row is
/// authoritative, but timers linked to a task or ticket must be started and
/// stopped through that originating entity. Stops may come back as a
/// confirmation wizard instead of a plain result.
pub struct TaskTimerBackend;

/// The record a start/stop call is addressed to.
fn call_target(record: &TimerRecord) -> (&'static str, i64) {
    match &record.source {
        TimerSource::Task { id, .. } => (models::TASK, *id),
        TimerSource::Ticket { id, .. } => (models::TICKET, *id),
        TimerSource::Standalone => (models::TIMESHEET, record.id),
    }
}

impl TaskTimerBackend {
    /// A stop result shaped like `{res_model, context, ...}` is a wizard the
    /// server expects us to fill in and confirm before the stop is final.
    async fn complete_stop_wizard(
        &self,
        result: Value,
        transport: &dyn Transport,
    ) -> Result<(), RpcError> {
        let Some(res_model) = result.get("res_model").and_then(Value::as_str) else {
            return Ok(());
        };
        let context = result.get("context").cloned().unwrap_or_else(|| json!({}));
        let active_id = context.get("active_id").and_then(Value::as_i64);
        let time_spent = context
            .get("default_time_spent")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);

        let values = match res_model {
            models::TASK_STOP_WIZARD => json!({
                "task_id": active_id,
                "time_spent": time_spent,
            }),
            models::TICKET_STOP_WIZARD => json!({
                "ticket_id": active_id,
                "time_spent": time_spent,
            }),
            other => {
                // Unknown wizard kind: the remote timer is stopped but
                // unconfirmed; the reconcile poll will show server truth.
                tracing::warn!("ignoring unrecognized stop wizard {other}");
                return Ok(());
            }
        };

        let wizard_id = transport.create_record(res_model, values).await?;
        transport
            .invoke_with_args(
                res_model,
                "save_timesheet",
                json!([[wizard_id]]),
                json!({ "context": context }),
            )
            .await?;

        Ok(())
    }
}

#[async_trait]
impl TimerBackend for TaskTimerBackend {
    fn running_state_on_record(&self) -> bool {
        true
    }

    async fn enrich_running_state(
        &self,
        records: Vec<TimerRecord>,
        _account_id: &str,
        _uid: i64,
        _caps: Capabilities,
        _transport: &dyn Transport,
    ) -> Result<Vec<TimerRecord>, RpcError> {
        // Primary record carries `timer_start`; nothing to cross-reference.
        Ok(records)
    }

    async fn start_timer(
        &self,
        record: &TimerRecord,
        transport: &dyn Transport,
    ) -> Result<(), RpcError> {
        let (model, id) = call_target(record);
        transport.invoke(model, "action_timer_start", &[id]).await?;
        Ok(())
    }

    async fn stop_timer(
        &self,
        record: &TimerRecord,
        transport: &dyn Transport,
    ) -> Result<(), RpcError> {
        let (model, id) = call_target(record);
        let result = transport.invoke(model, "action_timer_stop", &[id]).await?;
        self.complete_stop_wizard(result, transport).await
    }

    async fn start_from_source(
        &self,
        source: &TimerSource,
        transport: &dyn Transport,
    ) -> Result<(), RpcError> {
        let (model, id) = match source {
            TimerSource::Task { id, .. } => (models::TASK, *id),
            TimerSource::Ticket { id, .. } => (models::TICKET, *id),
            TimerSource::Standalone => {
                let id = transport
                    .create_record(models::TIMESHEET, json!({ "name": "" }))
                    .await?;
                (models::TIMESHEET, id)
            }
        };
        transport.invoke(model, "action_timer_start", &[id]).await?;
        Ok(())
    }
}
