use async_trait::async_trait;
use chrono::Utc;
use odoo_rpc::{Capabilities, Domain, RpcError, Transport};
use serde_json::{json, Value};

use crate::domain::{models, opt_str, parse_remote_datetime, TimerRecord, TimerSource};

use super::TimerBackend;

/// Older-generation semantics: running state lives out-of-band in a
/// companion `timer.timer` model keyed by `(res_model, res_id)`, and
/// start/stop go through the timesheet row itself.
pub struct CompanionTimerBackend;

impl CompanionTimerBackend {
    /// Best-effort display name for a companion row that has no matching
    /// timesheet record yet.
    async fn display_name(transport: &dyn Transport, model: &str, id: i64) -> String {
        let rows = transport
            .read_filtered(
                model,
                Domain::new().field("id", "=", id).to_value(),
                &["id", "display_name"],
                Some(1),
            )
            .await;
        rows.ok()
            .and_then(|rows| rows.into_iter().next())
            .and_then(|row| opt_str(row.get("display_name")).map(str::to_string))
            .unwrap_or_default()
    }
}

#[async_trait]
impl TimerBackend for CompanionTimerBackend {
    fn running_state_on_record(&self) -> bool {
        false
    }

    async fn enrich_running_state(
        &self,
        mut records: Vec<TimerRecord>,
        account_id: &str,
        uid: i64,
        caps: Capabilities,
        transport: &dyn Transport,
    ) -> Result<Vec<TimerRecord>, RpcError> {
        // Installs without the companion model cannot report running state;
        // records come back as fetched rather than failing the whole poll.
        if !caps.companion_timer_model {
            return Ok(records);
        }

        let rows = transport
            .read_filtered(
                models::COMPANION_TIMER,
                Domain::new().field("user_id", "=", uid).to_value(),
                &["id", "res_model", "res_id", "timer_start"],
                None,
            )
            .await?;

        for row in rows {
            let Some(res_model) = opt_str(row.get("res_model")).map(str::to_string) else {
                continue;
            };
            let Some(res_id) = row.get("res_id").and_then(Value::as_i64) else {
                continue;
            };
            let started_at = opt_str(row.get("timer_start")).and_then(parse_remote_datetime);

            let matched = records.iter().position(|record| match res_model.as_str() {
                models::TIMESHEET => record.id == res_id,
                models::TASK => matches!(record.source, TimerSource::Task { id, .. } if id == res_id),
                models::TICKET => {
                    matches!(record.source, TimerSource::Ticket { id, .. } if id == res_id)
                }
                _ => false,
            });

            match matched {
                Some(i) => records[i].started_at = started_at,
                None => {
                    // A running timer the remote has not materialized as a
                    // timesheet row yet; synthesize a placeholder so the
                    // caller has something to show.
                    let source = match res_model.as_str() {
                        models::TASK => TimerSource::Task {
                            id: res_id,
                            name: Self::display_name(transport, models::TASK, res_id).await,
                        },
                        models::TICKET => TimerSource::Ticket {
                            id: res_id,
                            name: Self::display_name(transport, models::TICKET, res_id).await,
                        },
                        _ => continue,
                    };
                    let row_id = row.get("id").and_then(Value::as_i64).unwrap_or(1);
                    records.push(TimerRecord {
                        id: -row_id,
                        account_id: account_id.to_string(),
                        description: source.label().unwrap_or_default().to_string(),
                        project: None,
                        source,
                        hours: 0.0,
                        started_at,
                        date: Utc::now().date_naive(),
                    });
                }
            }
        }

        Ok(records)
    }

    async fn start_timer(
        &self,
        record: &TimerRecord,
        transport: &dyn Transport,
    ) -> Result<(), RpcError> {
        let (model, id) = companion_target(record);
        transport.invoke(model, "action_timer_start", &[id]).await?;
        Ok(())
    }

    async fn stop_timer(
        &self,
        record: &TimerRecord,
        transport: &dyn Transport,
    ) -> Result<(), RpcError> {
        let (model, id) = companion_target(record);
        transport.invoke(model, "action_timer_stop", &[id]).await?;
        Ok(())
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

/// This generation addresses the timesheet row directly; placeholders have no
/// row yet, so they go through their originating entity.
fn companion_target(record: &TimerRecord) -> (&'static str, i64) {
    if record.is_placeholder() {
        match &record.source {
            TimerSource::Task { id, .. } => (models::TASK, *id),
            TimerSource::Ticket { id, .. } => (models::TICKET, *id),
            TimerSource::Standalone => (models::TIMESHEET, record.id),
        }
    } else {
        (models::TIMESHEET, record.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockTransport, Recorded};

    fn companion_caps() -> Capabilities {
        Capabilities { ticket_link: false, companion_timer_model: true }
    }

    fn stopped_task_record(id: i64, task_id: i64) -> TimerRecord {
        TimerRecord {
            id,
            account_id: "work".to_string(),
            description: "Review".to_string(),
            project: None,
            source: TimerSource::Task { id: task_id, name: "Review queue".to_string() },
            hours: 0.5,
            started_at: None,
            date: Utc::now().date_naive(),
        }
    }

    #[tokio::test]
    async fn merges_companion_rows_by_source_id() {
        let transport = MockTransport::new(9).with_read(
            models::COMPANION_TIMER,
            vec![json!({
                "id": 501,
                "res_model": models::TASK,
                "res_id": 7,
                "timer_start": "2026-08-26 08:00:00",
            })],
        );

        let records = vec![stopped_task_record(42, 7), stopped_task_record(43, 8)];
        let enriched = CompanionTimerBackend
            .enrich_running_state(records, "work", 9, companion_caps(), &transport)
            .await
            .unwrap();

        assert!(enriched[0].is_running());
        assert!(!enriched[1].is_running());
        assert_eq!(enriched.len(), 2);
    }

    #[tokio::test]
    async fn unmatched_companion_row_becomes_placeholder() {
        let transport = MockTransport::new(9)
            .with_read(
                models::COMPANION_TIMER,
                vec![json!({
                    "id": 501,
                    "res_model": models::TASK,
                    "res_id": 99,
                    "timer_start": "2026-08-26 08:00:00",
                })],
            )
            .with_read(
                models::TASK,
                vec![json!({ "id": 99, "display_name": "Forgotten task" })],
            );

        let enriched = CompanionTimerBackend
            .enrich_running_state(
                vec![stopped_task_record(42, 7)],
                "work",
                9,
                companion_caps(),
                &transport,
            )
            .await
            .unwrap();

        assert_eq!(enriched.len(), 2);
        let placeholder = &enriched[1];
        assert!(placeholder.is_placeholder());
        assert_eq!(placeholder.id, -501);
        assert!(placeholder.is_running());
        assert_eq!(placeholder.description, "Forgotten task");
        assert_eq!(placeholder.source.linked_id(), Some(99));
    }

    #[tokio::test]
    async fn absent_companion_model_skips_the_merge() {
        let transport = MockTransport::new(9).failing_model(models::COMPANION_TIMER);
        let caps = Capabilities { ticket_link: false, companion_timer_model: false };

        let enriched = CompanionTimerBackend
            .enrich_running_state(vec![stopped_task_record(42, 7)], "work", 9, caps, &transport)
            .await
            .unwrap();

        assert_eq!(enriched.len(), 1);
        assert!(!enriched[0].is_running());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn stop_addresses_timesheet_row_for_real_records() {
        let transport = MockTransport::new(9);
        CompanionTimerBackend
            .stop_timer(&stopped_task_record(42, 7), &transport)
            .await
            .unwrap();

        assert_eq!(
            transport.calls(),
            vec![Recorded::Invoke {
                model: models::TIMESHEET.to_string(),
                method: "action_timer_stop".to_string(),
                ids: vec![42],
            }]
        );
    }

    #[tokio::test]
    async fn stop_addresses_source_for_placeholders() {
        let transport = MockTransport::new(9);
        CompanionTimerBackend
            .stop_timer(&stopped_task_record(-501, 99), &transport)
            .await
            .unwrap();

        assert_eq!(
            transport.calls(),
            vec![Recorded::Invoke {
                model: models::TASK.to_string(),
                method: "action_timer_stop".to_string(),
                ids: vec![99],
            }]
        );
    }
}
