use std::sync::Arc;

use chrono::{Duration, Local};
use odoo_rpc::{
    connect, Capabilities, ConnectParams, DialectChoice, Domain, RpcError, Transport,
};
use tokio::sync::OnceCell;

use crate::{
    backend::{backend_for, TimerBackend},
    domain::{models, SearchKind, SearchResult, TimerRecord, TimerSource},
};

/// Per-account gateway to the remote service: fetches and parses timesheet
/// records, passes mutations through the backend, and runs searches. Holds
/// no cache beyond the write-once session and capability memos.
pub struct RecordService {
    account_id: String,
    transport: Arc<dyn Transport>,
    backend: Box<dyn TimerBackend>,
    uid: i64,
    capabilities: OnceCell<Capabilities>,
}

impl RecordService {
    /// Detect the dialect, authenticate, and fix both for this account's
    /// lifetime.
    pub async fn connect(
        account_id: &str,
        params: &ConnectParams,
        choice: DialectChoice,
    ) -> Result<Self, RpcError> {
        let conn = connect(params, choice).await?;
        tracing::info!(
            account = account_id,
            dialect = %conn.dialect,
            uid = conn.uid,
            "account connected"
        );
        Ok(Self::from_parts(
            account_id,
            conn.transport,
            backend_for(conn.dialect),
            conn.uid,
        ))
    }

    pub fn from_parts(
        account_id: &str,
        transport: Arc<dyn Transport>,
        backend: Box<dyn TimerBackend>,
        uid: i64,
    ) -> Self {
        Self {
            account_id: account_id.to_string(),
            transport,
            backend,
            uid,
            capabilities: OnceCell::new(),
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    async fn capabilities(&self) -> Capabilities {
        *self
            .capabilities
            .get_or_init(|| Capabilities::detect(self.transport.as_ref()))
            .await
    }

    /// Field list adapted to this backend generation and what the
    /// installation supports.
    async fn timesheet_fields(&self) -> Vec<&'static str> {
        let caps = self.capabilities().await;
        let mut fields = vec!["id", "name", "project_id", "task_id", "unit_amount", "date"];
        if self.backend.running_state_on_record() {
            fields.push("timer_start");
        }
        if caps.ticket_link {
            fields.push("helpdesk_ticket_id");
        }
        fields
    }

    fn parse_rows(&self, rows: Vec<serde_json::Value>) -> Vec<TimerRecord> {
        rows.iter()
            .filter_map(|row| match TimerRecord::from_remote(&self.account_id, row) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(account = self.account_id, "skipping unparsable row: {e}");
                    None
                }
            })
            .collect()
    }

    /// All of the session user's records dated today (local calendar date),
    /// with running state resolved by the backend.
    pub async fn fetch_today(&self) -> Result<Vec<TimerRecord>, RpcError> {
        let caps = self.capabilities().await;
        let fields = self.timesheet_fields().await;
        let today = Local::now().date_naive();
        let domain = Domain::new()
            .field("user_id", "=", self.uid)
            .field("date", "=", today.format("%Y-%m-%d").to_string());

        let rows = self
            .transport
            .read_filtered(models::TIMESHEET, domain.to_value(), &fields, None)
            .await?;
        let records = self.parse_rows(rows);

        self.backend
            .enrich_running_state(records, &self.account_id, self.uid, caps, self.transport.as_ref())
            .await
    }

    pub async fn start_timer(&self, record: &TimerRecord) -> Result<(), RpcError> {
        self.backend
            .start_timer(record, self.transport.as_ref())
            .await
    }

    pub async fn stop_timer(&self, record: &TimerRecord) -> Result<(), RpcError> {
        self.backend
            .stop_timer(record, self.transport.as_ref())
            .await
    }

    pub async fn start_from_source(&self, source: &TimerSource) -> Result<(), RpcError> {
        self.backend
            .start_from_source(source, self.transport.as_ref())
            .await
    }

    pub async fn delete_timesheet(&self, record_id: i64) -> Result<(), RpcError> {
        self.transport
            .invoke(models::TIMESHEET, "unlink", &[record_id])
            .await?;
        Ok(())
    }

    /// Search tasks, tickets and recent own records. Each sub-search is
    /// independently best-effort; one failing never hides the others.
    pub async fn search(&self, query: &str) -> Vec<SearchResult> {
        let caps = self.capabilities().await;
        let (tasks, tickets, recents) = tokio::join!(
            self.search_tasks(query),
            self.search_tickets(query, caps.ticket_link),
            self.search_recent(query),
        );

        let mut results = Vec::new();
        for (label, outcome) in [("tasks", tasks), ("tickets", tickets), ("recent", recents)] {
            match outcome {
                Ok(mut hits) => results.append(&mut hits),
                Err(e) => {
                    tracing::warn!(account = self.account_id, "{label} search failed: {e}")
                }
            }
        }
        results
    }

    async fn search_tasks(&self, query: &str) -> Result<Vec<SearchResult>, RpcError> {
        let domain = Domain::new().field("allow_timesheets", "=", true);
        let pairs = self
            .transport
            .autocomplete(models::TASK, query, domain.to_value(), 10)
            .await?;
        Ok(pairs
            .into_iter()
            .map(|(id, name)| SearchResult {
                id,
                name,
                kind: SearchKind::Task,
                project: None,
                record_id: None,
            })
            .collect())
    }

    async fn search_tickets(
        &self,
        query: &str,
        enabled: bool,
    ) -> Result<Vec<SearchResult>, RpcError> {
        if !enabled {
            return Ok(Vec::new());
        }
        let pairs = self
            .transport
            .autocomplete(models::TICKET, query, Domain::new().to_value(), 10)
            .await?;
        Ok(pairs
            .into_iter()
            .map(|(id, name)| SearchResult {
                id,
                name,
                kind: SearchKind::Ticket,
                project: None,
                record_id: None,
            })
            .collect())
    }

    /// Client-side scan of the last 7 days of own records.
    async fn search_recent(&self, query: &str) -> Result<Vec<SearchResult>, RpcError> {
        let fields = self.timesheet_fields().await;
        let since = Local::now().date_naive() - Duration::days(7);
        let domain = Domain::new()
            .field("user_id", "=", self.uid)
            .field("date", ">=", since.format("%Y-%m-%d").to_string());

        let rows = self
            .transport
            .read_filtered(models::TIMESHEET, domain.to_value(), &fields, None)
            .await?;
        Ok(recent_hits(self.parse_rows(rows), query))
    }
}

/// Filter records against the query, newest first, one hit per originating
/// task/ticket (or per record for standalone rows).
pub fn recent_hits(mut records: Vec<TimerRecord>, query: &str) -> Vec<SearchResult> {
    let needle = query.to_lowercase();
    records.sort_by(|a, b| b.date.cmp(&a.date));

    let mut seen = std::collections::HashSet::new();
    records
        .into_iter()
        .filter(|record| {
            needle.is_empty()
                || record.description.to_lowercase().contains(&needle)
                || record
                    .project
                    .as_deref()
                    .is_some_and(|p| p.to_lowercase().contains(&needle))
                || record
                    .source
                    .label()
                    .is_some_and(|l| l.to_lowercase().contains(&needle))
        })
        .filter(|record| {
            let key = match &record.source {
                TimerSource::Task { id, .. } => (SearchKind::Task, *id),
                TimerSource::Ticket { id, .. } => (SearchKind::Ticket, *id),
                TimerSource::Standalone => (SearchKind::RecentTimesheet, record.id),
            };
            seen.insert(key)
        })
        .map(|record| SearchResult {
            id: record.source.linked_id().unwrap_or(record.id),
            name: record
                .source
                .label()
                .map(str::to_string)
                .unwrap_or_else(|| record.description.clone()),
            kind: SearchKind::RecentTimesheet,
            project: record.project.clone(),
            record_id: Some(record.id),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockTransport, Recorded};
    use chrono::NaiveDate;
    use serde_json::json;

    fn service(transport: &Arc<MockTransport>) -> RecordService {
        RecordService::from_parts(
            "work",
            transport.clone(),
            backend_for(odoo_rpc::Dialect::Json2),
            7,
        )
    }

    fn last_timesheet_fetch(transport: &MockTransport) -> Vec<String> {
        transport
            .calls()
            .iter()
            .rev()
            .find_map(|c| match c {
                Recorded::Read { model, fields, .. } if model == models::TIMESHEET => {
                    Some(fields.clone())
                }
                _ => None,
            })
            .expect("timesheet fetch recorded")
    }

    fn record(id: i64, date: &str, source: TimerSource, description: &str) -> TimerRecord {
        TimerRecord {
            id,
            account_id: "work".to_string(),
            description: description.to_string(),
            project: None,
            source,
            hours: 1.0,
            started_at: None,
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        }
    }

    #[tokio::test]
    async fn rejected_field_is_excluded_from_fetches() {
        let transport = Arc::new(
            MockTransport::new(7)
                .failing_field("helpdesk_ticket_id")
                .failing_model(models::COMPANION_TIMER)
                .with_read(models::TIMESHEET, vec![]),
        );

        let service = service(&transport);
        service.fetch_today().await.unwrap();

        let fetch = last_timesheet_fetch(&transport);
        assert!(!fetch.contains(&"helpdesk_ticket_id".to_string()));
        assert!(fetch.contains(&"timer_start".to_string()));
    }

    #[tokio::test]
    async fn fetch_survives_missing_companion_model() {
        let transport = Arc::new(
            MockTransport::new(7)
                .failing_model(models::COMPANION_TIMER)
                .failing_field("helpdesk_ticket_id")
                .with_read(models::TIMESHEET, vec![]),
        );

        let service = RecordService::from_parts(
            "work",
            transport.clone(),
            backend_for(odoo_rpc::Dialect::JsonRpc),
            7,
        );
        let records = service.fetch_today().await.unwrap();
        assert!(records.is_empty());

        // older generation without the companion model: no timer_start field
        let fetch = last_timesheet_fetch(&transport);
        assert!(!fetch.contains(&"timer_start".to_string()));
    }

    #[tokio::test]
    async fn primary_timer_field_fetched_even_with_companion_model_present() {
        let transport = Arc::new(MockTransport::new(7).with_read(models::TIMESHEET, vec![]));

        let service = service(&transport);
        service.fetch_today().await.unwrap();

        let fetch = last_timesheet_fetch(&transport);
        assert!(fetch.contains(&"timer_start".to_string()));
    }

    #[tokio::test]
    async fn task_search_maps_autocomplete_pairs() {
        let transport = Arc::new(
            MockTransport::new(7)
                .failing_field("helpdesk_ticket_id")
                .failing_model(models::COMPANION_TIMER)
                .with_autocomplete(models::TASK, vec![(7, "Review queue".to_string())])
                .with_read(models::TIMESHEET, vec![]),
        );

        let service = service(&transport);
        let hits = service.search("review").await;

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].kind, SearchKind::Task);
        assert_eq!(hits[0].id, 7);
        assert_eq!(hits[0].name, "Review queue");
    }

    #[tokio::test]
    async fn one_failing_sub_search_does_not_hide_the_others() {
        let transport = Arc::new(
            MockTransport::new(7)
                .failing_model(models::TASK)
                .failing_field("helpdesk_ticket_id")
                .failing_model(models::COMPANION_TIMER)
                .with_read(
                    models::TIMESHEET,
                    vec![json!({
                        "id": 12,
                        "name": "standup notes",
                        "project_id": false,
                        "task_id": false,
                        "unit_amount": 0.25,
                        "timer_start": false,
                        "date": "2026-08-25",
                    })],
                ),
        );

        let service = service(&transport);
        let hits = service.search("standup").await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].kind, SearchKind::RecentTimesheet);
        assert_eq!(hits[0].record_id, Some(12));
    }

    #[test]
    fn recent_hits_dedup_by_task_prefers_newest() {
        let task = |id| TimerSource::Task { id, name: "Review queue".to_string() };
        let records = vec![
            record(1, "2026-08-20", task(7), "older"),
            record(2, "2026-08-25", task(7), "newer"),
            record(3, "2026-08-24", TimerSource::Standalone, "review prep"),
        ];

        let hits = recent_hits(records, "review");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, 7);
        assert_eq!(hits[0].record_id, Some(2));
        assert_eq!(hits[1].record_id, Some(3));
    }

    #[test]
    fn recent_hits_matches_description_case_insensitively() {
        let records = vec![record(1, "2026-08-25", TimerSource::Standalone, "Standup Notes")];
        assert_eq!(recent_hits(records.clone(), "standup").len(), 1);
        assert_eq!(recent_hits(records, "retro").len(), 0);
    }
}
