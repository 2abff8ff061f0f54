use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Where a timesheet row originates: started from a task, from a ticket, or
/// entered directly with no linked entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TimerSource {
    Task { id: i64, name: String },
    Ticket { id: i64, name: String },
    Standalone,
}

impl TimerSource {
    /// Id of the originating entity, when there is one.
    pub fn linked_id(&self) -> Option<i64> {
        match self {
            TimerSource::Task { id, .. } | TimerSource::Ticket { id, .. } => Some(*id),
            TimerSource::Standalone => None,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            TimerSource::Task { name, .. } | TimerSource::Ticket { name, .. } => Some(name),
            TimerSource::Standalone => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum TimerState {
    Running,
    Stopped,
}

/// One mirrored timesheet row, possibly currently running. Negative ids mark
/// locally synthesized placeholders the remote has not materialized yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimerRecord {
    pub id: i64,
    pub account_id: String,
    pub description: String,
    pub project: Option<String>,
    pub source: TimerSource,
    /// Accumulated duration in hours, excluding any running stretch.
    pub hours: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub date: NaiveDate,
}

impl TimerRecord {
    pub fn state(&self) -> TimerState {
        if self.started_at.is_some() {
            TimerState::Running
        } else {
            TimerState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn is_placeholder(&self) -> bool {
        self.id < 0
    }

    /// Accumulated hours plus the running stretch up to `now`. Exactly
    /// `hours` when stopped.
    pub fn elapsed_hours_at(&self, now: DateTime<Utc>) -> f64 {
        match self.started_at {
            Some(started) => self.hours + (now - started).num_seconds().max(0) as f64 / 3600.0,
            None => self.hours,
        }
    }

    pub fn elapsed_seconds_at(&self, now: DateTime<Utc>) -> i64 {
        (self.elapsed_hours_at(now) * 3600.0).round() as i64
    }

    /// Parse one remote row. Optional fields arrive as `false`; only a
    /// missing id makes the row unusable.
    pub fn from_remote(account_id: &str, row: &Value) -> Result<Self, String> {
        let id = row
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| format!("row without id: {row}"))?;

        let source = if let Some((id, name)) = many2one(row.get("task_id")) {
            TimerSource::Task { id, name }
        } else if let Some((id, name)) = many2one(row.get("helpdesk_ticket_id")) {
            TimerSource::Ticket { id, name }
        } else {
            TimerSource::Standalone
        };

        let date = opt_str(row.get("date"))
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .unwrap_or_else(|| Utc::now().date_naive());

        Ok(Self {
            id,
            account_id: account_id.to_string(),
            description: opt_str(row.get("name")).unwrap_or_default().to_string(),
            project: many2one(row.get("project_id")).map(|(_, name)| name),
            source,
            hours: row.get("unit_amount").and_then(Value::as_f64).unwrap_or(0.0),
            started_at: opt_str(row.get("timer_start")).and_then(parse_remote_datetime),
            date,
        })
    }
}

/// Remote datetimes are naive UTC strings (`2026-08-26 08:15:00`).
pub fn parse_remote_datetime(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Many2one fields arrive as `[id, "display name"]`, or `false` when unset.
pub fn many2one(value: Option<&Value>) -> Option<(i64, String)> {
    let pair = value?.as_array()?;
    let id = pair.first()?.as_i64()?;
    let name = pair.get(1)?.as_str()?.to_string();
    Some((id, name))
}

/// String fields arrive as `false` when unset, never `null`.
pub fn opt_str(value: Option<&Value>) -> Option<&str> {
    value?.as_str()
}
