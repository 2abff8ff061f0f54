use axum::{extract::Path, extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use crate::{
    app_state::AppState,
    coordinator::AccountInfo,
    domain::{TimerRecord, TimerState},
};

use super::ErrorResponse;

/// One cached record as external tools see it. Ids are composite
/// `accountId:recordId` strings so one flat list covers every account.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerDto {
    pub id: String,
    pub name: String,
    pub display_label: String,
    pub project_name: Option<String>,
    pub account_id: String,
    pub state: TimerState,
    pub elapsed: String,
    pub elapsed_seconds: i64,
}

impl TimerDto {
    fn from_record(record: &TimerRecord, now: DateTime<Utc>) -> Self {
        let seconds = record.elapsed_seconds_at(now);
        Self {
            id: format!("{}:{}", record.account_id, record.id),
            name: record.description.clone(),
            display_label: record
                .source
                .label()
                .unwrap_or(&record.description)
                .to_string(),
            project_name: record.project.clone(),
            account_id: record.account_id.clone(),
            state: record.state(),
            elapsed: format_elapsed(seconds),
            elapsed_seconds: seconds,
        }
    }
}

fn format_elapsed(total_seconds: i64) -> String {
    let total_seconds = total_seconds.max(0);
    format!(
        "{}:{:02}:{:02}",
        total_seconds / 3600,
        (total_seconds % 3600) / 60,
        total_seconds % 60
    )
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

const OK: OkResponse = OkResponse { ok: true };

#[instrument(name = "list_timers", skip(state))]
pub async fn list_timers(State(state): State<AppState>) -> Json<Vec<TimerDto>> {
    let now = Utc::now();
    let records = state.coordinator.all_records().await;
    Json(
        records
            .iter()
            .map(|record| TimerDto::from_record(record, now))
            .collect(),
    )
}

#[instrument(name = "list_accounts", skip(state))]
pub async fn list_accounts(State(state): State<AppState>) -> Json<Vec<AccountInfo>> {
    Json(state.coordinator.accounts().await)
}

#[instrument(name = "start_timer", skip(state))]
pub async fn start_timer(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>, ErrorResponse> {
    state.coordinator.start_timer(&id).await?;
    Ok(Json(OK))
}

#[instrument(name = "stop_timer", skip(state))]
pub async fn stop_timer(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>, ErrorResponse> {
    state.coordinator.stop_timer(&id).await?;
    Ok(Json(OK))
}

#[instrument(name = "toggle_timer", skip(state))]
pub async fn toggle_timer(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>, ErrorResponse> {
    state.coordinator.toggle_timer(&id).await?;
    Ok(Json(OK))
}

#[instrument(name = "delete_timer", skip(state))]
pub async fn delete_timer(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>, ErrorResponse> {
    state.coordinator.delete_timer(&id).await?;
    Ok(Json(OK))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_renders_hours_minutes_seconds() {
        assert_eq!(format_elapsed(0), "0:00:00");
        assert_eq!(format_elapsed(59), "0:00:59");
        assert_eq!(format_elapsed(3661), "1:01:01");
        assert_eq!(format_elapsed(36_000), "10:00:00");
    }
}
