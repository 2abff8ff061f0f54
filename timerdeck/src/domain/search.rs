use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum SearchKind {
    Task,
    Ticket,
    RecentTimesheet,
}

/// One hit from a cross-kind search. Ephemeral; never cached.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Task or ticket id for linked kinds, timesheet id for standalone
    /// recent entries.
    pub id: i64,
    pub name: String,
    pub kind: SearchKind,
    pub project: Option<String>,
    /// The timesheet row a recent-timesheet hit would resume.
    pub record_id: Option<i64>,
}
