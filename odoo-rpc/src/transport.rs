use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Per-call timeout shared by both dialect clients.
pub(crate) const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("server error: {0}")]
    Protocol(String),
    #[error("unexpected response shape: {0}")]
    Parsing(String),
}

impl From<reqwest::Error> for RpcError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RpcError::Timeout
        } else {
            RpcError::Transport(e.to_string())
        }
    }
}

/// One authenticated connection to a remote instance, independent of which
/// wire dialect it speaks. A transport caches its resolved session uid after
/// the first successful `authenticate` and reuses it for every later call.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Resolve (and cache) the session user id.
    async fn authenticate(&self) -> Result<i64, RpcError>;

    /// Read records of `model` matching the filter `domain`, restricted to
    /// `fields`. `limit = None` means no limit.
    async fn read_filtered(
        &self,
        model: &str,
        domain: Value,
        fields: &[&str],
        limit: Option<u32>,
    ) -> Result<Vec<Value>, RpcError>;

    /// Call `method` on the given record ids, no extra arguments.
    async fn invoke(&self, model: &str, method: &str, ids: &[i64]) -> Result<Value, RpcError>;

    /// Call `method` with explicit positional and named arguments.
    async fn invoke_with_args(
        &self,
        model: &str,
        method: &str,
        args: Value,
        kwargs: Value,
    ) -> Result<Value, RpcError>;

    /// `name_search`-style autocomplete: ranked `(id, display name)` pairs.
    async fn autocomplete(
        &self,
        model: &str,
        query: &str,
        domain: Value,
        limit: u32,
    ) -> Result<Vec<(i64, String)>, RpcError>;

    /// Create a record and return its new id.
    async fn create_record(&self, model: &str, values: Value) -> Result<i64, RpcError>;
}

/// Parse the `[[id, name], ...]` pairs a name_search call returns.
pub(crate) fn parse_name_search(value: Value) -> Result<Vec<(i64, String)>, RpcError> {
    let rows = value
        .as_array()
        .ok_or_else(|| RpcError::Parsing("name_search result is not an array".to_string()))?;

    let mut pairs = Vec::with_capacity(rows.len());
    for row in rows {
        let pair = row.as_array();
        let id = pair.and_then(|p| p.first()).and_then(Value::as_i64);
        let name = pair.and_then(|p| p.get(1)).and_then(Value::as_str);
        match (id, name) {
            (Some(id), Some(name)) => pairs.push((id, name.to_string())),
            _ => {
                return Err(RpcError::Parsing(format!(
                    "malformed name_search row: {row}"
                )))
            }
        }
    }

    Ok(pairs)
}

/// Create takes a list of value maps and returns a list of ids (single-record
/// form also accepted by older servers, which return a bare id).
pub(crate) fn parse_created_id(value: Value) -> Result<i64, RpcError> {
    match &value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| RpcError::Parsing(format!("non-integer create result: {value}"))),
        Value::Array(ids) => ids
            .first()
            .and_then(Value::as_i64)
            .ok_or_else(|| RpcError::Parsing(format!("empty create result: {value}"))),
        _ => Err(RpcError::Parsing(format!(
            "unexpected create result: {value}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn name_search_pairs() {
        let parsed = parse_name_search(json!([[4, "Website relaunch"], [9, "Support rota"]]))
            .expect("valid pairs");
        assert_eq!(parsed, vec![(4, "Website relaunch".to_string()), (9, "Support rota".to_string())]);
    }

    #[test]
    fn name_search_rejects_malformed_row() {
        assert!(parse_name_search(json!([["not-an-id", "x"]])).is_err());
    }

    #[test]
    fn created_id_accepts_both_shapes() {
        assert_eq!(parse_created_id(json!(17)).unwrap(), 17);
        assert_eq!(parse_created_id(json!([17])).unwrap(), 17);
        assert!(parse_created_id(json!({"id": 17})).is_err());
    }
}
