use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;

use crate::{parse_created_id, parse_name_search, ConnectParams, RpcError, Transport, REQUEST_TIMEOUT};

/// The older wire dialect: every call goes through a single `/jsonrpc`
/// endpoint wrapped in a `service`/`method`/`args` envelope, addressed with
/// the uid resolved at login.
pub struct JsonRpcTransport {
    http: reqwest::Client,
    endpoint: String,
    database: String,
    login: String,
    api_key: String,
    uid: OnceCell<i64>,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    // `result` may legitimately be null (void methods), so no Option here.
    #[serde(default)]
    result: Value,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    message: String,
    data: Option<RpcErrorData>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorData {
    message: Option<String>,
}

impl JsonRpcTransport {
    pub fn new(params: &ConnectParams) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            endpoint: format!("{}/jsonrpc", params.base_url.trim_end_matches('/')),
            database: params.database.clone(),
            login: params.login.clone(),
            api_key: params.api_key.clone(),
            uid: OnceCell::new(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, service: &str, method: &str, args: Value) -> Result<Value, RpcError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": {
                "service": service,
                "method": method,
                "args": args,
            },
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
        });

        let resp = self.http.post(&self.endpoint).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RpcError::Transport(format!(
                "unexpected status {status} from {}",
                self.endpoint
            )));
        }

        let envelope: RpcEnvelope = resp
            .json()
            .await
            .map_err(|e| RpcError::Parsing(e.to_string()))?;

        if let Some(error) = envelope.error {
            let message = error
                .data
                .and_then(|d| d.message)
                .unwrap_or(error.message);
            return Err(RpcError::Protocol(message));
        }

        Ok(envelope.result)
    }

    async fn execute_kw(
        &self,
        model: &str,
        method: &str,
        args: Value,
        kwargs: Value,
    ) -> Result<Value, RpcError> {
        let uid = self.authenticate().await?;
        self.call(
            "object",
            "execute_kw",
            json!([self.database, uid, self.api_key, model, method, args, kwargs]),
        )
        .await
    }
}

#[async_trait]
impl Transport for JsonRpcTransport {
    async fn authenticate(&self) -> Result<i64, RpcError> {
        self.uid
            .get_or_try_init(|| async {
                let result = self
                    .call(
                        "common",
                        "authenticate",
                        json!([self.database, self.login, self.api_key, {}]),
                    )
                    .await?;

                // A wrong login yields `false` rather than an error envelope.
                result.as_i64().ok_or_else(|| {
                    RpcError::AuthenticationFailed(format!(
                        "login rejected for {} on {}",
                        self.login, self.database
                    ))
                })
            })
            .await
            .copied()
    }

    async fn read_filtered(
        &self,
        model: &str,
        domain: Value,
        fields: &[&str],
        limit: Option<u32>,
    ) -> Result<Vec<Value>, RpcError> {
        let mut kwargs = json!({ "fields": fields });
        if let Some(limit) = limit {
            kwargs["limit"] = json!(limit);
        }

        let result = self
            .execute_kw(model, "search_read", json!([domain]), kwargs)
            .await?;
        match result {
            Value::Array(rows) => Ok(rows),
            other => Err(RpcError::Parsing(format!(
                "search_read returned non-array: {other}"
            ))),
        }
    }

    async fn invoke(&self, model: &str, method: &str, ids: &[i64]) -> Result<Value, RpcError> {
        self.execute_kw(model, method, json!([ids]), json!({})).await
    }

    async fn invoke_with_args(
        &self,
        model: &str,
        method: &str,
        args: Value,
        kwargs: Value,
    ) -> Result<Value, RpcError> {
        self.execute_kw(model, method, args, kwargs).await
    }

    async fn autocomplete(
        &self,
        model: &str,
        query: &str,
        domain: Value,
        limit: u32,
    ) -> Result<Vec<(i64, String)>, RpcError> {
        let result = self
            .execute_kw(
                model,
                "name_search",
                json!([query]),
                json!({ "args": domain, "limit": limit }),
            )
            .await?;
        parse_name_search(result)
    }

    async fn create_record(&self, model: &str, values: Value) -> Result<i64, RpcError> {
        let result = self
            .execute_kw(model, "create", json!([values]), json!({}))
            .await?;
        parse_created_id(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_has_single_slash() {
        let params = ConnectParams {
            base_url: "https://erp.example.com/".to_string(),
            database: "prod".to_string(),
            login: "me@example.com".to_string(),
            api_key: "key".to_string(),
        };
        let transport = JsonRpcTransport::new(&params).unwrap();
        assert_eq!(transport.endpoint, "https://erp.example.com/jsonrpc");
    }

    #[test]
    fn error_envelope_prefers_data_message() {
        let raw = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 3,
            "error": {
                "code": 200,
                "message": "Odoo Server Error",
                "data": { "message": "Invalid field 'helpdesk_ticket_id'" }
            }
        });
        let envelope: RpcEnvelope = serde_json::from_value(raw).unwrap();
        let error = envelope.error.unwrap();
        let message = error.data.and_then(|d| d.message).unwrap_or(error.message);
        assert_eq!(message, "Invalid field 'helpdesk_ticket_id'");
    }
}
