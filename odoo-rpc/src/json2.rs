use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::OnceCell;

use crate::{parse_created_id, parse_name_search, ConnectParams, RpcError, Transport, REQUEST_TIMEOUT};

/// The newer wire dialect: one endpoint per model/method pair under
/// `/json/2/`, authenticated with a bearer key instead of a session.
pub struct Json2Transport {
    http: reqwest::Client,
    base_url: String,
    database: String,
    login: String,
    api_key: String,
    uid: OnceCell<i64>,
}

impl Json2Transport {
    pub fn new(params: &ConnectParams) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: params.base_url.trim_end_matches('/').to_string(),
            database: params.database.clone(),
            login: params.login.clone(),
            api_key: params.api_key.clone(),
            uid: OnceCell::new(),
        })
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/json/2/{model}/{method}", self.base_url)
    }

    async fn call(&self, model: &str, method: &str, body: Value) -> Result<Value, RpcError> {
        let resp = self
            .http
            .post(self.endpoint(model, method))
            .bearer_auth(&self.api_key)
            .header("X-Odoo-Database", &self.database)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status == 401 || status == 403 {
            return Err(RpcError::AuthenticationFailed(format!(
                "bearer key rejected ({status})"
            )));
        }
        if !status.is_success() {
            // Error bodies carry a message field when the server got far
            // enough to produce a structured error.
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or(text);
            return Err(RpcError::Protocol(message));
        }

        resp.json().await.map_err(|e| RpcError::Parsing(e.to_string()))
    }
}

#[async_trait]
impl Transport for Json2Transport {
    async fn authenticate(&self) -> Result<i64, RpcError> {
        self.uid
            .get_or_try_init(|| async {
                // No login round-trip in this dialect; resolving our own user
                // row doubles as the reachability check.
                let rows = self
                    .call(
                        "res.users",
                        "search_read",
                        json!({
                            "domain": [["login", "=", self.login]],
                            "fields": ["id"],
                            "limit": 1,
                        }),
                    )
                    .await?;

                rows.as_array()
                    .and_then(|r| r.first())
                    .and_then(|row| row.get("id"))
                    .and_then(Value::as_i64)
                    .ok_or_else(|| {
                        RpcError::AuthenticationFailed(format!(
                            "no user matching {} on {}",
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
        let mut body = json!({ "domain": domain, "fields": fields });
        if let Some(limit) = limit {
            body["limit"] = json!(limit);
        }

        let result = self.call(model, "search_read", body).await?;
        match result {
            Value::Array(rows) => Ok(rows),
            other => Err(RpcError::Parsing(format!(
                "search_read returned non-array: {other}"
            ))),
        }
    }

    async fn invoke(&self, model: &str, method: &str, ids: &[i64]) -> Result<Value, RpcError> {
        self.call(model, method, json!({ "ids": ids })).await
    }

    async fn invoke_with_args(
        &self,
        model: &str,
        method: &str,
        args: Value,
        kwargs: Value,
    ) -> Result<Value, RpcError> {
        let mut body = match kwargs {
            Value::Object(map) => Value::Object(map),
            Value::Null => json!({}),
            other => return Err(RpcError::Parsing(format!("kwargs must be a map: {other}"))),
        };
        if !args.is_null() {
            body["args"] = args;
        }
        self.call(model, method, body).await
    }

    async fn autocomplete(
        &self,
        model: &str,
        query: &str,
        domain: Value,
        limit: u32,
    ) -> Result<Vec<(i64, String)>, RpcError> {
        let result = self
            .call(
                model,
                "name_search",
                json!({ "name": query, "domain": domain, "limit": limit }),
            )
            .await?;
        parse_name_search(result)
    }

    async fn create_record(&self, model: &str, values: Value) -> Result<i64, RpcError> {
        let result = self
            .call(model, "create", json!({ "vals_list": [values] }))
            .await?;
        parse_created_id(result)
    }
}
