//! Scripted transport used by backend, service and coordinator tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use odoo_rpc::{RpcError, Transport};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Read { model: String, domain: Value, fields: Vec<String>, limit: Option<u32> },
    Invoke { model: String, method: String, ids: Vec<i64> },
    InvokeArgs { model: String, method: String, args: Value, kwargs: Value },
    Autocomplete { model: String, query: String },
    Create { model: String, values: Value },
}

#[derive(Default)]
pub struct MockTransport {
    uid: i64,
    calls: Mutex<Vec<Recorded>>,
    reads: Mutex<HashMap<String, Vec<Value>>>,
    invokes: Mutex<HashMap<(String, String), Value>>,
    autocompletes: Mutex<HashMap<String, Vec<(i64, String)>>>,
    failing_models: Mutex<Vec<String>>,
    failing_fields: Mutex<Vec<String>>,
    next_created_id: AtomicI64,
}

impl MockTransport {
    pub fn new(uid: i64) -> Self {
        Self {
            uid,
            next_created_id: AtomicI64::new(1000),
            ..Self::default()
        }
    }

    pub fn with_read(self, model: &str, rows: Vec<Value>) -> Self {
        self.reads.lock().unwrap().insert(model.to_string(), rows);
        self
    }

    pub fn with_invoke(self, model: &str, method: &str, result: Value) -> Self {
        self.invokes
            .lock()
            .unwrap()
            .insert((model.to_string(), method.to_string()), result);
        self
    }

    pub fn with_autocomplete(self, model: &str, pairs: Vec<(i64, String)>) -> Self {
        self.autocompletes
            .lock()
            .unwrap()
            .insert(model.to_string(), pairs);
        self
    }

    /// Every read or autocomplete against this model fails.
    pub fn failing_model(self, model: &str) -> Self {
        self.failing_models.lock().unwrap().push(model.to_string());
        self
    }

    /// Every read requesting this field fails, like a server that does not
    /// know it.
    pub fn failing_field(self, field: &str) -> Self {
        self.failing_fields.lock().unwrap().push(field.to_string());
        self
    }

    pub fn set_next_created_id(&self, id: i64) {
        self.next_created_id.store(id, Ordering::Relaxed);
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Recorded) {
        self.calls.lock().unwrap().push(call);
    }

    fn model_fails(&self, model: &str) -> bool {
        self.failing_models
            .lock()
            .unwrap()
            .iter()
            .any(|m| m == model)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn authenticate(&self) -> Result<i64, RpcError> {
        Ok(self.uid)
    }

    async fn read_filtered(
        &self,
        model: &str,
        domain: Value,
        fields: &[&str],
        limit: Option<u32>,
    ) -> Result<Vec<Value>, RpcError> {
        self.record(Recorded::Read {
            model: model.to_string(),
            domain,
            fields: fields.iter().map(|f| f.to_string()).collect(),
            limit,
        });

        if self.model_fails(model) {
            return Err(RpcError::Protocol(format!("no such model {model}")));
        }
        let failing_fields = self.failing_fields.lock().unwrap().clone();
        if let Some(bad) = fields.iter().find(|f| failing_fields.iter().any(|b| b == *f)) {
            return Err(RpcError::Protocol(format!("invalid field {bad} on {model}")));
        }

        Ok(self
            .reads
            .lock()
            .unwrap()
            .get(model)
            .cloned()
            .unwrap_or_default())
    }

    async fn invoke(&self, model: &str, method: &str, ids: &[i64]) -> Result<Value, RpcError> {
        self.record(Recorded::Invoke {
            model: model.to_string(),
            method: method.to_string(),
            ids: ids.to_vec(),
        });

        if self.model_fails(model) {
            return Err(RpcError::Protocol(format!("no such model {model}")));
        }
        Ok(self
            .invokes
            .lock()
            .unwrap()
            .get(&(model.to_string(), method.to_string()))
            .cloned()
            .unwrap_or(Value::Bool(true)))
    }

    async fn invoke_with_args(
        &self,
        model: &str,
        method: &str,
        args: Value,
        kwargs: Value,
    ) -> Result<Value, RpcError> {
        self.record(Recorded::InvokeArgs {
            model: model.to_string(),
            method: method.to_string(),
            args,
            kwargs,
        });
        Ok(Value::Bool(true))
    }

    async fn autocomplete(
        &self,
        model: &str,
        query: &str,
        _domain: Value,
        _limit: u32,
    ) -> Result<Vec<(i64, String)>, RpcError> {
        self.record(Recorded::Autocomplete {
            model: model.to_string(),
            query: query.to_string(),
        });

        if self.model_fails(model) {
            return Err(RpcError::Protocol(format!("no such model {model}")));
        }
        Ok(self
            .autocompletes
            .lock()
            .unwrap()
            .get(model)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_record(&self, model: &str, values: Value) -> Result<i64, RpcError> {
        self.record(Recorded::Create {
            model: model.to_string(),
            values,
        });
        Ok(self.next_created_id.fetch_add(1, Ordering::Relaxed))
    }
}
