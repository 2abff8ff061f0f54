use serde_json::{json, Value};

/// Builder for the JSON filter expression (`[["field", "op", value], ...]`)
/// that every filtered read takes. Conditions are implicitly AND-ed.
#[derive(Debug, Default, Clone)]
pub struct Domain(Vec<Value>);

impl Domain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: &str, op: &str, value: impl Into<Value>) -> Self {
        self.0.push(json!([field, op, value.into()]));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Array(self.0.clone())
    }
}

impl From<Domain> for Value {
    fn from(domain: Domain) -> Self {
        Value::Array(domain.0)
    }
}
