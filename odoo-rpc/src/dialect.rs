use std::sync::Arc;

use strum::{Display, EnumString};

use crate::{Json2Transport, JsonRpcTransport, RpcError, Transport};

/// Which of the two wire dialects a connected instance speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[strum(ascii_case_insensitive, serialize = "json2")]
    Json2,
    #[strum(ascii_case_insensitive, serialize = "jsonrpc")]
    JsonRpc,
}

/// Dialect selection: `Auto` probes, the others skip detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectChoice {
    #[default]
    #[strum(ascii_case_insensitive, serialize = "auto")]
    Auto,
    #[strum(ascii_case_insensitive, serialize = "json2")]
    Json2,
    #[strum(ascii_case_insensitive, serialize = "jsonrpc")]
    JsonRpc,
}

#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub base_url: String,
    pub database: String,
    pub login: String,
    pub api_key: String,
}

/// An established connection: the chosen dialect and its transport, fixed for
/// the lifetime of the account that owns it. There is no mid-session
/// re-detection; servers do not change generation under a running client.
pub struct Connection {
    pub dialect: Dialect,
    pub uid: i64,
    pub transport: Arc<dyn Transport>,
}

/// Connect by trying the newer dialect first and falling back to the older
/// one on any failure (network, auth, or protocol shape alike).
pub async fn connect(params: &ConnectParams, choice: DialectChoice) -> Result<Connection, RpcError> {
    let newer: Arc<dyn Transport> = Arc::new(Json2Transport::new(params)?);
    let older: Arc<dyn Transport> = Arc::new(JsonRpcTransport::new(params)?);
    detect(newer, older, choice).await
}

async fn detect(
    newer: Arc<dyn Transport>,
    older: Arc<dyn Transport>,
    choice: DialectChoice,
) -> Result<Connection, RpcError> {
    if matches!(choice, DialectChoice::Auto | DialectChoice::Json2) {
        match newer.authenticate().await {
            Ok(uid) => {
                return Ok(Connection {
                    dialect: Dialect::Json2,
                    uid,
                    transport: newer,
                });
            }
            Err(e) if choice == DialectChoice::Json2 => return Err(e),
            Err(e) => tracing::debug!("json2 dialect unavailable, falling back: {e}"),
        }
    }

    let uid = older.authenticate().await?;
    Ok(Connection {
        dialect: Dialect::JsonRpc,
        uid,
        transport: older,
    })
}
