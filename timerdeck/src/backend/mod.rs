mod companion;
mod task_timer;

pub use companion::CompanionTimerBackend;
pub use task_timer::TaskTimerBackend;

use async_trait::async_trait;
use odoo_rpc::{Capabilities, Dialect, RpcError, Transport};

use crate::domain::{TimerRecord, TimerSource};

/// Version-specific timer semantics: how running state is represented and
/// which underlying record a start/stop call must be addressed to. One boxed
/// variant is chosen per account at connect time; nothing downstream inspects
/// which one it got.
#[async_trait]
pub trait TimerBackend: Send + Sync {
    /// Whether `timer_start` on the primary record is the source of truth
    /// for running state (and therefore worth fetching).
    fn running_state_on_record(&self) -> bool;

    /// Merge running-timer markers into freshly fetched records, for
    /// generations where the primary record is not the source of truth.
    async fn enrich_running_state(
        &self,
        records: Vec<TimerRecord>,
        account_id: &str,
        uid: i64,
        caps: Capabilities,
        transport: &dyn Transport,
    ) -> Result<Vec<TimerRecord>, RpcError>;

    async fn start_timer(
        &self,
        record: &TimerRecord,
        transport: &dyn Transport,
    ) -> Result<(), RpcError>;

    /// Stop, completing any multi-step confirmation flow the server demands.
    async fn stop_timer(
        &self,
        record: &TimerRecord,
        transport: &dyn Transport,
    ) -> Result<(), RpcError>;

    /// Start a timer from a search hit, before any timesheet row exists.
    async fn start_from_source(
        &self,
        source: &TimerSource,
        transport: &dyn Transport,
    ) -> Result<(), RpcError>;
}

pub fn backend_for(dialect: Dialect) -> Box<dyn TimerBackend> {
    match dialect {
        Dialect::Json2 => Box::new(TaskTimerBackend),
        Dialect::JsonRpc => Box::new(CompanionTimerBackend),
    }
}
