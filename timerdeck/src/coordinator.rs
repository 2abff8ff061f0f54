use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicI64, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::Utc;
use futures_util::{stream::FuturesUnordered, StreamExt};
use odoo_rpc::{ConnectParams, DialectChoice, RpcError};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::instrument;

use crate::{
    config::{AccountSettings, Settings},
    domain::{SearchKind, SearchResult, TimerRecord, TimerSource},
    secrets,
    service::RecordService,
};

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("unknown timer id: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AccountStatus {
    Unconfigured,
    Connecting,
    Polling,
    Erroring,
}

/// Cached state for one account. Poll results replace `records` wholesale;
/// optimistic mutations patch them in place until the next poll corrects
/// them. On poll failure the previous slice is retained, stale data beats a
/// blank list.
pub struct AccountSlot {
    pub label: String,
    pub url: String,
    pub status: AccountStatus,
    pub error: Option<String>,
    pub records: Vec<TimerRecord>,
    last_seq: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub id: String,
    pub label: String,
    pub url: String,
}

/// Spec for one account's poller: connection parameters resolved from config
/// plus the secret store, or `None` when no credential is configured.
#[derive(Clone)]
pub struct AccountSpec {
    pub settings: AccountSettings,
    pub params: Option<ConnectParams>,
    pub choice: DialectChoice,
}

impl AccountSpec {
    pub fn resolve(settings: AccountSettings) -> Self {
        let params = secrets::api_key_for(&settings.id).map(|api_key| ConnectParams {
            base_url: settings.url.clone(),
            database: settings.database.clone(),
            login: settings.login.clone(),
            api_key,
        });
        let choice = settings.dialect;
        Self { settings, params, choice }
    }
}

/// Single owner of all cached timer state. Every read and write goes through
/// the slot map's lock; pollers and mutation tasks never touch anything else
/// shared.
#[derive(Clone)]
pub struct Coordinator {
    slots: Arc<RwLock<HashMap<String, AccountSlot>>>,
    services: Arc<RwLock<HashMap<String, Arc<RecordService>>>>,
    specs: Arc<Vec<AccountSpec>>,
    poll_interval: Duration,
    seq: Arc<AtomicU64>,
    next_placeholder_id: Arc<AtomicI64>,
}

impl Coordinator {
    pub fn new(specs: Vec<AccountSpec>, poll_interval: Duration) -> Self {
        let slots = specs
            .iter()
            .map(|spec| {
                let slot = AccountSlot {
                    label: spec.settings.label.clone(),
                    url: spec.settings.url.clone(),
                    status: if spec.params.is_some() {
                        AccountStatus::Connecting
                    } else {
                        AccountStatus::Unconfigured
                    },
                    error: spec
                        .params
                        .is_none()
                        .then(|| "no credential configured for this account".to_string()),
                    records: Vec::new(),
                    last_seq: 0,
                };
                (spec.settings.id.clone(), slot)
            })
            .collect();

        Self {
            slots: Arc::new(RwLock::new(slots)),
            services: Arc::new(RwLock::new(HashMap::new())),
            specs: Arc::new(specs),
            poll_interval,
            seq: Arc::new(AtomicU64::new(0)),
            next_placeholder_id: Arc::new(AtomicI64::new(-1)),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let specs = settings
            .accounts
            .iter()
            .cloned()
            .map(AccountSpec::resolve)
            .collect();
        Self::new(
            specs,
            Duration::from_secs(settings.application.poll_interval_secs),
        )
    }

    /// One independent poll task per configured account; a failing account
    /// never delays another.
    pub fn spawn_pollers(&self) {
        for spec in self.specs.iter() {
            if spec.params.is_none() {
                tracing::warn!(account = spec.settings.id, "no credential, not polling");
                continue;
            }
            let coordinator = self.clone();
            let spec = spec.clone();
            tokio::spawn(async move { coordinator.poll_loop(spec).await });
        }
    }

    #[instrument(name = "poll_loop", skip(self, spec), fields(account = %spec.settings.id))]
    async fn poll_loop(&self, spec: AccountSpec) {
        let account_id = spec.settings.id.clone();
        let params = spec.params.expect("poll_loop requires credentials");
        let mut interval = tokio::time::interval(self.poll_interval);

        // Dialect detection runs once; until it succeeds the slot stays in
        // Connecting with the failure visible.
        let service = loop {
            match RecordService::connect(&account_id, &params, spec.choice).await {
                Ok(service) => break Arc::new(service),
                Err(e) => {
                    tracing::warn!("connect failed: {e}");
                    self.set_connect_error(&account_id, &e).await;
                    interval.tick().await;
                }
            }
        };
        self.services
            .write()
            .await
            .insert(account_id.clone(), service.clone());

        // Fixed interval, no backoff. The sequence number is drawn before
        // the fetch so a slow poll cannot overwrite a newer one.
        loop {
            interval.tick().await;
            let seq = self.next_seq();
            let result = service.fetch_today().await;
            self.apply_poll(&account_id, seq, result).await;
        }
    }

    async fn set_connect_error(&self, account_id: &str, error: &RpcError) {
        if let Some(slot) = self.slots.write().await.get_mut(account_id) {
            slot.status = AccountStatus::Connecting;
            slot.error = Some(error.to_string());
        }
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Apply one poll outcome. Results older than what the slot already has
    /// are discarded; errors keep the stale slice visible.
    pub async fn apply_poll(
        &self,
        account_id: &str,
        seq: u64,
        result: Result<Vec<TimerRecord>, RpcError>,
    ) {
        let mut slots = self.slots.write().await;
        let Some(slot) = slots.get_mut(account_id) else {
            return;
        };
        if seq <= slot.last_seq {
            tracing::debug!(account = account_id, seq, "discarding stale poll result");
            return;
        }
        slot.last_seq = seq;

        match result {
            Ok(records) => {
                slot.records = records;
                slot.error = None;
                slot.status = AccountStatus::Polling;
            }
            Err(e) => {
                tracing::warn!(account = account_id, "poll failed: {e}");
                slot.error = Some(e.to_string());
                slot.status = AccountStatus::Erroring;
            }
        }
    }

    /// Reconcile an account right now, off the fixed cadence.
    fn poll_account_soon(&self, account_id: &str) {
        let coordinator = self.clone();
        let account_id = account_id.to_string();
        tokio::spawn(async move {
            let service = coordinator.services.read().await.get(&account_id).cloned();
            if let Some(service) = service {
                let seq = coordinator.next_seq();
                let result = service.fetch_today().await;
                coordinator.apply_poll(&account_id, seq, result).await;
            }
        });
    }

    /// Clear the running flag on every record in every account, so an
    /// optimistic start never renders two running rows even transiently.
    fn clear_running(slots: &mut HashMap<String, AccountSlot>) {
        for slot in slots.values_mut() {
            for record in &mut slot.records {
                record.started_at = None;
            }
        }
    }

    fn split_composite(composite: &str) -> Result<(&str, i64), CoordinatorError> {
        composite
            .split_once(':')
            .and_then(|(account, rest)| rest.parse::<i64>().ok().map(|id| (account, id)))
            .ok_or_else(|| CoordinatorError::NotFound(composite.to_string()))
    }

    /// Optimistically mark the target running (clearing every other record,
    /// in every account, to avoid a two-running flicker), then fire the
    /// remote call and reconcile. Remote failure is never rolled back; the
    /// next poll corrects the cache.
    pub async fn start_timer(&self, composite: &str) -> Result<(), CoordinatorError> {
        let (account_id, record_id) = Self::split_composite(composite)?;
        let record = {
            let mut slots = self.slots.write().await;
            let slot = slots
                .get_mut(account_id)
                .ok_or_else(|| CoordinatorError::NotFound(composite.to_string()))?;
            let record = slot
                .records
                .iter()
                .find(|r| r.id == record_id)
                .cloned()
                .ok_or_else(|| CoordinatorError::NotFound(composite.to_string()))?;

            Self::clear_running(&mut slots);
            let slot = slots.get_mut(account_id).expect("slot checked above");
            if let Some(target) = slot.records.iter_mut().find(|r| r.id == record_id) {
                target.started_at = Some(Utc::now());
            }
            record
        };

        self.dispatch(account_id, move |service| async move {
            service.start_timer(&record).await
        });
        Ok(())
    }

    pub async fn stop_timer(&self, composite: &str) -> Result<(), CoordinatorError> {
        let (account_id, record_id) = Self::split_composite(composite)?;
        let record = {
            let mut slots = self.slots.write().await;
            let slot = slots
                .get_mut(account_id)
                .ok_or_else(|| CoordinatorError::NotFound(composite.to_string()))?;
            let target = slot
                .records
                .iter_mut()
                .find(|r| r.id == record_id)
                .ok_or_else(|| CoordinatorError::NotFound(composite.to_string()))?;
            let record = target.clone();
            target.started_at = None;
            record
        };

        self.dispatch(account_id, move |service| async move {
            service.stop_timer(&record).await
        });
        Ok(())
    }

    pub async fn toggle_timer(&self, composite: &str) -> Result<(), CoordinatorError> {
        let (account_id, record_id) = Self::split_composite(composite)?;
        let running = {
            let slots = self.slots.read().await;
            slots
                .get(account_id)
                .and_then(|slot| slot.records.iter().find(|r| r.id == record_id))
                .map(|r| r.is_running())
                .ok_or_else(|| CoordinatorError::NotFound(composite.to_string()))?
        };

        if running {
            self.stop_timer(composite).await
        } else {
            self.start_timer(composite).await
        }
    }

    /// Remove locally right away; the remote delete follows.
    pub async fn delete_timer(&self, composite: &str) -> Result<(), CoordinatorError> {
        let (account_id, record_id) = Self::split_composite(composite)?;
        {
            let mut slots = self.slots.write().await;
            let slot = slots
                .get_mut(account_id)
                .ok_or_else(|| CoordinatorError::NotFound(composite.to_string()))?;
            let before = slot.records.len();
            slot.records.retain(|r| r.id != record_id);
            if slot.records.len() == before {
                return Err(CoordinatorError::NotFound(composite.to_string()));
            }
        }

        self.dispatch(account_id, move |service| async move {
            service.delete_timesheet(record_id).await
        });
        Ok(())
    }

    /// Start from a search hit. A recent-timesheet hit resumes its existing
    /// record; anything else gets a placeholder row (negative id) so there
    /// is something to render until the next poll brings the real one.
    pub async fn start_from_search(
        &self,
        account_id: &str,
        hit: &SearchResult,
    ) -> Result<(), CoordinatorError> {
        if let Some(record_id) = hit.record_id {
            let composite = format!("{account_id}:{record_id}");
            let known = {
                let slots = self.slots.read().await;
                slots
                    .get(account_id)
                    .is_some_and(|slot| slot.records.iter().any(|r| r.id == record_id))
            };
            if known {
                return self.start_timer(&composite).await;
            }
            // The row exists remotely but is outside today's cache (the hit
            // came from the 7-day scan); resume it rather than creating a
            // fresh one.
            return self.resume_record(account_id, record_id, hit).await;
        }

        let source = match hit.kind {
            SearchKind::Task => TimerSource::Task { id: hit.id, name: hit.name.clone() },
            SearchKind::Ticket => TimerSource::Ticket { id: hit.id, name: hit.name.clone() },
            SearchKind::RecentTimesheet => TimerSource::Standalone,
        };

        {
            let mut slots = self.slots.write().await;
            if !slots.contains_key(account_id) {
                return Err(CoordinatorError::NotFound(account_id.to_string()));
            }
            Self::clear_running(&mut slots);
            let slot = slots.get_mut(account_id).expect("presence checked above");
            slot.records.push(TimerRecord {
                id: self.next_placeholder_id.fetch_sub(1, Ordering::Relaxed),
                account_id: account_id.to_string(),
                description: hit.name.clone(),
                project: hit.project.clone(),
                source: source.clone(),
                hours: 0.0,
                started_at: Some(Utc::now()),
                date: Utc::now().date_naive(),
            });
        }

        self.dispatch(account_id, move |service| async move {
            service.start_from_source(&source).await
        });
        Ok(())
    }

    /// Restart an existing timesheet row that is not in today's cache. The
    /// optimistic record carries the real remote id, so the start addresses
    /// the row itself and the next poll folds in the server's view.
    async fn resume_record(
        &self,
        account_id: &str,
        record_id: i64,
        hit: &SearchResult,
    ) -> Result<(), CoordinatorError> {
        let record = TimerRecord {
            id: record_id,
            account_id: account_id.to_string(),
            description: hit.name.clone(),
            project: hit.project.clone(),
            source: TimerSource::Standalone,
            hours: 0.0,
            started_at: Some(Utc::now()),
            date: Utc::now().date_naive(),
        };

        {
            let mut slots = self.slots.write().await;
            if !slots.contains_key(account_id) {
                return Err(CoordinatorError::NotFound(account_id.to_string()));
            }
            Self::clear_running(&mut slots);
            let slot = slots.get_mut(account_id).expect("presence checked above");
            slot.records.push(record.clone());
        }

        self.dispatch(account_id, move |service| async move {
            service.start_timer(&record).await
        });
        Ok(())
    }

    /// Fire the remote side of a mutation and immediately reconcile,
    /// regardless of how the call went.
    fn dispatch<F, Fut>(&self, account_id: &str, call: F)
    where
        F: FnOnce(Arc<RecordService>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<(), RpcError>> + Send + 'static,
    {
        let coordinator = self.clone();
        let account_id = account_id.to_string();
        tokio::spawn(async move {
            let service = coordinator.services.read().await.get(&account_id).cloned();
            match service {
                Some(service) => {
                    if let Err(e) = call(service).await {
                        tracing::error!(account = account_id, "remote call failed: {e}");
                    }
                }
                None => {
                    tracing::warn!(account = account_id, "mutation on unconnected account");
                }
            }
            coordinator.poll_account_soon(&account_id);
        });
    }

    /// Every account's records, running first.
    pub async fn all_records(&self) -> Vec<TimerRecord> {
        let slots = self.slots.read().await;
        let mut ids: Vec<&String> = slots.keys().collect();
        ids.sort();

        let mut records: Vec<TimerRecord> = ids
            .into_iter()
            .flat_map(|id| slots[id].records.iter().cloned())
            .collect();
        records.sort_by_key(|r| !r.is_running());
        records
    }

    pub async fn running_record(&self) -> Option<TimerRecord> {
        self.all_records().await.into_iter().find(TimerRecord::is_running)
    }

    pub async fn accounts(&self) -> Vec<AccountInfo> {
        let slots = self.slots.read().await;
        let mut accounts: Vec<AccountInfo> = slots
            .iter()
            .map(|(id, slot)| AccountInfo {
                id: id.clone(),
                label: slot.label.clone(),
                url: slot.url.clone(),
            })
            .collect();
        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        accounts
    }

    pub async fn account_error(&self, account_id: &str) -> Option<String> {
        self.slots
            .read()
            .await
            .get(account_id)
            .and_then(|slot| slot.error.clone())
    }

    /// Concurrent search across every connected account, keyed by account.
    pub async fn search_all(&self, query: &str) -> Vec<(String, Vec<SearchResult>)> {
        let services: Vec<(String, Arc<RecordService>)> = {
            let services = self.services.read().await;
            services
                .iter()
                .map(|(id, service)| (id.clone(), service.clone()))
                .collect()
        };

        let mut tasks = services
            .into_iter()
            .map(|(id, service)| {
                let query = query.to_string();
                async move { (id, service.search(&query).await) }
            })
            .collect::<FuturesUnordered<_>>();

        let mut results = Vec::new();
        while let Some(entry) = tasks.next().await {
            results.push(entry);
        }
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }

    #[cfg(test)]
    pub(crate) async fn insert_service_for_tests(&self, account_id: &str, service: RecordService) {
        self.services
            .write()
            .await
            .insert(account_id.to_string(), Arc::new(service));
    }

    #[cfg(test)]
    pub(crate) async fn seed_records_for_tests(&self, account_id: &str, records: Vec<TimerRecord>) {
        let mut slots = self.slots.write().await;
        let slot = slots.get_mut(account_id).expect("unknown account");
        slot.records = records;
        slot.status = AccountStatus::Polling;
    }
}
