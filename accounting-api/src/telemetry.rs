use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use anyhow::Context;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryCounters {
    pub entries_created: usize,
    pub entries_reversed: usize,
    pub entries_voided: usize,
    pub entries_adjusted: usize,
    pub periods_closed: usize,
    pub inventory_moves_recorded: usize,
    pub outbox_events_emitted: usize,
    pub outbox_publish_failures: usize,
    pub idempotency_replays: usize,
}

#[derive(Debug)]
struct TelemetryStore {
    path: PathBuf,
}

impl TelemetryStore {
    fn from_env() -> Option<Self> {
        let home = env::var_os("LEDGER_HOME")?;
        let mut path = PathBuf::from(home);
        path.push("accounting");
        path.push("telemetry.json");
        Some(Self { path })
    }

    fn read(&self) -> anyhow::Result<Option<TelemetryCounters>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let counters = serde_json::from_slice(&data)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;
        Ok(Some(counters))
    }

    fn persist(&self, counters: &TelemetryCounters) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let data =
            serde_json::to_vec_pretty(counters).context("failed to encode telemetry counters")?;
        fs::write(&self.path, data)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct TelemetryInner {
    counters: TelemetryCounters,
    store: Option<TelemetryStore>,
}

impl TelemetryInner {
    fn with_store(store: Option<TelemetryStore>) -> Self {
        match store {
            Some(store) => {
                let counters = match store.read() {
                    Ok(Some(existing)) => existing,
                    Ok(None) => TelemetryCounters::default(),
                    Err(err) => {
                        warn!(
                            path = %store.path.display(),
                            error = %err,
                            "failed to load persisted telemetry; continuing with defaults"
                        );
                        TelemetryCounters::default()
                    }
                };
                Self {
                    counters,
                    store: Some(store),
                }
            }
            None => Self::default(),
        }
    }

    fn persist(&self) {
        if let Some(store) = &self.store
            && let Err(err) = store.persist(&self.counters)
        {
            warn!(
                path = %store.path.display(),
                error = %err,
                "failed to persist telemetry counters"
            );
        }
    }
}

/// Process-local counters for the facade's mutations, persisted as JSON so
/// they survive a restart the same way the rest of the engine's state is
/// rebuilt from durable stores rather than kept only in memory.
#[derive(Clone, Default)]
pub struct AccountingTelemetry {
    inner: Arc<Mutex<TelemetryInner>>,
}

impl AccountingTelemetry {
    #[must_use]
    pub fn new() -> Self {
        Self::from_store(None)
    }

    #[must_use]
    pub fn persistent_from_env() -> Self {
        Self::from_store(TelemetryStore::from_env())
    }

    #[must_use]
    pub fn with_store_path(path: PathBuf) -> Self {
        Self::from_store(Some(TelemetryStore { path }))
    }

    fn from_store(store: Option<TelemetryStore>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TelemetryInner::with_store(store))),
        }
    }

    fn update<F>(&self, mut updater: F)
    where
        F: FnMut(&mut TelemetryCounters) -> bool,
    {
        if let Ok(mut inner) = self.inner.lock()
            && updater(&mut inner.counters)
        {
            inner.persist();
        }
    }

    pub fn record_entry_created(&self) {
        self.update(|counters| {
            counters.entries_created += 1;
            true
        });
    }

    pub fn record_entry_reversed(&self) {
        self.update(|counters| {
            counters.entries_reversed += 1;
            true
        });
    }

    pub fn record_entry_voided(&self) {
        self.update(|counters| {
            counters.entries_voided += 1;
            true
        });
    }

    pub fn record_entry_adjusted(&self) {
        self.update(|counters| {
            counters.entries_adjusted += 1;
            true
        });
    }

    pub fn record_period_closed(&self) {
        self.update(|counters| {
            counters.periods_closed += 1;
            true
        });
    }

    pub fn record_inventory_move(&self) {
        self.update(|counters| {
            counters.inventory_moves_recorded += 1;
            true
        });
    }

    pub fn record_outbox_events_emitted(&self, count: usize) {
        if count == 0 {
            return;
        }
        self.update(|counters| {
            counters.outbox_events_emitted += count;
            true
        });
    }

    pub fn record_outbox_publish_failure(&self) {
        self.update(|counters| {
            counters.outbox_publish_failures += 1;
            true
        });
    }

    pub fn record_idempotency_replay(&self) {
        self.update(|counters| {
            counters.idempotency_replays += 1;
            true
        });
    }

    #[must_use]
    pub fn snapshot(&self) -> TelemetryCounters {
        self.inner
            .lock()
            .map(|inner| inner.counters.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn store_path(&self) -> Option<PathBuf> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.store.as_ref().map(|store| store.path.clone()))
    }
}
