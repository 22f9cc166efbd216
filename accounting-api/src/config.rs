use std::time::Duration;

use ledger_idempotency::PollConfig;

/// Tunables for the facade's lock acquisition, idempotency polling, and
/// outbox publishing. Defaults mirror the ones the individual crates use on
/// their own (spec §6), collected here so a deployment can override them in
/// one place rather than threading overrides through every constructor. The
/// per-mutation lock TTLs themselves stay owned by `ledger-core` and
/// `ledger-inventory`'s command envelopes, which already pick a TTL
/// appropriate to how long their own critical section runs.
#[derive(Debug, Clone, Copy)]
pub struct AccountingConfig {
    pub lock_acquire_timeout: Duration,
    pub idempotency_poll: PollConfig,
    pub outbox_publish_batch_size: usize,
}

impl Default for AccountingConfig {
    fn default() -> Self {
        Self {
            lock_acquire_timeout: Duration::from_secs(5),
            idempotency_poll: PollConfig::default(),
            outbox_publish_batch_size: 100,
        }
    }
}
