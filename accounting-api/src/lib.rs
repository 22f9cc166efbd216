#![deny(clippy::print_stdout, clippy::print_stderr)]

//! The facade a caller (CLI, HTTP handler, job) goes through: [`LedgerApi`]
//! wires the ledger, inventory, and reports crates together behind
//! idempotent mutation methods, with [`AccountingConfig`] collecting the
//! handful of tunables a deployment might override and
//! [`AccountingTelemetry`] tracking what happened across restarts.

pub mod config;
mod facade;
mod telemetry;

pub use config::AccountingConfig;
pub use facade::LedgerApi;
pub use telemetry::AccountingTelemetry;
pub use telemetry::TelemetryCounters;
