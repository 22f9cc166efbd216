#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Read-only projections and financial reports derived from
//! [`ledger_core`]'s journal and [`ledger_inventory`]'s stock moves. This
//! crate never mutates either store; "Projections Rebuild" (spec §4.11)
//! recomputes the [`projections::ProjectionStore`] cache from the journal,
//! it does not touch the journal itself.

pub mod projections;
pub mod reports;

use thiserror::Error;

pub type ReportsResult<T> = Result<T, ReportsError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReportsError {
    #[error("ledger error: {0}")]
    Ledger(#[from] ledger_core::LedgerError),
    #[error("inventory error: {0}")]
    Inventory(#[from] ledger_inventory::InventoryError),
    #[error("internal error: {0}")]
    Internal(String),
}
