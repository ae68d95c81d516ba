//! Application layer containing the ledger's orchestration logic.
//!
//! `PaymentCoordinator` is the entry point for applying payments and
//! `ReconciliationJob` reverses a selected subset of them on a schedule. Both
//! delegate every cross-request guarantee to the store's units of work.

pub mod coordinator;
pub mod reconciliation;
pub mod source_types;
