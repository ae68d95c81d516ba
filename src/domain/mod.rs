//! Domain layer: ledger value types and the ports the stores implement.

pub mod account;
pub mod payment;
pub mod ports;
pub mod source_type;
