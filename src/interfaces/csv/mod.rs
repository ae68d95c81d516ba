//! CSV adapters: payment requests in, balances and reconciliation reports out.

pub mod balance_writer;
pub mod payment_reader;
pub mod report_writer;
