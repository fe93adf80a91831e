//! Consensus core for a network of sensor-reporting gateway nodes.
//!
//! Gateways submit readings for a logical measurement; the core groups them
//! into rounds, filters outliers, computes a reputation-weighted agreed
//! value, and hands finalized values to an external ledger submitter.

pub mod core;
pub mod monitoring;
pub mod oracle;
pub mod reputation;
pub mod submitter;
