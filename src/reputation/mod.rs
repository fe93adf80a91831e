pub mod ledger;
pub mod store;

pub use ledger::{ReputationLedger, ReputationRecord, ReputationReport, ScoreDistribution};
pub use store::{JsonFileReputationStore, MemoryReputationStore, ReputationStore, StoreError};
