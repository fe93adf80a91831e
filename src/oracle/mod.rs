pub mod aggregator;
pub mod coordinator;
pub mod intake;
pub mod outlier;
pub mod round;
pub mod types;

pub use aggregator::{AggregateResult, ConsensusAggregator};
pub use coordinator::{ConsensusStatus, RoundCoordinator};
pub use intake::{ReadingIntake, SensorProfile};
pub use outlier::{filter_outliers, relative_deviation, FilterVerdict, MIN_FILTER_SAMPLE};
pub use round::{Round, RoundSummary};
pub use types::{
    AgreedValue, FailureReason, RoundHandle, RoundState, SubmitError, Submission,
};
