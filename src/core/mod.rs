pub mod clock;
pub mod config;
pub mod health;
pub mod logging;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use health::HealthChecker;
