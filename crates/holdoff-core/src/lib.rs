pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::HoldoffConfig;
pub use error::{HoldoffError, Result};
pub use events::DelayEvent;
pub use types::*;
