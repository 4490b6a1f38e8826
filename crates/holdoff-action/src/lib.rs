//! Deferred action engine for holdoff.
//!
//! Intercepts mutating management calls, holds them behind the configured
//! delay in a durable queue, and applies them from a background scheduler.

pub mod codec;
pub mod command;
pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod handler;
pub mod intercept;
pub mod scheduler;
pub mod worker;

pub use codec::{Param, Params};
pub use command::PolicyCommand;
pub use coordinator::{
    DelayCoordinator, DurationChange, QueueSummary, DISABLE_DELAY, SET_DELAY_DURATION,
};
pub use dispatcher::ActionDispatcher;
pub use error::{ActionError, CodecError, GatewayError, SchedulerError};
pub use gateway::{
    DeviceState, GatewayExt, ManagementGateway, PolicyQuery, QueryValue, SimulatedGateway,
};
pub use handler::ActionHandler;
pub use intercept::{InterceptingGateway, Submission};
pub use scheduler::{Scheduler, TickReport, DEFAULT_POLL_INTERVAL};
pub use worker::StoreWorker;
