//! Application services — use-case implementations.
//!
//! Each service struct accepts port trait implementations via generic parameters
//! (constructor injection), keeping this layer decoupled from concrete adapters.

pub mod command_dispatcher;
pub mod device_service;
pub mod schedule_service;

pub use command_dispatcher::CommandDispatcher;
pub use device_service::{CommandReceipt, DeviceService};
pub use schedule_service::{ScheduleHistory, ScheduleService};
