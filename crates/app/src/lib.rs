//! # coophub-app
//!
//! Application layer — use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `ScheduleRepository` — persistence for schedule rules
//!   - `ExecutionLog` — append & query execution history
//!   - `CommandSink` — where emitted device commands go
//!   - `DeviceDirectory` — device lookup and online status
//!   - `EventPublisher` — fan-out of real-time events
//! - Provide the **connection hub** (live subscriber registry, no IO)
//! - Provide the **schedule engine** (next-fire computation, firing, tie-break)
//! - Define **driving/inbound** use-case structs:
//!   - `ScheduleService` — create, update, retire, list, history
//!   - `DeviceService` — register, status reports, manual commands
//!   - `CommandDispatcher` — queue a command, then announce it
//!
//! ## Dependency rule
//! Depends on `coophub-domain` only (plus `tokio::sync` for channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod hub;
pub mod ports;
pub mod schedule_engine;
pub mod services;

#[cfg(test)]
mod testing;
