//! # coophub-domain
//!
//! Pure domain model for the coophub poultry-farm automation backend.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Schedules** (cron, duty-cycle and condition rules attached to a device)
//! - Define **Executions** (append-only log of schedule firings)
//! - Define **Commands** (instructions queued for a device)
//! - Define **Devices** as seen by the command path (farm, coop, online flag)
//! - Define **Events** and the wire envelope pushed to real-time subscribers
//! - Contain all invariant enforcement and time arithmetic
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod command;
pub mod cron;
pub mod device;
pub mod event;
pub mod execution;
pub mod schedule;
