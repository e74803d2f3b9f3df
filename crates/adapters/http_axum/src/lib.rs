//! # coophub-adapter-http-axum
//!
//! HTTP adapter built on [axum](https://docs.rs/axum).
//!
//! ## Responsibilities
//! - Serve a **JSON API** for schedules, devices and alerts
//!   (`/api/farms/{farm_id}/schedules`, `/api/devices/{id}/commands`, …)
//! - Serve the **real-time WebSocket** endpoint (`/ws?farm_id=&coop_id=`):
//!   one read task and one write task per connection, both feeding the
//!   application's connection hub
//! - Map HTTP requests into application service calls (driving adapter)
//! - Map application results into HTTP responses
//!
//! ## Dependency rule
//! Depends on `coophub-app` (for port traits and services) and `coophub-domain`
//! (for domain types used in request/response mapping). Never leaks axum types
//! into the domain.

pub mod api;
pub mod error;
pub mod router;
pub mod state;
pub mod ws;

#[cfg(test)]
mod testing;
