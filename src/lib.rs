//! Tenant-scoped project operations data layer.
//!
//! CRUD, derived counters, an append-only timeline log, and live query
//! watchers over a SQLite store.

pub mod config;
pub mod db;
pub mod error;
pub mod types;
pub mod watch;

pub use db::Database;
