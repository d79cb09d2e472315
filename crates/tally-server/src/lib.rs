//! Metrics server: accepts counter and gauge updates over HTTP, keeps the
//! current value of every metric in a repository and snapshots it to disk.

pub mod api;
pub mod app;
pub mod collector;
pub mod config;
pub mod logging;
pub mod middleware;
pub mod state;
