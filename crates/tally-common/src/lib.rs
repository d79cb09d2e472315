//! Types shared by the tally agent and server.
//!
//! [`types`] holds the metric data model and its merge rule, [`error`] the
//! error taxonomy surfaced to HTTP clients and [`hash`] the `HashSHA256` body
//! signature. [`retry`] is the bounded backoff driver used both for agent
//! delivery and for server start-up, and [`shutdown`] waits for the process
//! termination signals both binaries react to.

pub mod error;
pub mod hash;
pub mod retry;
pub mod shutdown;
pub mod types;
