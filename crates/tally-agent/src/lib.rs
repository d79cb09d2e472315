//! The tally agent: samples the host on a poll interval and ships the
//! aggregated readings to the server on a report interval.
//!
//! [`poller`] runs one task per sampler feeding a channel, [`report`] drains
//! it into an [`aggregate::Aggregator`] and hands the result to the
//! [`dispatcher::Dispatcher`], which sends through a [`transport::Transport`].

pub mod aggregate;
pub mod config;
pub mod dispatcher;
pub mod poller;
pub mod report;
pub mod transport;
