//! Background execution of detection and filtering jobs.
//!
//! Callers talk to a [`WorkerClient`]; every request gets its own
//! [`RequestId`](foundation::RequestId) and resolves through its own
//! [`PendingRequest`] future, so any number of requests may be in flight.

pub mod client;
pub mod protocol;
pub mod worker;

pub use client::*;
pub use protocol::*;
pub use worker::*;
