//! Fetch module: rate-limited, retrying network access
//!
//! This module contains everything that touches the network:
//! - HTTP client construction and error classification
//! - Exponential backoff with jitter for transient failures
//! - The scheduler enforcing per-host spacing and the global
//!   concurrency ceiling
//!
//! No other module issues requests directly; pages, probes, descriptors and
//! image downloads all go through [`Scheduler::submit`].

mod backoff;
mod client;
mod scheduler;

pub use backoff::BackoffPolicy;
pub use client::{build_http_client, FetchErrorKind, FetchFailure, FetchedPage};
pub use scheduler::{HostState, Scheduler, SchedulerLimits, TaskOutcome};
