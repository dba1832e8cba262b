//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Owner (prober / balancer)
//!     → periodic.rs spawns a named thread
//!     → tick → interruptible sleep → tick ...
//!     → stop(): set flag, wake sleeper, join thread
//! ```
//!
//! # Design Decisions
//! - One dedicated OS thread per running loop
//! - Cancellation is cooperative: a tick in progress always completes
//! - Dropping the handle stops and joins the thread

pub mod periodic;

pub use periodic::PeriodicTask;
