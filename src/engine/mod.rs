// src/engine/mod.rs

//! Orchestration engine for jobpipe.
//!
//! This module ties together:
//! - the dispatcher accepting submissions ([`dispatcher`])
//! - the bounded pool running one pipeline per job ([`worker_pool`])
//! - the periodic purge of expired status records ([`sweeper`])

pub mod dispatcher;
pub mod sweeper;
pub mod worker_pool;

pub use dispatcher::JobDispatcher;
pub use sweeper::spawn_sweeper;
pub use worker_pool::{ActiveGuard, ActiveJobs, QueuedJob, Registration};
