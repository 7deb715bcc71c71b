//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use squid::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{Result, SquidError};

// Queue
pub use crate::queue::controller::{BulkReport, MutationOutcome, QueueController};
pub use crate::queue::filter::{FilterSpec, filter_jobs};
pub use crate::queue::job::{JobField, JobRecord, filterable_attributes};
pub use crate::queue::parser::parse_queue;
pub use crate::queue::scheduler::{JobAction, MockScheduler, Scheduler, SlurmScheduler};

// Logging
pub use crate::logger::jsonl::{JsonlConfig, JsonlWriter};
