#![forbid(unsafe_code)]

//! squid: an interactive terminal dashboard for your Slurm jobs.
//!
//! The core lives in [`queue`]:
//! 1. **Parser** turns `squeue` output into [`queue::job::JobRecord`]s
//! 2. **Filter** keeps the jobs whose attribute matches a regex
//! 3. **Controller** owns the live snapshot and issues hold/release/kill
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use squid::prelude::*;
//!
//! let config = Config::load(None)?;
//! let mut controller = QueueController::new(SlurmScheduler::from_config(&config.scheduler)?);
//! controller.refresh(FilterSpec::from_key("state", "PEND")?)?;
//! for job in controller.snapshot() {
//!     println!("{job}");
//! }
//! # Ok::<(), squid::core::errors::SquidError>(())
//! ```

pub mod prelude;

#[cfg(feature = "cli")]
pub mod cli;
pub mod core;
pub mod logger;
pub mod queue;
