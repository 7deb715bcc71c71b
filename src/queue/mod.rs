//! Queue core: job records, squeue parsing, filtering, the scheduler seam and
//! the controller that ties them together.

pub mod controller;
pub mod filter;
pub mod job;
pub mod parser;
pub mod scheduler;
