//! # Dependency Tracking for Deferred Disposal
//!
//! No scheduler lives here. Containers assume one mutator at a time; the
//! surrounding system decides who reads and who writes.
//!
//! ## The Problem
//!
//! ```text
//! Worker thread:   still READING column memory
//! Owner thread:    done with the container, wants to FREE it
//!
//! Free immediately: USE AFTER FREE -> CRASH
//! Block until idle: STALL the owner thread
//! ```
//!
//! ## The Solution: Dependency Tokens
//!
//! ```text
//! owner:  token = container.dispose_deferred(&reclaimer, readers_done)
//! reader: source.complete()
//! owner:  reclaimer.collect()   // memory released, token complete
//! ```

mod reclaim;
mod token;

pub use reclaim::Reclaimer;
pub use token::{DependencyToken, TokenSource};
