//! Background Tasks Module
//!
//! Contains background tasks that run periodically while the cache is live.
//!
//! # Tasks
//! - Expiry Sweeper: removes expired entries from both tiers at configured
//!   intervals

mod sweeper;

pub use sweeper::spawn_sweeper_task;
