//! Background Tasks Module
//!
//! Contains background tasks that run periodically while a cache is open.
//!
//! # Tasks
//! - Expiry sweep: removes expired cache entries every clean window

mod cleanup;

pub use cleanup::{spawn_cleanup_task, CleanupHandle, ExpirySweep, SWEEPER_THREAD_NAME};
