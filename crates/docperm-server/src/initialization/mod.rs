//! Idempotent database and collection initialization.
//!
//! Every permission request needs its backing database (and collection,
//! when one is named) to exist. Under load many requests target the same
//! resource at once, so [`InitializationTracker`] makes sure each path is
//! read-or-created at most once per process:
//!
//! 1. **Fast path**: a path already known to exist returns immediately
//! 2. **Single flight**: concurrent callers for a pending path share the
//!    first caller's outcome instead of issuing their own store calls
//!
//! A failed attempt resets the path so a later call can try again.

mod singleflight;
mod tracker;

pub use tracker::InitializationTracker;
