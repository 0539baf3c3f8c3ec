//! Thin re-export of the [`arc-swap`](https://crates.io/crates/arc-swap)
//! crate's lock-free publication primitives.
//!
//! `ArcSwapOption` backs the replication channel's replay-once connection
//! cell: first writer wins, later readers observe the written value with
//! no lock on the read path.

pub use ::arc_swap::{ArcSwap, ArcSwapOption};
