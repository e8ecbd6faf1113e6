//! # Buffer Exchange with Worker Threads
//!
//! No locks. Bulk data crosses threads by ownership transfer.
//!
//! ## The Problem
//!
//! ```text
//! Main loop:        allocates / deallocates projectiles every tick
//! Collision worker: needs a consistent view of every projectile
//!
//! Shared buffer + Mutex:  main loop stalls on the worker
//! Copy per message:       a fresh allocation every send
//! ```
//!
//! ## The Solution: Ping-Pong Buffers
//!
//! ```text
//! lend():
//!   copy current -> spare        (no allocation, same capacity)
//!   swap current <-> spare
//!   hand the old current to the worker
//!
//! reclaim(lease):
//!   the returned buffer becomes the next spare
//! ```
//!
//! While a lease is out there is no spare, so `lend()` refuses. That refusal
//! is the backpressure: never more than one batch in flight.

mod ping_pong;

pub use ping_pong::{BufferLease, PingPongBuffers};
