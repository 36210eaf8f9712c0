// src/reactor/mod.rs

//! The single-threaded event reactor.
//!
//! [`EventLoop`] turns descriptor readiness, elapsed timers, and idle slots
//! into callback invocations. It is the only place in the crate that blocks,
//! and it blocks exclusively inside the poll backend.
//!
//! The loop is built for use through `Rc<EventLoop>`: every method takes
//! `&self`, so a callback may re-enter the loop (register sources, remove
//! itself, or run a nested [`EventLoop::wait_for`]) without fighting the
//! borrow checker.

pub mod event_loop;

pub use event_loop::{Disposition, EventLoop, PollOutcome, SourceId};
