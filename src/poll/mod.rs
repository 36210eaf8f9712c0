// src/poll/mod.rs

//! Readiness polling backends.
//!
//! Everything above this module talks to a [`PollBackend`]:
//!
//! - [`NativePoll`] wraps `poll(2)` and is the default implementation.
//! - [`SelectAdapter`] is a fallback built on `select(2)`, substituted
//!   transparently on platforms where `poll(2)` misbehaves on character
//!   devices (reported as `POLLNVAL` for e.g. a pty).
//!
//! [`create_poll_backend`] performs the selection; the probe result is
//! cached for the lifetime of the process.

use std::io;
use std::ops::{BitOr, BitOrAssign};
use std::os::unix::io::RawFd;
use std::time::Duration;

pub mod native;
pub mod probe;
pub mod select;

pub use native::NativePoll;
pub use probe::{can_poll_device, create_poll_backend};
pub use select::SelectAdapter;

/// Readiness condition bits, mirroring the `poll(2)` event flags.
#[derive(Copy, Clone, PartialEq, Eq, Default)]
pub struct EventMask(i16);

impl EventMask {
    pub const NONE: EventMask = EventMask(0);
    pub const IN: EventMask = EventMask(libc::POLLIN);
    pub const PRI: EventMask = EventMask(libc::POLLPRI);
    pub const OUT: EventMask = EventMask(libc::POLLOUT);
    pub const ERR: EventMask = EventMask(libc::POLLERR);
    pub const HUP: EventMask = EventMask(libc::POLLHUP);
    pub const NVAL: EventMask = EventMask(libc::POLLNVAL);

    pub fn from_bits(bits: i16) -> EventMask {
        EventMask(bits)
    }

    pub fn bits(self) -> i16 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every bit of `other` is set in `self`.
    pub fn contains(self, other: EventMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any bit of `other` is set in `self`.
    pub fn intersects(self, other: EventMask) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for EventMask {
    type Output = EventMask;

    fn bitor(self, rhs: EventMask) -> EventMask {
        EventMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for EventMask {
    fn bitor_assign(&mut self, rhs: EventMask) {
        self.0 |= rhs.0;
    }
}

impl std::fmt::Debug for EventMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = [
            (EventMask::IN, "IN"),
            (EventMask::PRI, "PRI"),
            (EventMask::OUT, "OUT"),
            (EventMask::ERR, "ERR"),
            (EventMask::HUP, "HUP"),
            (EventMask::NVAL, "NVAL"),
        ];
        let mut first = true;
        for (mask, name) in names {
            if self.intersects(mask) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        if first {
            write!(f, "NONE")?;
        }
        Ok(())
    }
}

/// A single readiness event: the descriptor and the conditions it reported.
pub type PollEvent = (RawFd, EventMask);

/// Trait abstracting how descriptor readiness is polled.
///
/// Implementations must tolerate an interrupted syscall: retry when
/// `timeout` is `None` (the caller asked for an unbounded wait), report an
/// empty batch when the timeout is bounded. Interruption is never an error.
pub trait PollBackend {
    /// Start watching `fd` for the conditions in `mask`.
    fn register(&mut self, fd: RawFd, mask: EventMask);

    /// Stop watching `fd`. Unknown descriptors are ignored.
    fn unregister(&mut self, fd: RawFd);

    /// Wait up to `timeout` (forever when `None`) and return the ready set.
    fn poll(&mut self, timeout: Option<Duration>) -> io::Result<Vec<PollEvent>>;
}

/// Convert an optional timeout to the millisecond argument of `poll(2)`.
///
/// Sub-millisecond remainders round up so a short timeout never busy-spins.
pub(crate) fn timeout_to_ms(timeout: Option<Duration>) -> libc::c_int {
    match timeout {
        None => -1,
        Some(d) => {
            let ms = d.as_millis();
            let ms = if ms == 0 && d.as_nanos() > 0 { 1 } else { ms };
            ms.min(libc::c_int::MAX as u128) as libc::c_int
        }
    }
}
