// src/engine/loadavg.rs

//! System load-average probe.

use std::io;

/// The OS-reported 1/5/15-minute load averages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

/// Trait abstracting where load averages come from.
///
/// Production code uses [`SystemLoad`]; tests can provide their own
/// implementation that reports a scripted value.
pub trait LoadProbe {
    fn sample(&self) -> io::Result<LoadAverage>;
}

/// Load averages from `getloadavg(3)`.
#[derive(Debug, Default)]
pub struct SystemLoad;

impl LoadProbe for SystemLoad {
    fn sample(&self) -> io::Result<LoadAverage> {
        let mut avg = [0f64; 3];
        // SAFETY: getloadavg writes at most 3 samples into a 3-slot buffer.
        let filled = unsafe { libc::getloadavg(avg.as_mut_ptr(), 3) };
        if filled != 3 {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "load averages are unobtainable on this system",
            ));
        }
        Ok(LoadAverage {
            one: avg[0],
            five: avg[1],
            fifteen: avg[2],
        })
    }
}
