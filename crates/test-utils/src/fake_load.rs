use std::cell::Cell;
use std::io;
use std::rc::Rc;

use forgeloop::engine::{LoadAverage, LoadProbe};

/// A load probe reporting a scripted value.
///
/// Cloning shares the value cell, so a test can keep one handle and adjust
/// the "measured" load while the scheduler holds the other.
#[derive(Clone, Debug)]
pub struct FakeLoad {
    value: Rc<Cell<f64>>,
}

impl FakeLoad {
    pub fn new(value: f64) -> Self {
        Self {
            value: Rc::new(Cell::new(value)),
        }
    }

    pub fn set(&self, value: f64) {
        self.value.set(value);
    }
}

impl LoadProbe for FakeLoad {
    fn sample(&self) -> io::Result<LoadAverage> {
        let v = self.value.get();
        Ok(LoadAverage {
            one: v,
            five: v,
            fifteen: v,
        })
    }
}

/// A load probe for platforms where the load cannot be measured.
#[derive(Debug, Default)]
pub struct UnreadableLoad;

impl LoadProbe for UnreadableLoad {
    fn sample(&self) -> io::Result<LoadAverage> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "load averages are unobtainable on this system",
        ))
    }
}
