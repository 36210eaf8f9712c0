// src/poll/probe.rs

//! One-time probe for whether `poll(2)` works on character devices.

use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::sync::OnceLock;
use std::time::Duration;

use tracing::debug;

use super::{EventMask, NativePoll, PollBackend, SelectAdapter};

static CAN_POLL_DEVICE: OnceLock<bool> = OnceLock::new();

/// Test whether `poll(2)` can be used on a device such as a pty.
///
/// Some platforms (Darwin is the known case) report `POLLNVAL` for device
/// files. The probe registers `/dev/null` and checks the reported
/// conditions. The result is computed once per process and cached.
pub fn can_poll_device() -> bool {
    *CAN_POLL_DEVICE.get_or_init(probe_dev_null)
}

fn probe_dev_null() -> bool {
    let dev_null = match File::open("/dev/null") {
        Ok(f) => f,
        Err(_) => return false,
    };

    let mut backend = NativePoll::new();
    backend.register(dev_null.as_raw_fd(), EventMask::IN);

    // /dev/null is always ready, so a zero timeout suffices.
    match backend.poll(Some(Duration::ZERO)) {
        Ok(events) => !events
            .iter()
            .any(|(_, mask)| mask.intersects(EventMask::NVAL)),
        Err(_) => false,
    }
}

/// Create the poll backend for this platform: native `poll(2)` where it
/// handles devices correctly, the `select(2)` adapter otherwise.
pub fn create_poll_backend() -> Box<dyn PollBackend> {
    if can_poll_device() {
        Box::new(NativePoll::new())
    } else {
        debug!("poll() unusable on devices; falling back to select()");
        Box::new(SelectAdapter::new())
    }
}
