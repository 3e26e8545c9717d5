//! Scoped umask override.
//!
//! The verifier forces a 022 umask while creating its persistent cache so
//! the file never comes up group- or world-writable, then restores the
//! supervisor-inherited mask on every exit path, including open failure.

use nix::sys::stat::{self, Mode};

pub struct UmaskGuard {
    previous: Mode,
}

impl UmaskGuard {
    /// Force `mask` (e.g. `0o022`) until the guard drops.
    #[must_use = "the previous umask is restored when the guard drops"]
    pub fn set(mask: u32) -> Self {
        let previous = stat::umask(Mode::from_bits_truncate(mask));
        Self { previous }
    }
}

impl Drop for UmaskGuard {
    fn drop(&mut self) {
        let _ = stat::umask(self.previous);
    }
}
