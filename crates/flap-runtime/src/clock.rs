use crate::Result;
use flap_types::SessionMetadata;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Kernel clock the tracer stamps its events with
///
/// bpftrace's `nsecs` reads `CLOCK_MONOTONIC`. `Boottime` also counts time
/// spent suspended, which matches `/proc/uptime`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockSource {
    #[default]
    Monotonic,
    Boottime,
}

impl ClockSource {
    fn clock_id(&self) -> libc::clockid_t {
        match self {
            ClockSource::Monotonic => libc::CLOCK_MONOTONIC,
            #[cfg(any(target_os = "linux", target_os = "android"))]
            ClockSource::Boottime => libc::CLOCK_BOOTTIME,
            #[cfg(not(any(target_os = "linux", target_os = "android")))]
            ClockSource::Boottime => libc::CLOCK_MONOTONIC,
        }
    }

    /// Current reading in seconds
    pub fn now_secs(&self) -> std::io::Result<f64> {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        let rc = unsafe { libc::clock_gettime(self.clock_id(), &mut ts) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(ts.tv_sec as f64 + ts.tv_nsec as f64 / 1e9)
    }
}

/// Samples the session's reference pair
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionClock {
    source: ClockSource,
}

impl SessionClock {
    pub fn new(source: ClockSource) -> Self {
        Self { source }
    }

    pub fn source(&self) -> ClockSource {
        self.source
    }

    /// Read wall and monotonic clocks back to back
    pub fn capture(&self) -> Result<SessionMetadata> {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        let mono = self.source.now_secs()?;
        Ok(SessionMetadata::new(wall.as_secs_f64(), mono))
    }

    /// Capture and persist `meta.json` into `dir`
    pub fn capture_into(&self, dir: &Path) -> Result<SessionMetadata> {
        let meta = self.capture()?;
        let path = meta.save_to(dir)?;
        tracing::info!(
            "Reference pair saved to {} (wall={}, mono={})",
            path.display(),
            meta.ref_wall,
            meta.ref_mono
        );
        Ok(meta)
    }
}
