use chrono::{DateTime, Local, Utc};
use flap_types::{SessionMetadata, TimeZoneMode};

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// Rendering used for decoded timestamps
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Converts monotonic event timestamps to wall-clock time
///
/// `wall = ref_wall + (T - ref_mono)`, computed in integer nanoseconds so the
/// large `T` does not lose precision in an `f64`. No drift correction.
#[derive(Debug, Clone, Copy)]
pub struct WallClockConverter {
    ref_wall_ns: i128,
    ref_mono_ns: i128,
    zone: TimeZoneMode,
}

/// Seconds as `f64` to nanoseconds, splitting whole and fractional parts
fn secs_to_nanos(secs: f64) -> i128 {
    let whole = secs.trunc();
    let frac = ((secs - whole) * 1e9).round() as i128;
    whole as i128 * NANOS_PER_SEC + frac
}

impl WallClockConverter {
    pub fn new(meta: &SessionMetadata, zone: TimeZoneMode) -> Self {
        Self {
            ref_wall_ns: secs_to_nanos(meta.ref_wall),
            ref_mono_ns: secs_to_nanos(meta.ref_mono),
            zone,
        }
    }

    pub fn zone(&self) -> TimeZoneMode {
        self.zone
    }

    /// Wall-clock nanoseconds since the epoch for monotonic `timestamp_ns`
    pub fn wall_nanos(&self, timestamp_ns: u64) -> i128 {
        self.ref_wall_ns + (i128::from(timestamp_ns) - self.ref_mono_ns)
    }

    /// Render `timestamp_ns` as `YYYY-MM-DD HH:MM:SS.ffffff`
    ///
    /// Rounded to the nearest microsecond. Values outside the calendar range
    /// fall back to the raw nanosecond count.
    pub fn render(&self, timestamp_ns: u64) -> String {
        let wall_ns = self.wall_nanos(timestamp_ns);
        let micros = (wall_ns + 500).div_euclid(1000);

        let utc = i64::try_from(micros)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_micros);
        match (utc, self.zone) {
            (Some(dt), TimeZoneMode::Utc) => dt.format(TIMESTAMP_FORMAT).to_string(),
            (Some(dt), TimeZoneMode::Local) => dt
                .with_timezone(&Local)
                .format(TIMESTAMP_FORMAT)
                .to_string(),
            (None, _) => {
                tracing::debug!("timestamp {} out of range", timestamp_ns);
                timestamp_ns.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WallClockConverter {
        WallClockConverter::new(
            &SessionMetadata::new(1763500038.948842, 618549.44),
            TimeZoneMode::Utc,
        )
    }

    #[test]
    fn test_reference_round_trip() {
        let converter = sample();
        let t = 618552580474815u64;

        // ref_wall + (T·1e-9 − ref_mono) seconds
        let expected_secs = 1763500038.948842 + (t as f64 * 1e-9 - 618549.44);
        let wall_ns = converter.wall_nanos(t);
        assert!((wall_ns as f64 / 1e9 - expected_secs).abs() < 1e-6);

        assert_eq!(converter.render(t), "2025-11-18 21:07:22.089317");
    }

    #[test]
    fn test_reference_instant_maps_to_ref_wall() {
        let converter = sample();
        assert_eq!(converter.render(618_549_440_000_000), "2025-11-18 21:07:18.948842");
    }

    #[test]
    fn test_rounds_to_nearest_microsecond() {
        let converter = WallClockConverter::new(&SessionMetadata::new(0.0, 0.0), TimeZoneMode::Utc);
        assert_eq!(converter.render(1_499), "1970-01-01 00:00:00.000001");
        assert_eq!(converter.render(1_500), "1970-01-01 00:00:00.000002");
        assert_eq!(converter.render(499), "1970-01-01 00:00:00.000000");
    }

    #[test]
    fn test_events_before_reference() {
        let converter = WallClockConverter::new(&SessionMetadata::new(10.0, 20.0), TimeZoneMode::Utc);
        // 20s monotonic is 10s wall; 15s monotonic is 5s wall
        assert_eq!(converter.render(15_000_000_000), "1970-01-01 00:00:05.000000");
    }

    #[test]
    fn test_local_zone_renders_same_instant() {
        let meta = SessionMetadata::new(1763500038.948842, 618549.44);
        let local = WallClockConverter::new(&meta, TimeZoneMode::Local);
        let rendered = local.render(618552580474815);

        let parsed = chrono::NaiveDateTime::parse_from_str(&rendered, TIMESTAMP_FORMAT).unwrap();
        let utc = parsed
            .and_local_timezone(Local)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            utc.format(TIMESTAMP_FORMAT).to_string(),
            "2025-11-18 21:07:22.089317"
        );
    }
}
