use crate::parser::parse_line;
use crate::resolver::{FdPathCache, FdResolver};
use crate::timestamp::WallClockConverter;
use crate::Result;
use flap_types::{
    DecodedRecord, FD_KEY, FNAME_KEY, RawEvent, SessionMetadata, TimeZoneMode, UNKNOWN_PATH,
    UnparsedPolicy,
};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    pub unparsed: UnparsedPolicy,
    pub timezone: TimeZoneMode,
}

/// One output line of the decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedLine {
    Event(DecodedRecord),
    /// Raw line that did not parse, copied unchanged
    Unparsed(String),
}

impl DecodedLine {
    /// NDJSON text for this line, without the trailing newline
    pub fn to_output(&self) -> Result<String> {
        match self {
            DecodedLine::Event(record) => Ok(serde_json::to_string(record)?),
            DecodedLine::Unparsed(line) => Ok(line.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub lines: usize,
    pub decoded: usize,
    pub passed_through: usize,
    pub dropped: usize,
    /// Invocations of the fd resolver (cache misses)
    pub resolver_lookups: usize,
}

/// Turns raw tracer lines into decoded records
///
/// Owns the fd cache of one decode run; create a new decoder per run.
pub struct EventDecoder {
    converter: WallClockConverter,
    options: DecodeOptions,
    cache: FdPathCache,
    stats: DecodeStats,
}

impl EventDecoder {
    pub fn new(meta: &SessionMetadata, options: DecodeOptions, resolver: Box<dyn FdResolver>) -> Self {
        Self {
            converter: WallClockConverter::new(meta, options.timezone),
            options,
            cache: FdPathCache::new(resolver),
            stats: DecodeStats::default(),
        }
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    pub fn stats(&self) -> DecodeStats {
        DecodeStats {
            resolver_lookups: self.cache.lookups(),
            ..self.stats
        }
    }

    /// Decode one raw line; `None` when the line is dropped
    pub fn decode_line(&mut self, line: &str) -> Option<DecodedLine> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        self.stats.lines += 1;

        match parse_line(line) {
            Ok(event) => {
                self.stats.decoded += 1;
                Some(DecodedLine::Event(self.resolve(event)))
            }
            Err(e) => match self.options.unparsed {
                UnparsedPolicy::Passthrough => {
                    tracing::trace!("passing through line ({}): {}", e, line);
                    self.stats.passed_through += 1;
                    Some(DecodedLine::Unparsed(line.to_string()))
                }
                UnparsedPolicy::Drop => {
                    tracing::trace!("dropping line ({}): {}", e, line);
                    self.stats.dropped += 1;
                    None
                }
            },
        }
    }

    /// Attach the file path and wall-clock time to a parsed event
    pub fn resolve(&mut self, event: RawEvent) -> DecodedRecord {
        let mut details = event.attributes;

        if details.non_empty(FNAME_KEY).is_none() {
            let path = match details.non_empty(FD_KEY) {
                Some(fd) if event.pid != 0 => self.cache.resolve(event.pid, fd).to_string(),
                _ => UNKNOWN_PATH.to_string(),
            };
            details.insert(FNAME_KEY, path);
        }

        DecodedRecord {
            timestamp: self.converter.render(event.timestamp_ns),
            pid: event.pid,
            tid: event.tid,
            proc_name: event.proc_name,
            event_type: event.event_type,
            operand: event.operand,
            details,
        }
    }

    /// Stream `reader` into `writer` as NDJSON, one output line per kept input line
    pub fn decode_stream<R: BufRead, W: Write>(&mut self, mut reader: R, writer: &mut W) -> Result<()> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            if let Some(decoded) = self.decode_line(&line) {
                writer.write_all(decoded.to_output()?.as_bytes())?;
                writer.write_all(b"\n")?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    /// Decode a shard sequence in the given order as one stream
    pub fn decode_files<P: AsRef<Path>, W: Write>(&mut self, paths: &[P], writer: &mut W) -> Result<()> {
        for path in paths {
            let file = File::open(path.as_ref())?;
            self.decode_stream(BufReader::new(file), writer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_meta() -> SessionMetadata {
        SessionMetadata::new(1763500038.948842, 618549.44)
    }

    fn decoder(unparsed: UnparsedPolicy) -> EventDecoder {
        let options = DecodeOptions {
            unparsed,
            timezone: TimeZoneMode::Utc,
        };
        EventDecoder::new(
            &sample_meta(),
            options,
            Box::new(|pid: u32, fd: &str| (pid == 5 && fd == "3").then(|| "/tmp/a.txt".to_string())),
        )
    }

    fn event(line: Option<DecodedLine>) -> DecodedRecord {
        match line {
            Some(DecodedLine::Event(record)) => record,
            other => panic!("expected an event, got {:?}", other),
        }
    }

    #[test]
    fn test_fd_is_resolved() {
        let mut decoder = decoder(UnparsedPolicy::Passthrough);
        let record = event(decoder.decode_line("100 {pid=5 tid=5 proc=foo} {ENTER read} {fd=3}"));

        assert_eq!(record.details.get("fname"), Some("/tmp/a.txt"));
        assert_eq!(record.details.get("fd"), Some("3"));
        assert_eq!(record.proc_name, "foo");
    }

    #[test]
    fn test_existing_fname_is_kept() {
        let mut decoder = decoder(UnparsedPolicy::Passthrough);
        let record = event(decoder.decode_line(
            "100 {pid=5 tid=5 proc=foo} {EXIT openat} {fname=/etc/hosts fd=3}",
        ));

        assert_eq!(record.details.get("fname"), Some("/etc/hosts"));
        assert_eq!(decoder.stats().resolver_lookups, 0);
    }

    #[test]
    fn test_empty_fname_is_resolved() {
        let mut decoder = decoder(UnparsedPolicy::Passthrough);
        let record = event(decoder.decode_line("100 {pid=5 tid=5 proc=foo} {ENTER read} {fname= fd=3}"));
        assert_eq!(record.details.get("fname"), Some("/tmp/a.txt"));
    }

    #[test]
    fn test_unknown_without_inputs() {
        let mut decoder = decoder(UnparsedPolicy::Passthrough);

        let no_fd = event(decoder.decode_line("1 {pid=5 tid=5 proc=foo} {ENTER sync} {}"));
        assert_eq!(no_fd.details.get("fname"), Some(UNKNOWN_PATH));

        let pid_zero = event(decoder.decode_line("1 {pid=0 tid=0 proc=swapper} {ENTER read} {fd=3}"));
        assert_eq!(pid_zero.details.get("fname"), Some(UNKNOWN_PATH));

        let failed = event(decoder.decode_line("1 {pid=5 tid=5 proc=foo} {ENTER read} {fd=99}"));
        assert_eq!(failed.details.get("fname"), Some(UNKNOWN_PATH));

        assert_eq!(decoder.stats().resolver_lookups, 1);
    }

    #[test]
    fn test_resolver_is_memoized_per_run() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut decoder = EventDecoder::new(
            &sample_meta(),
            DecodeOptions::default(),
            Box::new(move |_: u32, _: &str| {
                counter.fetch_add(1, Ordering::SeqCst);
                Some("/var/log/app.log".to_string())
            }),
        );

        for _ in 0..3 {
            decoder.decode_line("100 {pid=5 tid=5 proc=foo} {ENTER write} {fd=3}");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unparsed_passthrough() {
        let mut decoder = decoder(UnparsedPolicy::Passthrough);
        let line = "Attaching 12 probes...";
        assert_eq!(
            decoder.decode_line(&format!("{}\n", line)),
            Some(DecodedLine::Unparsed(line.to_string()))
        );
        assert_eq!(decoder.stats().passed_through, 1);
    }

    #[test]
    fn test_passthrough_keeps_carriage_return() {
        let mut decoder = decoder(UnparsedPolicy::Passthrough);
        assert_eq!(
            decoder.decode_line("Attaching 12 probes...\r\n"),
            Some(DecodedLine::Unparsed("Attaching 12 probes...\r".to_string()))
        );

        let record = event(decoder.decode_line("100 {pid=5 tid=5 proc=foo} {ENTER read} {fd=3}\r\n"));
        assert_eq!(record.details.get("fd"), Some("3"));
    }

    #[test]
    fn test_unparsed_drop() {
        let mut decoder = decoder(UnparsedPolicy::Drop);
        assert_eq!(decoder.decode_line("Attaching 12 probes..."), None);
        assert_eq!(decoder.stats().dropped, 1);
    }

    #[test]
    fn test_stream_preserves_order() -> Result<()> {
        let input = "garbage\n618552580474815 {pid=5 tid=5 proc=foo} {ENTER read} {fd=3}\nmore garbage\n";

        let mut out = Vec::new();
        decoder(UnparsedPolicy::Passthrough).decode_stream(input.as_bytes(), &mut out)?;
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "garbage");
        assert!(lines[1].starts_with(r#"{"timestamp":"2025-11-18 21:07:22.089317","pid":5"#));
        assert_eq!(lines[2], "more garbage");

        let mut strict = Vec::new();
        decoder(UnparsedPolicy::Drop).decode_stream(input.as_bytes(), &mut strict)?;
        assert_eq!(String::from_utf8(strict).unwrap().lines().count(), 1);
        Ok(())
    }
}
