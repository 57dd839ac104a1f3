const TRACE_PREFIX: &str = "trace_";
const TRACE_SUFFIX: &str = ".log";

/// File name of shard `index` of tracer `id`, e.g. `trace_io_logs.00003.log`
///
/// The zero-padded index keeps lexical and numeric order identical.
pub fn shard_file_name(id: &str, index: u32) -> String {
    format!("{TRACE_PREFIX}{id}.{index:05}{TRACE_SUFFIX}")
}

/// File name of the single capture file of tracer `id`
pub fn capture_file_name(id: &str) -> String {
    format!("{TRACE_PREFIX}{id}{TRACE_SUFFIX}")
}

/// File name of the decoded NDJSON output of tracer `id`
pub fn decoded_file_name(id: &str) -> String {
    format!("{id}.jsonl")
}

/// A raw trace file name split into tracer id and shard index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFileName {
    pub tracer_id: String,
    /// `None` for a single capture file
    pub index: Option<u32>,
}

/// Inverse of [`shard_file_name`] and [`capture_file_name`]
pub fn parse_trace_file_name(name: &str) -> Option<TraceFileName> {
    let stem = name.strip_prefix(TRACE_PREFIX)?.strip_suffix(TRACE_SUFFIX)?;
    if stem.is_empty() {
        return None;
    }

    if let Some((id, index)) = stem.rsplit_once('.') {
        if !id.is_empty() && !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()) {
            return index.parse().ok().map(|index| TraceFileName {
                tracer_id: id.to_string(),
                index: Some(index),
            });
        }
    }

    Some(TraceFileName {
        tracer_id: stem.to_string(),
        index: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_names_sort_by_index() {
        let mut names: Vec<_> = [10, 2, 0, 1].iter().map(|i| shard_file_name("io_logs", *i)).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "trace_io_logs.00000.log",
                "trace_io_logs.00001.log",
                "trace_io_logs.00002.log",
                "trace_io_logs.00010.log",
            ]
        );
    }

    #[test]
    fn test_parse_shard_name() {
        let parsed = parse_trace_file_name("trace_io_logs.00012.log").unwrap();
        assert_eq!(parsed.tracer_id, "io_logs");
        assert_eq!(parsed.index, Some(12));
    }

    #[test]
    fn test_parse_capture_name() {
        let parsed = parse_trace_file_name(&capture_file_name("event_logs")).unwrap();
        assert_eq!(parsed.tracer_id, "event_logs");
        assert_eq!(parsed.index, None);
    }

    #[test]
    fn test_parse_rejects_foreign_files() {
        assert!(parse_trace_file_name("meta.json").is_none());
        assert!(parse_trace_file_name("io_logs.jsonl").is_none());
        assert!(parse_trace_file_name("trace_.log").is_none());
    }
}
