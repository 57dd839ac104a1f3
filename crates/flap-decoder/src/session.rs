use crate::decoder::{DecodeOptions, DecodeStats, EventDecoder};
use crate::resolver::FdResolver;
use crate::{Error, Result};
use flap_types::{SessionMetadata, decoded_file_name, parse_trace_file_name};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Raw files of one tracer, in decode order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFiles {
    pub tracer_id: String,
    pub paths: Vec<PathBuf>,
}

/// Result of decoding one tracer's files
#[derive(Debug, Clone)]
pub struct DecodedTrace {
    pub tracer_id: String,
    pub output: PathBuf,
    pub stats: DecodeStats,
}

/// Find the capture files and shards directly inside `dir`
///
/// Files are grouped per tracer; a single capture file comes first, then shards
/// by numeric index. Tracers are returned sorted by id.
pub fn discover_traces(dir: &Path) -> Result<Vec<TraceFiles>> {
    let mut found: BTreeMap<String, Vec<(Option<u32>, PathBuf)>> = BTreeMap::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if let Some(parsed) = parse_trace_file_name(name) {
            found
                .entry(parsed.tracer_id)
                .or_default()
                .push((parsed.index, entry.path().to_path_buf()));
        }
    }

    Ok(found
        .into_iter()
        .map(|(tracer_id, mut files)| {
            files.sort_by_key(|(index, _)| *index);
            TraceFiles {
                tracer_id,
                paths: files.into_iter().map(|(_, path)| path).collect(),
            }
        })
        .collect())
}

/// Decode every tracer of a session directory into `<id>.jsonl` files
///
/// Each tracer gets its own decoder, and so its own fd cache, built with a
/// resolver from `make_resolver`.
pub fn decode_session_dir<F>(
    dir: &Path,
    options: DecodeOptions,
    mut make_resolver: F,
) -> Result<Vec<DecodedTrace>>
where
    F: FnMut() -> Box<dyn FdResolver>,
{
    let meta_path = SessionMetadata::path_in(dir);
    if !meta_path.is_file() {
        return Err(Error::InvalidSession(format!(
            "{} not found",
            meta_path.display()
        )));
    }
    let meta = SessionMetadata::load_file(&meta_path)?;

    let traces = discover_traces(dir)?;
    if traces.is_empty() {
        return Err(Error::InvalidSession(format!(
            "no trace files in {}",
            dir.display()
        )));
    }

    let mut decoded = Vec::with_capacity(traces.len());
    for trace in traces {
        let output = dir.join(decoded_file_name(&trace.tracer_id));
        let mut writer = BufWriter::new(File::create(&output)?);

        let mut decoder = EventDecoder::new(&meta, options, make_resolver());
        decoder.decode_files(&trace.paths, &mut writer)?;
        let stats = decoder.stats();

        tracing::info!(
            "[{}] decoded {} line(s) from {} file(s) into {} ({} passed through, {} dropped)",
            trace.tracer_id,
            stats.decoded,
            trace.paths.len(),
            output.display(),
            stats.passed_through,
            stats.dropped
        );
        decoded.push(DecodedTrace {
            tracer_id: trace.tracer_id,
            output,
            stats,
        });
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flap_testing::fixtures::{SessionDir, lines};
    use tempfile::TempDir;

    #[test]
    fn test_discover_orders_shards_numerically() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let session = SessionDir::create(temp_dir.path())?;
        session.shard("io_logs", 10, &["c"])?;
        session.shard("io_logs", 2, &["b"])?;
        session.shard("io_logs", 0, &["a"])?;
        session.capture("meta_logs", &["m"])?;
        std::fs::write(temp_dir.path().join("io_logs.jsonl"), "")?;
        std::fs::create_dir(temp_dir.path().join("trace_nested.log"))?;

        let traces = discover_traces(temp_dir.path())?;
        let ids: Vec<_> = traces.iter().map(|t| t.tracer_id.as_str()).collect();
        assert_eq!(ids, vec!["io_logs", "meta_logs"]);

        let names: Vec<_> = traces[0]
            .paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "trace_io_logs.00000.log",
                "trace_io_logs.00002.log",
                "trace_io_logs.00010.log"
            ]
        );
        Ok(())
    }

    #[test]
    fn test_missing_meta_is_rejected() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let err = decode_session_dir(temp_dir.path(), DecodeOptions::default(), || {
            Box::new(|_: u32, _: &str| None::<String>)
        })
        .unwrap_err();
        assert!(matches!(err, Error::InvalidSession(_)));
        Ok(())
    }

    #[test]
    fn test_shards_decode_into_one_output() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let session = SessionDir::create(temp_dir.path())?;
        session.shard("io_logs", 0, &[lines::BANNER, lines::READ_WITH_FD])?;
        session.shard("io_logs", 1, &[lines::OPEN_WITH_FNAME])?;

        let decoded = decode_session_dir(temp_dir.path(), DecodeOptions::default(), || {
            Box::new(|_: u32, _: &str| Some("/tmp/a.txt".to_string()))
        })?;

        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].stats.decoded, 2);
        assert_eq!(decoded[0].stats.passed_through, 1);

        let content = std::fs::read_to_string(&decoded[0].output)?;
        let output: Vec<&str> = content.lines().collect();
        assert_eq!(output.len(), 3);
        assert_eq!(output[0], lines::BANNER);
        assert!(output[2].contains(r#""operand":"openat""#));
        Ok(())
    }
}
