use crate::rotation::RotatingWriter;
use flap_types::capture_file_name;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Destination for a tracer's captured stdout, one line at a time
pub trait LineSink: Send {
    fn write_line(&mut self, line: &str) -> io::Result<()>;

    /// Flush and release the destination; must tolerate repeated calls
    fn close(&mut self) -> io::Result<()>;
}

/// Single unbounded capture file `trace_<id>.log`
pub struct CaptureFile {
    path: PathBuf,
    file: Option<BufWriter<File>>,
}

impl CaptureFile {
    pub fn create(dir: &Path, tracer_id: &str) -> io::Result<Self> {
        let path = dir.join(capture_file_name(tracer_id));
        let file = File::create(&path)?;
        Ok(Self {
            path,
            file: Some(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LineSink for CaptureFile {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::other(format!("{} is closed", self.path.display())))?;
        file.write_all(line.as_bytes())?;
        if !line.ends_with('\n') {
            file.write_all(b"\n")?;
        }
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        match self.file.take() {
            Some(mut file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for CaptureFile {
    fn drop(&mut self) {
        let _ = LineSink::close(self);
    }
}

/// Capture mode as written in configuration, independent of any directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Tracer output goes straight to our stdout
    Passthrough,
    File,
    #[default]
    Rotate,
}

impl CaptureMode {
    pub fn into_sink(self, dir: &Path, rotate_bytes: u64) -> OutputSink {
        match self {
            CaptureMode::Passthrough => OutputSink::Passthrough,
            CaptureMode::File => OutputSink::CaptureFile {
                dir: dir.to_path_buf(),
            },
            CaptureMode::Rotate => OutputSink::Rotating {
                dir: dir.to_path_buf(),
                threshold: rotate_bytes,
            },
        }
    }
}

/// Where a tracer's stdout ends up
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputSink {
    /// Inherit the supervisor's stdout
    #[default]
    Passthrough,
    /// One capture file in `dir`
    CaptureFile { dir: PathBuf },
    /// Size-bounded shards in `dir`
    Rotating { dir: PathBuf, threshold: u64 },
}

impl OutputSink {
    /// Whether stdout must be piped through a capture pump
    pub fn is_captured(&self) -> bool {
        !matches!(self, OutputSink::Passthrough)
    }

    /// Open the line sink for one tracer; `None` for passthrough
    pub fn open(&self, tracer_id: &str) -> io::Result<Option<Box<dyn LineSink>>> {
        match self {
            OutputSink::Passthrough => Ok(None),
            OutputSink::CaptureFile { dir } => {
                Ok(Some(Box::new(CaptureFile::create(dir, tracer_id)?)))
            }
            OutputSink::Rotating { dir, threshold } => Ok(Some(Box::new(
                RotatingWriter::create(dir, tracer_id, *threshold)?,
            ))),
        }
    }
}

/// Copy `reader` into `sink` line by line until EOF, then close the sink
///
/// Runs on the capture thread of one tracer. Invalid UTF-8 is replaced rather
/// than aborting the capture.
pub fn pump_lines<R: Read>(tracer_id: &str, reader: R, mut sink: Box<dyn LineSink>) -> u64 {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut lines = 0u64;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                if let Err(e) = sink.write_line(&line) {
                    tracing::error!("[{}] capture write failed: {}", tracer_id, e);
                    break;
                }
                lines += 1;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!("[{}] capture read failed: {}", tracer_id, e);
                break;
            }
        }
    }

    if let Err(e) = sink.close() {
        tracing::warn!("[{}] failed to close capture: {}", tracer_id, e);
    }
    tracing::debug!("[{}] capture finished after {} lines", tracer_id, lines);
    lines
}
