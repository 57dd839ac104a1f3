use crate::sink::LineSink;
use flap_types::shard_file_name;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Splits a line stream into size-bounded shards `trace_<id>.<index>.log`
///
/// Rotation happens before the write that would overflow the threshold, so a
/// shard only exceeds it when it holds a single line longer than the
/// threshold itself. Lines are never split.
pub struct RotatingWriter {
    tracer_id: String,
    dir: PathBuf,
    threshold: u64,
    index: u32,
    current_bytes: u64,
    file: Option<BufWriter<File>>,
    closed: bool,
}

impl RotatingWriter {
    /// Open shard 0 in `dir`
    pub fn create(dir: &Path, tracer_id: impl Into<String>, threshold: u64) -> io::Result<Self> {
        let mut writer = Self {
            tracer_id: tracer_id.into(),
            dir: dir.to_path_buf(),
            threshold,
            index: 0,
            current_bytes: 0,
            file: None,
            closed: false,
        };
        writer.open_shard()?;
        Ok(writer)
    }

    pub fn tracer_id(&self) -> &str {
        &self.tracer_id
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Index of the shard currently being written
    pub fn shard_index(&self) -> u32 {
        self.index
    }

    pub fn current_bytes(&self) -> u64 {
        self.current_bytes
    }

    pub fn shard_path(&self, index: u32) -> PathBuf {
        self.dir.join(shard_file_name(&self.tracer_id, index))
    }

    /// Paths of every shard opened so far, in index order
    pub fn shard_paths(&self) -> Vec<PathBuf> {
        (0..=self.index).map(|i| self.shard_path(i)).collect()
    }

    fn open_shard(&mut self) -> io::Result<()> {
        let path = self.shard_path(self.index);
        let file = File::create(&path)?;
        tracing::info!("[{}] rotating to {}", self.tracer_id, path.display());
        self.file = Some(BufWriter::new(file));
        self.current_bytes = 0;
        Ok(())
    }

    fn rotate(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        self.index += 1;
        self.open_shard()
    }

    /// Write one line, terminating it with `\n` when missing
    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::other(format!(
                "rotating writer for '{}' is closed",
                self.tracer_id
            )));
        }

        let needs_newline = !line.ends_with('\n');
        let len = line.len() as u64 + u64::from(needs_newline);

        if self.current_bytes > 0 && self.current_bytes + len > self.threshold {
            self.rotate()?;
        }

        let file = match self.file.as_mut() {
            Some(file) => file,
            None => return Err(io::Error::other("no open shard")),
        };
        file.write_all(line.as_bytes())?;
        if needs_newline {
            file.write_all(b"\n")?;
        }
        self.current_bytes += len;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }

    /// Flush and close the open shard; later calls are no-ops
    pub fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.file.take() {
            Some(mut file) => file.flush(),
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl LineSink for RotatingWriter {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        RotatingWriter::write_line(self, line)
    }

    fn close(&mut self) -> io::Result<()> {
        RotatingWriter::close(self)
    }
}

impl Drop for RotatingWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("[{}] failed to close shard: {}", self.tracer_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn shard_sizes(writer: &RotatingWriter) -> Vec<u64> {
        writer
            .shard_paths()
            .iter()
            .map(|p| std::fs::metadata(p).unwrap().len())
            .collect()
    }

    #[test]
    fn test_rotates_before_overflow() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let mut writer = RotatingWriter::create(temp_dir.path(), "io_logs", 10)?;

        writer.write_line("aaaa")?; // 5 bytes
        writer.write_line("bbbb")?; // 10 bytes, exactly the threshold
        assert_eq!(writer.shard_index(), 0);

        writer.write_line("cc")?; // would be 13
        assert_eq!(writer.shard_index(), 1);
        assert_eq!(writer.current_bytes(), 3);

        writer.close()?;
        assert_eq!(shard_sizes(&writer), vec![10, 3]);
        assert_eq!(
            std::fs::read_to_string(writer.shard_path(0))?,
            "aaaa\nbbbb\n"
        );
        Ok(())
    }

    #[test]
    fn test_oversized_line_gets_its_own_shard() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let mut writer = RotatingWriter::create(temp_dir.path(), "io_logs", 8)?;

        writer.write_line("ab")?;
        writer.write_line("0123456789abcdef")?;
        writer.write_line("cd")?;
        writer.close()?;

        assert_eq!(writer.shard_index(), 2);
        assert_eq!(
            std::fs::read_to_string(writer.shard_path(1))?,
            "0123456789abcdef\n"
        );
        assert_eq!(std::fs::read_to_string(writer.shard_path(2))?, "cd\n");
        Ok(())
    }

    #[test]
    fn test_oversized_first_line_does_not_leave_empty_shard() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let mut writer = RotatingWriter::create(temp_dir.path(), "io_logs", 4)?;

        writer.write_line("oversized")?;
        writer.close()?;

        assert_eq!(writer.shard_index(), 0);
        assert_eq!(shard_sizes(&writer), vec![10]);
        Ok(())
    }

    #[test]
    fn test_shards_never_exceed_threshold() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let threshold = 64;
        let mut writer = RotatingWriter::create(temp_dir.path(), "event_logs", threshold)?;

        let mut lines = Vec::new();
        for i in 0..200usize {
            let line = "x".repeat((i * 7) % 90);
            writer.write_line(&line)?;
            lines.push(line);
        }
        writer.close()?;

        let mut rebuilt = Vec::new();
        for path in writer.shard_paths() {
            let content = std::fs::read_to_string(&path)?;
            let shard_lines: Vec<&str> = content.lines().collect();
            if content.len() as u64 > threshold {
                assert_eq!(shard_lines.len(), 1, "{} exceeds threshold", path.display());
                assert!(shard_lines[0].len() as u64 + 1 > threshold);
            }
            rebuilt.extend(shard_lines.into_iter().map(str::to_string));
        }
        assert_eq!(rebuilt, lines);
        Ok(())
    }

    #[test]
    fn test_existing_newline_is_counted_once() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let mut writer = RotatingWriter::create(temp_dir.path(), "io_logs", 100)?;
        writer.write_line("abc\n")?;
        assert_eq!(writer.current_bytes(), 4);
        Ok(())
    }

    #[test]
    fn test_close_is_idempotent() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let mut writer = RotatingWriter::create(temp_dir.path(), "io_logs", 100)?;
        writer.write_line("abc")?;
        writer.close()?;
        writer.close()?;
        assert!(writer.is_closed());
        assert!(writer.write_line("late").is_err());
        Ok(())
    }
}
