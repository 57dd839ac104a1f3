//! Fixtures for fake tracers and recorded sessions.
//!
//! Tests drive the supervisor with `sh` standing in for the tracer binary, so
//! a "script" here is a small shell script run as `sh <script> <args...>`.

use anyhow::Result;
use flap_types::{SessionMetadata, capture_file_name, shard_file_name};
use std::fs;
use std::path::{Path, PathBuf};

/// Reference pair of the recorded sample session
pub const SAMPLE_REF_WALL: f64 = 1763500038.948842;
pub const SAMPLE_REF_MONO: f64 = 618549.44;

/// Fake tracer bodies
pub mod scripts {
    /// Exits immediately with success
    pub const EXIT_OK: &str = "exit 0\n";

    /// Runs until signalled
    pub const RUN_UNTIL_SIGNALLED: &str = "while true; do sleep 0.05; done\n";

    /// Ignores SIGINT and SIGTERM; only SIGKILL ends it
    pub const IGNORE_INT_AND_TERM: &str = "trap '' INT TERM\nwhile true; do sleep 0.05; done\n";

    /// Prints its first positional argument and exits
    pub const ECHO_FIRST_ARG: &str = "echo \"target=$1\"\n";

    /// Exits with the given code
    pub fn exit_with(code: i32) -> String {
        format!("exit {}\n", code)
    }

    /// Prints each line then exits
    pub fn print_lines(lines: &[&str]) -> String {
        let mut body = String::new();
        for line in lines {
            body.push_str(&format!("printf '%s\\n' '{}'\n", line.replace('\'', "'\\''")));
        }
        body
    }
}

/// Raw tracer lines as bpftrace prints them
pub mod lines {
    pub const READ_WITH_FD: &str = "618552580474815 {pid=5 tid=5 proc=foo} {ENTER read} {fd=3}";
    pub const OPEN_WITH_FNAME: &str =
        "618552580500000 {pid=5 tid=6 proc=foo} {EXIT openat} {fname=/etc/hosts ret=3}";
    pub const EXIT_NO_FD: &str = "618552581000000 {pid=0 tid=0 proc=swapper} {EXIT idle} {}";
    pub const BANNER: &str = "Attaching 12 probes...";
}

/// Write a shell script under `dir`, creating parents
pub fn write_script(dir: &Path, name: &str, body: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, body)?;
    Ok(path)
}

/// Write an executable script, for helpers that are run directly
pub fn write_executable(dir: &Path, name: &str, body: &str) -> Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let path = write_script(dir, name, &format!("#!/bin/sh\n{}", body))?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
    Ok(path)
}

/// Lay out `<scripts_root>/<target_dir>/{meta_trace,io_trace,events_trace}.bt`
pub fn write_target_scripts(scripts_root: &Path, target_dir: &str, body: &str) -> Result<PathBuf> {
    let dir = scripts_root.join(target_dir);
    for name in ["meta_trace.bt", "io_trace.bt", "events_trace.bt"] {
        write_script(&dir, name, body)?;
    }
    Ok(dir)
}

/// Builder for a recorded session directory
pub struct SessionDir {
    dir: PathBuf,
}

impl SessionDir {
    /// Create `dir` and write the sample reference pair into it
    pub fn create(dir: &Path) -> Result<Self> {
        Self::with_metadata(dir, SessionMetadata::new(SAMPLE_REF_WALL, SAMPLE_REF_MONO))
    }

    pub fn with_metadata(dir: &Path, meta: SessionMetadata) -> Result<Self> {
        fs::create_dir_all(dir)?;
        meta.save_to(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Write a single capture file for `tracer_id`
    pub fn capture(&self, tracer_id: &str, lines: &[&str]) -> Result<PathBuf> {
        let path = self.dir.join(capture_file_name(tracer_id));
        fs::write(&path, join_lines(lines))?;
        Ok(path)
    }

    /// Write shard `index` of `tracer_id`
    pub fn shard(&self, tracer_id: &str, index: u32, lines: &[&str]) -> Result<PathBuf> {
        let path = self.dir.join(shard_file_name(tracer_id, index));
        fs::write(&path, join_lines(lines))?;
        Ok(path)
    }
}

fn join_lines(lines: &[&str]) -> String {
    lines.iter().map(|l| format!("{}\n", l)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_print_lines_quotes() {
        let body = scripts::print_lines(&["it's"]);
        assert_eq!(body, "printf '%s\\n' 'it'\\''s'\n");
    }

    #[test]
    fn test_session_dir_layout() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let session = SessionDir::create(&temp_dir.path().join("out"))?;
        session.shard("io_logs", 1, &[lines::READ_WITH_FD])?;

        assert!(session.path().join("meta.json").is_file());
        assert!(session.path().join("trace_io_logs.00001.log").is_file());
        Ok(())
    }
}
