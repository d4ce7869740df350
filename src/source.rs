//! Raw counter sources
//!
//! The accountants in [`crate::core`] only consume parsed fields. Reading
//! pseudo-files, sampling performance counters, and running system tools is
//! done by the collaborators defined here, so each platform probe can be
//! exercised against fixtures.

use crate::error::SourceError;
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// Reads text counter sources such as procfs and sysfs files
pub trait TextCounterReader {
    /// Read `path` as an ordered sequence of lines
    fn read_lines(&self, path: &str) -> Result<Vec<String>, SourceError>;

    /// List the entry names of directory `path`
    fn list_dir(&self, path: &str) -> Result<Vec<String>, SourceError>;

    /// Resolve the target of symlink `path`
    fn read_link(&self, path: &str) -> Result<PathBuf, SourceError>;

    /// Read `path` and return its first line trimmed
    fn read_string(&self, path: &str) -> Result<String, SourceError> {
        Ok(self
            .read_lines(path)?
            .into_iter()
            .next()
            .map(|line| line.trim().to_string())
            .unwrap_or_default())
    }

    /// Read `path` and parse its first line as an integer
    fn read_u64(&self, path: &str) -> Option<u64> {
        self.read_string(path).ok()?.parse().ok()
    }

    /// True if `path` can be read
    fn exists(&self, path: &str) -> bool {
        self.read_lines(path).is_ok()
    }
}

/// [`TextCounterReader`] backed by the real filesystem under a root prefix
#[derive(Debug, Clone)]
pub struct FsReader {
    root: PathBuf,
}

impl FsReader {
    /// Create a reader rooted at `root` (`/` for the live system)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }


    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl Default for FsReader {
    fn default() -> Self {
        Self::new("/")
    }
}

impl TextCounterReader for FsReader {
    fn read_lines(&self, path: &str) -> Result<Vec<String>, SourceError> {
        let content =
            fs::read_to_string(self.resolve(path)).map_err(|e| SourceError::from_io(path, e))?;
        Ok(content.lines().map(str::to_string).collect())
    }

    fn list_dir(&self, path: &str) -> Result<Vec<String>, SourceError> {
        let entries = fs::read_dir(self.resolve(path)).map_err(|e| SourceError::from_io(path, e))?;
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        Ok(names)
    }

    fn read_link(&self, path: &str) -> Result<PathBuf, SourceError> {
        fs::read_link(self.resolve(path)).map_err(|e| SourceError::from_io(path, e))
    }
}

/// Runs system tools and returns their standard output
pub trait ToolRunner {
    /// Run `program` with `args`, returning stdout lines on success
    fn run(&self, program: &str, args: &[&str]) -> Result<Vec<String>, SourceError>;
}

/// [`ToolRunner`] that spawns processes and kills them after a timeout
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
}

impl CommandRunner {
    /// Create a runner with the given per-invocation timeout
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ToolRunner for CommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<Vec<String>, SourceError> {
        let query = format!("{} {}", program, args.join(" "));
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SourceError::from_io(program, e))?;

        // Drain stdout on a separate thread so a chatty tool cannot block on a full pipe
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| SourceError::CommandFailed(format!("{}: no stdout", query)))?;
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stdout.read_to_end(&mut buf);
            let _ = tx.send(buf);
        });

        let timed_out = || SourceError::Timeout {
            query: query.clone(),
            timeout_ms: self.timeout.as_millis() as u64,
        };

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(timed_out());
                }
                Ok(None) => thread::sleep(Duration::from_millis(10)),
                Err(e) => return Err(SourceError::from_io(program, e)),
            }
        };

        // Background grandchildren can keep the pipe open after the tool exits;
        // the reader thread is left detached when the deadline passes
        let remaining = deadline.saturating_duration_since(Instant::now());
        let output = match rx.recv_timeout(remaining) {
            Ok(buf) => buf,
            Err(mpsc::RecvTimeoutError::Timeout) => return Err(timed_out()),
            Err(mpsc::RecvTimeoutError::Disconnected) => Vec::new(),
        };

        if !status.success() {
            return Err(SourceError::CommandFailed(format!("{}: {}", query, status)));
        }

        Ok(String::from_utf8_lossy(&output)
            .lines()
            .map(str::to_string)
            .collect())
    }
}

/// One sample of a raw performance counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawCounterValue {
    /// Raw 64-bit counter value
    pub value: u64,
    /// Sample timestamp in 100ns units
    pub timestamp_100ns: u64,
}

/// Samples raw performance counters by path
pub trait PerfCounterSource {
    /// Query the raw value of `counter_path`
    fn query(&self, counter_path: &str) -> Result<RawCounterValue, SourceError>;
}
