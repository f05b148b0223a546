//! Stress helpers for concurrent writers.
//!
//! Every thread writes fixed-length lines of the form `t<thread>-<seq>`
//! padded with dots. [`verify_lines`] then checks that no line was torn and
//! that each thread's lines appear in the order it wrote them.

use logroll_core::RotatingWriter;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Successful writes.
    pub successful_ops: usize,
    /// Failed writes.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
}

impl StressTestResult {
    /// Writes per second.
    pub fn ops_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            (self.successful_ops + self.failed_ops) as f64 / secs
        } else {
            0.0
        }
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of writer threads.
    pub threads: usize,
    /// Lines written by each thread.
    pub writes_per_thread: usize,
    /// Length of every line including the newline.
    pub line_len: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            writes_per_thread: 500,
            line_len: 32,
        }
    }
}

/// Builds the line thread `thread` writes as its `seq`-th write.
pub fn stress_line(thread: usize, seq: usize, line_len: usize) -> Vec<u8> {
    let mut line = format!("t{thread:03}-{seq:08}").into_bytes();
    let body = line_len.saturating_sub(1).max(line.len());
    line.resize(body, b'.');
    line.push(b'\n');
    line
}

/// Writes from `config.threads` threads at once.
pub fn concurrent_writes(writer: &Arc<RotatingWriter>, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|thread_id| {
            let writer = Arc::clone(writer);
            let config = config.clone();
            thread::spawn(move || {
                let mut ok = 0usize;
                let mut failed = 0usize;
                for seq in 0..config.writes_per_thread {
                    match writer.write(&stress_line(thread_id, seq, config.line_len)) {
                        Ok(_) => ok += 1,
                        Err(_) => failed += 1,
                    }
                }
                (ok, failed)
            })
        })
        .collect();

    let (successful_ops, failed_ops) = handles
        .into_iter()
        .map(|h| h.join().expect("writer thread panicked"))
        .fold((0, 0), |(a, b), (ok, failed)| (a + ok, b + failed));

    StressTestResult {
        successful_ops,
        failed_ops,
        duration: start.elapsed(),
    }
}

/// Checks a stream produced by [`concurrent_writes`].
///
/// # Errors
///
/// Describes the first torn, missing or reordered line.
pub fn verify_lines(stream: &[u8], config: &StressConfig) -> Result<(), String> {
    let line_len = stress_line(0, 0, config.line_len).len();
    let mut next_seq: HashMap<usize, usize> = HashMap::new();
    let mut total = 0usize;

    for line in stream.split_inclusive(|&b| b == b'\n') {
        if line.len() != line_len || !line.ends_with(b"\n") {
            return Err(format!("torn line {:?}", String::from_utf8_lossy(line)));
        }
        let text = std::str::from_utf8(line).map_err(|e| e.to_string())?;
        let id = text.trim_end_matches('\n').trim_end_matches('.');
        let (thread, seq) = id
            .strip_prefix('t')
            .and_then(|rest| rest.split_once('-'))
            .ok_or_else(|| format!("malformed line {text:?}"))?;
        let thread: usize = thread.parse().map_err(|_| format!("bad thread in {text:?}"))?;
        let seq: usize = seq.parse().map_err(|_| format!("bad sequence in {text:?}"))?;

        let expected = next_seq.entry(thread).or_insert(0);
        if seq != *expected {
            return Err(format!("thread {thread}: expected {expected}, got {seq}"));
        }
        *expected += 1;
        total += 1;
    }

    let wanted = config.threads * config.writes_per_thread;
    if total != wanted {
        return Err(format!("expected {wanted} lines, found {total}"));
    }
    Ok(())
}
