//! Benchmark utilities.

use rand::Rng;

const WORDS: &[&str] = &[
    "request", "completed", "user", "session", "cache", "miss", "upstream", "latency",
    "status=200", "status=404", "retry", "GET", "POST", "/api/v1/items", "ok", "timeout",
];

/// Generate random bytes of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate one newline-terminated, log-like line of exactly `len` bytes.
pub fn log_line(len: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    let mut line = Vec::with_capacity(len);
    while line.len() + 1 < len {
        if !line.is_empty() {
            line.push(b' ');
        }
        line.extend_from_slice(WORDS[rng.gen_range(0..WORDS.len())].as_bytes());
    }
    line.truncate(len.saturating_sub(1));
    line.push(b'\n');
    line
}

/// Generate `size` bytes of log-like text.
pub fn log_text(size: usize) -> Vec<u8> {
    let mut text = Vec::with_capacity(size + 128);
    while text.len() < size {
        text.extend(log_line(96));
    }
    text.truncate(size);
    text
}
