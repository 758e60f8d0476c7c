//! Observability and Metrics
//!
//! Process-wide counters for the packet processor and the matcher.
//!
//! Uses atomic counters for thread-safe metrics collection.

use crate::error::ProcessorError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Global metrics collector for packet layer operations
#[derive(Debug)]
pub struct Metrics {
    /// Frames written
    pub packets_written: AtomicU64,
    /// Frames written encrypted
    pub packets_written_encrypted: AtomicU64,
    /// Frames read
    pub packets_read: AtomicU64,
    /// Frames read that were encrypted
    pub packets_read_encrypted: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Failed writes, including encryption failures
    pub write_failures: AtomicU64,
    /// Failed AEAD encryptions
    pub encrypt_failures: AtomicU64,
    /// Frames rejected before or during decryption
    pub decrypt_failures: AtomicU64,
    /// Frames rejected after decryption or on the clear channel
    pub read_failures: AtomicU64,
    /// Connect tokens issued
    pub tokens_issued: AtomicU64,
    /// Connect token requests refused
    pub token_failures: AtomicU64,
    /// Sequences rejected by replay protection
    pub replays_rejected: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            packets_written: AtomicU64::new(0),
            packets_written_encrypted: AtomicU64::new(0),
            packets_read: AtomicU64::new(0),
            packets_read_encrypted: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            encrypt_failures: AtomicU64::new(0),
            decrypt_failures: AtomicU64::new(0),
            read_failures: AtomicU64::new(0),
            tokens_issued: AtomicU64::new(0),
            token_failures: AtomicU64::new(0),
            replays_rejected: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a written frame
    pub fn packet_written(&self, byte_count: u64, encrypted: bool) {
        self.packets_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(byte_count, Ordering::Relaxed);
        if encrypted {
            self.packets_written_encrypted.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a failed write
    pub fn write_failed(&self, error: ProcessorError) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
        if error == ProcessorError::EncryptFailed {
            self.encrypt_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record an accepted frame
    pub fn packet_read(&self, byte_count: u64, encrypted: bool) {
        self.packets_read.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(byte_count, Ordering::Relaxed);
        if encrypted {
            self.packets_read_encrypted.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a rejected frame
    pub fn read_failed(&self, error: ProcessorError) {
        match error {
            ProcessorError::DecryptFailed | ProcessorError::PacketTooSmall => {
                self.decrypt_failures.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.read_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Record an issued connect token
    pub fn token_issued(&self) {
        self.tokens_issued.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a refused connect token request
    pub fn token_failed(&self) {
        self.token_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a replayed sequence
    pub fn replay_rejected(&self) {
        self.replays_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            packets_written: self.packets_written.load(Ordering::Relaxed),
            packets_written_encrypted: self.packets_written_encrypted.load(Ordering::Relaxed),
            packets_read: self.packets_read.load(Ordering::Relaxed),
            packets_read_encrypted: self.packets_read_encrypted.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            encrypt_failures: self.encrypt_failures.load(Ordering::Relaxed),
            decrypt_failures: self.decrypt_failures.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            tokens_issued: self.tokens_issued.load(Ordering::Relaxed),
            token_failures: self.token_failures.load(Ordering::Relaxed),
            replays_rejected: self.replays_rejected.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            packets_written = snapshot.packets_written,
            packets_written_encrypted = snapshot.packets_written_encrypted,
            packets_read = snapshot.packets_read,
            packets_read_encrypted = snapshot.packets_read_encrypted,
            bytes_written = snapshot.bytes_written,
            bytes_read = snapshot.bytes_read,
            write_failures = snapshot.write_failures,
            encrypt_failures = snapshot.encrypt_failures,
            decrypt_failures = snapshot.decrypt_failures,
            read_failures = snapshot.read_failures,
            tokens_issued = snapshot.tokens_issued,
            token_failures = snapshot.token_failures,
            replays_rejected = snapshot.replays_rejected,
            uptime_seconds = snapshot.uptime_seconds,
            "Packet layer metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub packets_written: u64,
    pub packets_written_encrypted: u64,
    pub packets_read: u64,
    pub packets_read_encrypted: u64,
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub write_failures: u64,
    pub encrypt_failures: u64,
    pub decrypt_failures: u64,
    pub read_failures: u64,
    pub tokens_issued: u64,
    pub token_failures: u64,
    pub replays_rejected: u64,
    pub uptime_seconds: u64,
}

static METRICS: once_cell::sync::Lazy<Metrics> = once_cell::sync::Lazy::new(Metrics::new);

/// Get the global metrics instance
pub fn global_metrics() -> &'static Metrics {
    &METRICS
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    /// Start timing an operation
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_us = duration.as_micros() as u64,
            "Operation completed"
        );
    }
}
