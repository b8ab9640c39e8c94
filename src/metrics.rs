//! Lightweight global metrics for dataset I/O.
//!
//! Thread-safe atomic counters:
//! - Pages / rows read and written
//! - Page updates (in-place appends)
//! - Auto-recoveries
//! - Header sections parsed

use std::sync::atomic::{AtomicU64, Ordering};

// ----- Pages -----
static PAGES_READ: AtomicU64 = AtomicU64::new(0);
static PAGES_WRITTEN: AtomicU64 = AtomicU64::new(0);
static PAGE_UPDATES: AtomicU64 = AtomicU64::new(0);

// ----- Rows -----
static ROWS_READ: AtomicU64 = AtomicU64::new(0);
static ROWS_WRITTEN: AtomicU64 = AtomicU64::new(0);

// ----- Recovery -----
static AUTO_RECOVERIES: AtomicU64 = AtomicU64::new(0);

// ----- Header -----
static HEADER_SECTIONS_PARSED: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub pages_read: u64,
    pub pages_written: u64,
    pub page_updates: u64,

    pub rows_read: u64,
    pub rows_written: u64,

    pub auto_recoveries: u64,

    pub header_sections_parsed: u64,
}

impl MetricsSnapshot {
    pub fn avg_rows_per_page_read(&self) -> f64 {
        if self.pages_read == 0 {
            0.0
        } else {
            self.rows_read as f64 / self.pages_read as f64
        }
    }
}

// ----- Recorders -----
pub fn record_page_read(rows: u64) {
    PAGES_READ.fetch_add(1, Ordering::Relaxed);
    ROWS_READ.fetch_add(rows, Ordering::Relaxed);
}

pub fn record_page_written(rows: u64) {
    PAGES_WRITTEN.fetch_add(1, Ordering::Relaxed);
    ROWS_WRITTEN.fetch_add(rows, Ordering::Relaxed);
}

pub fn record_page_update(rows: u64) {
    PAGE_UPDATES.fetch_add(1, Ordering::Relaxed);
    ROWS_WRITTEN.fetch_add(rows, Ordering::Relaxed);
}

pub fn record_auto_recovery() {
    AUTO_RECOVERIES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_header_section() {
    HEADER_SECTIONS_PARSED.fetch_add(1, Ordering::Relaxed);
}

// ----- Snapshot / Reset -----
pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        pages_read: PAGES_READ.load(Ordering::Relaxed),
        pages_written: PAGES_WRITTEN.load(Ordering::Relaxed),
        page_updates: PAGE_UPDATES.load(Ordering::Relaxed),

        rows_read: ROWS_READ.load(Ordering::Relaxed),
        rows_written: ROWS_WRITTEN.load(Ordering::Relaxed),

        auto_recoveries: AUTO_RECOVERIES.load(Ordering::Relaxed),

        header_sections_parsed: HEADER_SECTIONS_PARSED.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    PAGES_READ.store(0, Ordering::Relaxed);
    PAGES_WRITTEN.store(0, Ordering::Relaxed);
    PAGE_UPDATES.store(0, Ordering::Relaxed);

    ROWS_READ.store(0, Ordering::Relaxed);
    ROWS_WRITTEN.store(0, Ordering::Relaxed);

    AUTO_RECOVERIES.store(0, Ordering::Relaxed);

    HEADER_SECTIONS_PARSED.store(0, Ordering::Relaxed);
}
