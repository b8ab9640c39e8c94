//! Centralized configuration and builder for datasets.
//!
//! Goals:
//! - Single place to collect tunables instead of scattering env lookups.
//! - `SddsConfig::from_env()` reads the SDDS_* variables; `Default` ignores env.
//! - `DatasetBuilder` carries a config into `Dataset::open_*`/`create`.
//!
//! Env:
//! - SDDS_OUTPUT_ENDIANESS = big|little (byte order of newly created binary output)
//! - SDDS_AUTO_RECOVER = 0|1
//! - SDDS_ROW_INCREMENT, SDDS_FIXED_ROW_INCREMENT, SDDS_MAX_INCLUDE_DEPTH
//! - SDDS_LOCK_ON_WRITE = 0|1 (default 1)

use anyhow::Result;
use std::fmt;
use std::path::Path;

use crate::consts::{
    DEFAULT_FIXED_ROW_INCREMENT, DEFAULT_MAX_INCLUDE_DEPTH, DEFAULT_ROW_INCREMENT,
    ENV_AUTO_RECOVER, ENV_FIXED_ROW_INCREMENT, ENV_LOCK_ON_WRITE, ENV_MAX_INCLUDE_DEPTH,
    ENV_OUTPUT_ENDIANESS, ENV_ROW_INCREMENT,
};
use crate::dataset::Dataset;
use crate::error::ErrorHistory;
use crate::layout::Encoding;
use crate::types::ByteOrder;
use crate::util::{env_flag, env_parse};

#[derive(Clone, Debug)]
pub struct SddsConfig {
    /// Byte order for newly created binary output; None = machine-native.
    /// Env: SDDS_OUTPUT_ENDIANESS
    pub output_byte_order: Option<ByteOrder>,

    /// Accept the rows parsed so far when a page tail is malformed or truncated.
    /// Env: SDDS_AUTO_RECOVER (default false)
    pub auto_recover: bool,

    /// Growth step of row storage.
    /// Env: SDDS_ROW_INCREMENT (default 100)
    pub row_increment: usize,

    /// Stride of the on-stream row count in fixed-row-count mode.
    /// Env: SDDS_FIXED_ROW_INCREMENT (default 500)
    pub fixed_row_increment: u64,

    /// Maximum nesting of `&include` directives.
    /// Env: SDDS_MAX_INCLUDE_DEPTH (default 16)
    pub max_include_depth: usize,

    /// Take an advisory exclusive lock on files opened for writing.
    /// Env: SDDS_LOCK_ON_WRITE (default true)
    pub lock_on_write: bool,

    /// Optional sink receiving the message of every failed dataset operation.
    pub error_history: Option<ErrorHistory>,
}

impl Default for SddsConfig {
    fn default() -> Self {
        Self {
            output_byte_order: None,
            auto_recover: false,
            row_increment: DEFAULT_ROW_INCREMENT,
            fixed_row_increment: DEFAULT_FIXED_ROW_INCREMENT,
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
            lock_on_write: true,
            error_history: None,
        }
    }
}

impl SddsConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var(ENV_OUTPUT_ENDIANESS) {
            cfg.output_byte_order = ByteOrder::from_name(v.trim());
        }
        if let Some(on) = env_flag(ENV_AUTO_RECOVER) {
            cfg.auto_recover = on;
        }
        if let Some(n) = env_parse::<usize>(ENV_ROW_INCREMENT) {
            if n > 0 {
                cfg.row_increment = n;
            }
        }
        if let Some(n) = env_parse::<u64>(ENV_FIXED_ROW_INCREMENT) {
            if n > 0 {
                cfg.fixed_row_increment = n;
            }
        }
        if let Some(n) = env_parse::<usize>(ENV_MAX_INCLUDE_DEPTH) {
            cfg.max_include_depth = n;
        }
        if let Some(on) = env_flag(ENV_LOCK_ON_WRITE) {
            cfg.lock_on_write = on;
        }

        cfg
    }

    pub fn with_output_byte_order(mut self, order: Option<ByteOrder>) -> Self {
        self.output_byte_order = order;
        self
    }

    pub fn with_auto_recover(mut self, on: bool) -> Self {
        self.auto_recover = on;
        self
    }

    pub fn with_row_increment(mut self, n: usize) -> Self {
        self.row_increment = n.max(1);
        self
    }

    pub fn with_fixed_row_increment(mut self, n: u64) -> Self {
        self.fixed_row_increment = n.max(1);
        self
    }

    pub fn with_max_include_depth(mut self, n: usize) -> Self {
        self.max_include_depth = n;
        self
    }

    pub fn with_lock_on_write(mut self, on: bool) -> Self {
        self.lock_on_write = on;
        self
    }

    pub fn with_error_history(mut self, sink: Option<ErrorHistory>) -> Self {
        self.error_history = sink;
        self
    }

    pub fn build(self) -> Self {
        self
    }
}

impl fmt::Display for SddsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SddsConfig {{ \
             output_byte_order: {}, \
             auto_recover: {}, \
             row_increment: {}, \
             fixed_row_increment: {}, \
             max_include_depth: {}, \
             lock_on_write: {}, \
             error_history: {} \
             }}",
            self.output_byte_order
                .map(|o| o.name())
                .unwrap_or("native"),
            self.auto_recover,
            self.row_increment,
            self.fixed_row_increment,
            self.max_include_depth,
            self.lock_on_write,
            if self.error_history.is_some() { "attached" } else { "none" },
        )
    }
}

/// Builder that carries a config into the dataset constructors.
#[derive(Clone, Debug)]
pub struct DatasetBuilder {
    cfg: SddsConfig,
}

impl Default for DatasetBuilder {
    fn default() -> Self {
        // Start from env, then allow overrides.
        Self {
            cfg: SddsConfig::from_env(),
        }
    }
}

impl DatasetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a clean default (without reading env).
    pub fn from_default() -> Self {
        Self {
            cfg: SddsConfig::default(),
        }
    }

    pub fn output_byte_order(mut self, order: Option<ByteOrder>) -> Self {
        self.cfg.output_byte_order = order;
        self
    }

    pub fn auto_recover(mut self, on: bool) -> Self {
        self.cfg.auto_recover = on;
        self
    }

    pub fn row_increment(mut self, n: usize) -> Self {
        self.cfg.row_increment = n.max(1);
        self
    }

    pub fn fixed_row_increment(mut self, n: u64) -> Self {
        self.cfg.fixed_row_increment = n.max(1);
        self
    }

    pub fn max_include_depth(mut self, n: usize) -> Self {
        self.cfg.max_include_depth = n;
        self
    }

    pub fn lock_on_write(mut self, on: bool) -> Self {
        self.cfg.lock_on_write = on;
        self
    }

    pub fn error_history(mut self, sink: ErrorHistory) -> Self {
        self.cfg.error_history = Some(sink);
        self
    }

    pub fn build(self) -> SddsConfig {
        self.cfg
    }

    pub fn open_read<P: AsRef<Path>>(self, path: P) -> Result<Dataset> {
        Dataset::open_read_with(path, self.cfg)
    }

    pub fn create<P: AsRef<Path>>(self, path: P, encoding: Encoding) -> Result<Dataset> {
        Dataset::create_with(path, encoding, self.cfg)
    }

    pub fn open_append<P: AsRef<Path>>(self, path: P) -> Result<Dataset> {
        Dataset::open_append_with(path, self.cfg)
    }

    pub fn open_append_to_page<P: AsRef<Path>>(self, path: P) -> Result<Dataset> {
        Dataset::open_append_to_page_with(path, self.cfg)
    }
}
