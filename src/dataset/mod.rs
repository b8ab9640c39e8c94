//! dataset — the Dataset/Page state machine over one stream.
//!
//! Split by concern:
//! - core.rs  — `Dataset` struct, states, accessors, error tracking, Drop
//! - open.rs  — open_read / create / open_append / open_append_to_page / from_stream
//! - write.rs — layout finalisation, page building, write_page / update_page / flush_table
//! - read.rs  — read_page / read_page_with, auto-recovery
//! - nav.rs   — goto_page, disconnect / reconnect, terminate
//! - units.rs — units conversion (eager on the loaded page, deferred otherwise)

pub mod core;
pub mod nav;
pub mod open;
pub mod read;
pub mod units;
pub mod write;

pub use core::{Access, Dataset, DatasetState, StreamAccess};
