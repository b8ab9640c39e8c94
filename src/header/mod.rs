//! header — Layout <-> declarative header text.
//!
//! Layout of a header:
//! - `SDDS<version>`
//! - `!# big-endian` / `!# little-endian` / `!# fixed-rowcount` flag lines
//!   (written for versions < 3; accepted anywhere)
//! - `&description`, `&parameter`, `&array`, `&column`, `&associate` (ignored),
//!   `&include filename=...` (inlined, depth-limited)
//! - exactly one terminating `&data` section
//!
//! Submodules:
//! - namelist.rs — section scanner and formatter.
//! - reader.rs   — `read_header` with include stack and flag merging.
//! - writer.rs   — `write_header` with minimal version selection.

pub mod namelist;
pub mod reader;
pub mod writer;

pub use reader::read_header;
pub use writer::{render_header, write_header};
