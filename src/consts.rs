//! Wire-format constants shared by the header and page codecs.

// -------- Version line --------
pub const VERSION_PREFIX: &str = "SDDS";
pub const MIN_VERSION: u32 = 1;
pub const MAX_VERSION: u32 = 5;

// Feature thresholds used when choosing the version to write.
pub const VERSION_UNSIGNED_TYPES: u32 = 2;
pub const VERSION_COLUMN_MAJOR: u32 = 3;
pub const VERSION_DATA_FIELDS: u32 = 3; // endian=/fixed_row_count= live in &data from here on
pub const VERSION_INT64_TYPES: u32 = 4;
pub const VERSION_LONG_DOUBLE: u32 = 5;

// -------- Header sections --------
pub const SECTION_PREFIX: char = '&';
pub const SECTION_END: &str = "&end";
pub const TAG_DESCRIPTION: &str = "description";
pub const TAG_PARAMETER: &str = "parameter";
pub const TAG_COLUMN: &str = "column";
pub const TAG_ARRAY: &str = "array";
pub const TAG_ASSOCIATE: &str = "associate";
pub const TAG_INCLUDE: &str = "include";
pub const TAG_DATA: &str = "data";

// -------- Comments and out-of-band flags --------
pub const COMMENT_CHAR: char = '!';
pub const FLAG_PREFIX: &str = "!#";
pub const FLAG_BIG_ENDIAN: &str = "big-endian";
pub const FLAG_LITTLE_ENDIAN: &str = "little-endian";
pub const FLAG_FIXED_ROWCOUNT: &str = "fixed-rowcount";

/// Text page marker; followed by the 1-based page number.
pub const PAGE_MARKER: &str = "! page number";

// -------- Row counts --------
/// Width of the text row-count field; fixed so it can be patched in place.
pub const TEXT_ROW_COUNT_WIDTH: usize = 20;
/// Binary sentinel announcing a following 64-bit row count.
pub const ROW_COUNT_SENTINEL: i32 = i32::MIN;
/// Row counts above this are treated as a corrupt tail, not as data.
pub const MAX_PLAUSIBLE_ROWS: u64 = 1 << 40;
/// Elements reserved ahead of reading a declared count; past this,
/// buffers grow only as values actually arrive.
pub const READ_RESERVE_ELEMENTS: usize = 64 * 1024;
/// Bytes of a binary string value read per step.
pub const STRING_READ_CHUNK: usize = 64 * 1024;

// -------- Defaults --------
pub const DEFAULT_ROW_INCREMENT: usize = 100;
pub const DEFAULT_FIXED_ROW_INCREMENT: u64 = 500;
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 16;

/// Array elements written per physical line in text mode.
pub const TEXT_ARRAY_ITEMS_PER_LINE: usize = 6;

/// Characters allowed in definition names besides ASCII alphanumerics.
pub const NAME_EXTRA_CHARS: &str = "@:#+%-._$&/[]";

// -------- Environment --------
pub const ENV_OUTPUT_ENDIANESS: &str = "SDDS_OUTPUT_ENDIANESS";
pub const ENV_AUTO_RECOVER: &str = "SDDS_AUTO_RECOVER";
pub const ENV_ROW_INCREMENT: &str = "SDDS_ROW_INCREMENT";
pub const ENV_FIXED_ROW_INCREMENT: &str = "SDDS_FIXED_ROW_INCREMENT";
pub const ENV_MAX_INCLUDE_DEPTH: &str = "SDDS_MAX_INCLUDE_DEPTH";
pub const ENV_LOCK_ON_WRITE: &str = "SDDS_LOCK_ON_WRITE";
