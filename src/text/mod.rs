//! text — token/text utilities shared by the header codec and the text page codec.
//!
//! - escape.rs — cell escaping (`\!`, `\\`, `\"`, `\NNN`) and quoting.
//! - token.rs  — quote/escape-aware tokenizer, comment stripping, fixed-width cursor.
//! - printf.rs — printf-style value formatting and format verification.

pub mod escape;
pub mod printf;
pub mod token;

pub use escape::{encode_token, escape, try_unescape, unescape};
pub use printf::{format_value, verify_format, FormatSpec};
pub use token::{is_blank_or_comment, split_tokens, strip_comment, LineCursor};
