//! sdds — self-describing tabular/array datasets.
//!
//! A text header declares parameters, columns, arrays and the data mode;
//! pages sharing that layout follow in ascii or binary form.

// Wire constants and shared helpers
pub mod consts;
pub mod error;
pub mod util;

// Schema and text primitives
pub mod types;  // src/types/{mod,value,f80}.rs
pub mod text;   // src/text/{mod,escape,token,printf}.rs
pub mod layout; // src/layout/{mod,defs,fields}.rs
pub mod header; // src/header/{mod,namelist,reader,writer}.rs

// Transport and page engine
pub mod stream; // src/stream/{mod,channel,plain,gzip,memory}.rs
pub mod page;   // src/page/{mod,buffer,table,array}.rs
pub mod codec;  // src/codec/{mod,rows,sparse,text,binary}.rs
pub mod dataset; // src/dataset/{mod,core,open,write,read,nav,units}.rs

// Ambient
pub mod config;
pub mod lock;
pub mod metrics;

pub use codec::{ReadOptions, Statistic};
pub use config::{DatasetBuilder, SddsConfig};
pub use dataset::{Access, Dataset, DatasetState, StreamAccess};
pub use error::{error_kind, ErrorHistory, ErrorKind, SddsError};
pub use layout::{
    ArrayDefinition, ColumnDefinition, DataMode, DefKind, Definition, Encoding, FieldValue, Layout,
    ParameterDefinition, RowCountPolicy,
};
pub use metrics::{snapshot as metrics_snapshot, MetricsSnapshot};
pub use page::{ArrayData, ColumnBuffer, PageData, RowTable};
pub use stream::{open_stream, ByteStream, GzipStream, MemoryStream, OpenMode, PlainStream, StreamKind};
pub use types::{ByteOrder, PrimitiveType, Value};
