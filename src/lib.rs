//! Download a profile's posts as JSON sidecars and aggregate the sidecars into one CSV table.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod metadata;
pub mod source;
pub mod table;

pub use aggregate::{aggregate, AggregateOptions, AggregateReport, Aggregator, SkippedFile};
pub use error::{AggregateError, MalformedRecord, SourceError};
pub use metadata::PostMetadata;
pub use source::{ContentSource, DownloadOptions, DownloadReport, Downloader, JsonlPostSource, Post};
pub use table::ListFormat;
