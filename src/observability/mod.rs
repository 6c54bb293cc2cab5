//! OpenTelemetry tracing with file-based span export.
//!
//! Spans produced by `tracing` macros flow through `tracing-opentelemetry`
//! into a custom exporter that appends one JSON object per finished span:
//!
//! ```text
//! tracing → OpenTelemetryLayer → TracerProvider → JsonLinesExporter → <data_dir>/molonari-spans.jsonl
//! ```
//!
//! Worker threads re-attach the submitting thread's context (see
//! [`TraceContext`](crate::worker::TraceContext)), so the spans of one
//! computation share a trace id from request to commit.
//!
//! # Configuration
//!
//! The filter comes from `Config::trace_level` in `EnvFilter` syntax, for
//! example `"info"` or `"molonari::storage=debug"`. Default: `"info"`.
//!
//! # Modules
//!
//! - `init`: Subscriber setup
//! - `exporter`: JSON-lines span exporter and rotating span log

pub mod exporter;
mod init;

pub use init::{init_tracing, span_file, SPAN_FILE_NAME};
