//! JSON-lines span export with size-capped rotation.
//!
//! Finished spans are written one per line as compact JSON objects. When the
//! file grows past its size limit it is renamed to `<file>.1`, replacing any
//! previous backup, and a fresh file is started.

use futures_util::future::BoxFuture;
use opentelemetry::trace::{SpanId, Status, TraceError};
use opentelemetry_sdk::export::trace::{ExportResult, SpanData, SpanExporter};
use opentelemetry_sdk::resource::Resource;
use opentelemetry_sdk::trace::TracerProvider;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Default size limit of the span file (10 MB).
pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// Append-only line writer keeping a single rotated backup.
pub struct SpanLog {
    path: PathBuf,
    max_bytes: u64,
    file: Mutex<Option<File>>,
}

impl SpanLog {
    pub const fn new(path: PathBuf) -> Self {
        Self::with_limit(path, DEFAULT_MAX_BYTES)
    }

    pub const fn with_limit(path: PathBuf, max_bytes: u64) -> Self {
        Self {
            path,
            max_bytes,
            file: Mutex::new(None),
        }
    }

    /// Path of the rotated backup.
    #[must_use]
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".1");
        PathBuf::from(name)
    }

    /// Appends one line, rotating first if the file is over its limit.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be rotated, opened or written.
    pub fn write_line(&self, line: &str) -> io::Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("span log poisoned: {e}")))?;

        if fs::metadata(&self.path).is_ok_and(|m| m.len() > self.max_bytes) {
            *file = None;
            fs::rename(&self.path, self.backup_path())?;
        }

        if file.is_none() {
            *file = Some(OpenOptions::new().create(true).append(true).open(&self.path)?);
        }
        let handle = file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "span log not open"))?;

        writeln!(handle, "{line}")?;
        handle.flush()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for SpanLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpanLog")
            .field("path", &self.path)
            .field("max_bytes", &self.max_bytes)
            .finish_non_exhaustive()
    }
}

/// One exported span.
#[derive(Debug, Serialize)]
struct SpanRecord<'a> {
    service: &'a str,
    trace_id: String,
    span_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_span_id: Option<String>,
    name: &'a str,
    start_unix_nanos: u64,
    duration_micros: u64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn unix_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

fn attribute_value(value: &opentelemetry::Value) -> serde_json::Value {
    use opentelemetry::Value;

    match value {
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::I64(i) => serde_json::Value::from(*i),
        Value::F64(f) => serde_json::Number::from_f64(*f)
            .map_or_else(|| serde_json::Value::String(f.to_string()), serde_json::Value::Number),
        Value::String(s) => serde_json::Value::String(s.to_string()),
        Value::Array(_) => serde_json::Value::String(value.to_string()),
    }
}

/// Span exporter writing [`SpanRecord`] lines to a [`SpanLog`].
struct JsonLinesExporter {
    log: SpanLog,
    service: String,
    is_shutdown: AtomicBool,
}

impl JsonLinesExporter {
    fn record<'a>(&'a self, span: &'a SpanData) -> SpanRecord<'a> {
        let duration = span
            .end_time
            .duration_since(span.start_time)
            .unwrap_or_default();

        SpanRecord {
            service: &self.service,
            trace_id: format!("{:032x}", span.span_context.trace_id()),
            span_id: format!("{:016x}", span.span_context.span_id()),
            parent_span_id: (span.parent_span_id != SpanId::INVALID)
                .then(|| format!("{:016x}", span.parent_span_id)),
            name: &span.name,
            start_unix_nanos: unix_nanos(span.start_time),
            duration_micros: u64::try_from(duration.as_micros()).unwrap_or(u64::MAX),
            attributes: span
                .attributes
                .iter()
                .map(|kv| (kv.key.to_string(), attribute_value(&kv.value)))
                .collect(),
            error: match &span.status {
                Status::Error { description } => Some(description.to_string()),
                Status::Ok | Status::Unset => None,
            },
        }
    }
}

impl SpanExporter for JsonLinesExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        if self.is_shutdown.load(Ordering::SeqCst) {
            return Box::pin(std::future::ready(Err(TraceError::from(
                "span exporter is shut down",
            ))));
        }

        let result = batch.iter().try_for_each(|span| {
            let line = serde_json::to_string(&self.record(span))
                .map_err(|e| TraceError::from(e.to_string()))?;
            self.log
                .write_line(&line)
                .map_err(|e| TraceError::from(e.to_string()))
        });
        Box::pin(std::future::ready(result))
    }

    fn shutdown(&mut self) {
        self.is_shutdown.store(true, Ordering::SeqCst);
    }

    fn set_resource(&mut self, resource: &Resource) {
        if let Some(name) = resource.get(opentelemetry::Key::new("service.name")) {
            self.service = name.to_string();
        }
    }
}

impl std::fmt::Debug for JsonLinesExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesExporter")
            .field("log", &self.log)
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

/// Builds a tracer provider exporting every finished span to `file_path`.
pub fn create_tracer_provider(file_path: PathBuf, resource: Resource) -> TracerProvider {
    let service = resource
        .get(opentelemetry::Key::new("service.name"))
        .map_or_else(|| "molonari".to_string(), |v| v.to_string());
    let exporter = JsonLinesExporter {
        log: SpanLog::new(file_path),
        service,
        is_shutdown: AtomicBool::new(false),
    };

    TracerProvider::builder()
        .with_config(opentelemetry_sdk::trace::Config::default().with_resource(resource))
        .with_simple_exporter(exporter)
        .build()
}
