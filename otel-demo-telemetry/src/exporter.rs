//! Span exporter decorator that reports failed exports.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use opentelemetry_sdk::Resource;
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::trace::{SpanData, SpanExporter};
use parking_lot::RwLock;
use tracing::{trace, warn};

/// Log target used for export diagnostics. Events on this target are never
/// bridged back into the OTLP log pipeline.
pub const EXPORT_LOG_TARGET: &str = "otel_export";

/// Export outcome counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportStats {
    pub batches_exported: u64,
    pub spans_exported: u64,
    pub export_errors: u64,
}

/// Wraps a [`SpanExporter`] and logs every non-success export result.
///
/// The result is handed back to the batch processor unchanged; the
/// decorator only observes.
pub struct ReportingSpanExporter<E> {
    inner: E,
    stats: Arc<RwLock<ExportStats>>,
}

impl<E> ReportingSpanExporter<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            stats: Arc::new(RwLock::new(ExportStats::default())),
        }
    }

    /// Handle to the export counters, readable after the exporter has been
    /// moved into a span processor.
    pub fn stats_handle(&self) -> Arc<RwLock<ExportStats>> {
        self.stats.clone()
    }
}

// Only the counters are shown; the inner exporter may hold credentials.
impl<E> fmt::Debug for ReportingSpanExporter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportingSpanExporter")
            .field("stats", &*self.stats.read())
            .finish()
    }
}

impl<E: SpanExporter> SpanExporter for ReportingSpanExporter<E> {
    fn export(&self, batch: Vec<SpanData>) -> impl Future<Output = OTelSdkResult> + Send {
        let count = batch.len() as u64;
        async move {
            let result = self.inner.export(batch).await;

            let mut stats = self.stats.write();
            match &result {
                Ok(()) => {
                    stats.batches_exported += 1;
                    stats.spans_exported += count;
                    trace!(target: EXPORT_LOG_TARGET, spans = count, "Span batch exported");
                }
                Err(e) => {
                    stats.export_errors += 1;
                    warn!(
                        target: EXPORT_LOG_TARGET,
                        spans = count,
                        error = %e,
                        "Span export failed"
                    );
                }
            }

            result
        }
    }

    fn shutdown_with_timeout(&mut self, timeout: Duration) -> OTelSdkResult {
        self.inner.shutdown_with_timeout(timeout)
    }

    fn force_flush(&mut self) -> OTelSdkResult {
        self.inner.force_flush()
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.inner.set_resource(resource);
    }
}
