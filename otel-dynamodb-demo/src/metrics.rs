//! Metered operation wrapper.
//!
//! Every DynamoDB call goes through [`OperationMetrics::record`]. Successful
//! calls bump the operation counter, failed calls bump the error counter, and
//! both record their duration. All measurements are tagged with the
//! operation and table; failed durations also carry `error=true`.

use std::future::Future;
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Counter of successful operations.
pub const OPERATION_COUNT: &str = "dynamodb.operation.count";
/// Counter of failed operations.
pub const OPERATION_ERROR_COUNT: &str = "dynamodb.operation.error.count";
/// Histogram of operation latency in milliseconds.
pub const OPERATION_DURATION: &str = "dynamodb.operation.duration.ms";

pub const ATTR_OPERATION: &str = "operation";
pub const ATTR_TABLE: &str = "table";
pub const ATTR_ERROR: &str = "error";

/// Receives the outcome of each metered operation.
pub trait OperationObserver {
    fn on_success(&self, operation: &str, elapsed: Duration);
    fn on_error(&self, operation: &str, elapsed: Duration);
}

/// Await `action`, report its outcome to `observer` and hand the result back
/// unchanged.
///
/// Elapsed time is measured from just before the action is first polled
/// until it resolves, whether it succeeds or fails.
pub async fn record_operation<O, F, T, E>(observer: &O, operation: &str, action: F) -> Result<T, E>
where
    O: OperationObserver + ?Sized,
    F: Future<Output = Result<T, E>>,
{
    let start = Instant::now();
    let result = action.await;
    let elapsed = start.elapsed();

    match &result {
        Ok(_) => observer.on_success(operation, elapsed),
        Err(_) => observer.on_error(operation, elapsed),
    }

    result
}

/// DynamoDB operation instruments for one table.
#[derive(Debug, Clone)]
pub struct OperationMetrics {
    table: String,
    operations: Counter<u64>,
    errors: Counter<u64>,
    duration: Histogram<f64>,
}

impl OperationMetrics {
    /// Create the instruments on `meter`.
    pub fn new(meter: &Meter, table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            operations: meter
                .u64_counter(OPERATION_COUNT)
                .with_description("Number of DynamoDB operations")
                .build(),
            errors: meter
                .u64_counter(OPERATION_ERROR_COUNT)
                .with_description("Number of failed DynamoDB operations")
                .build(),
            duration: meter
                .f64_histogram(OPERATION_DURATION)
                .with_description("DynamoDB operation duration")
                .with_unit("ms")
                .build(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Run `action` as the DynamoDB operation `operation`.
    pub async fn record<F, T, E>(&self, operation: &str, action: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        record_operation(self, operation, action).await
    }

    fn attributes(&self, operation: &str) -> [KeyValue; 2] {
        [
            KeyValue::new(ATTR_OPERATION, operation.to_string()),
            KeyValue::new(ATTR_TABLE, self.table.clone()),
        ]
    }
}

impl OperationObserver for OperationMetrics {
    fn on_success(&self, operation: &str, elapsed: Duration) {
        let attributes = self.attributes(operation);
        self.operations.add(1, &attributes);
        self.duration
            .record(elapsed.as_secs_f64() * 1000.0, &attributes);
    }

    fn on_error(&self, operation: &str, elapsed: Duration) {
        let [operation, table] = self.attributes(operation);
        self.errors.add(1, &[operation.clone(), table.clone()]);
        self.duration.record(
            elapsed.as_secs_f64() * 1000.0,
            &[operation, table, KeyValue::new(ATTR_ERROR, true)],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::metrics::MeterProvider;
    use opentelemetry_sdk::metrics::data::{AggregatedMetrics, MetricData, ResourceMetrics};
    use opentelemetry_sdk::metrics::{InMemoryMetricExporter, PeriodicReader, SdkMeterProvider};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<(String, bool)>>,
    }

    impl OperationObserver for RecordingObserver {
        fn on_success(&self, operation: &str, _elapsed: Duration) {
            self.events.lock().push((operation.to_string(), true));
        }

        fn on_error(&self, operation: &str, _elapsed: Duration) {
            self.events.lock().push((operation.to_string(), false));
        }
    }

    #[derive(Debug, PartialEq)]
    struct Throttled(u32);

    #[tokio::test]
    async fn test_success_is_observed_and_returned() {
        let observer = RecordingObserver::default();

        let value: Result<&str, Throttled> =
            record_operation(&observer, "GetItem", async { Ok("item") }).await;

        assert_eq!(value, Ok("item"));
        assert_eq!(
            *observer.events.lock(),
            vec![("GetItem".to_string(), true)]
        );
    }

    #[tokio::test]
    async fn test_error_is_observed_and_rethrown_unchanged() {
        let observer = RecordingObserver::default();

        let value: Result<(), Throttled> =
            record_operation(&observer, "PutItem", async { Err(Throttled(400)) }).await;

        assert_eq!(value, Err(Throttled(400)));
        assert_eq!(
            *observer.events.lock(),
            vec![("PutItem".to_string(), false)]
        );
    }

    #[tokio::test]
    async fn test_elapsed_covers_the_action() {
        struct Elapsed(Mutex<Option<Duration>>);
        impl OperationObserver for Elapsed {
            fn on_success(&self, _operation: &str, elapsed: Duration) {
                *self.0.lock() = Some(elapsed);
            }
            fn on_error(&self, _operation: &str, _elapsed: Duration) {}
        }

        let observer = Elapsed(Mutex::new(None));
        let _: Result<(), ()> = record_operation(&observer, "Scan", async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(())
        })
        .await;

        let elapsed = observer.0.lock().unwrap();
        assert!(elapsed >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_operation_metrics_passes_results_through() {
        let provider = SdkMeterProvider::builder().build();
        let metrics = OperationMetrics::new(&provider.meter("test"), "items");

        assert_eq!(metrics.table(), "items");
        assert_eq!(metrics.record("Scan", async { Ok::<_, Throttled>(5) }).await, Ok(5));
        assert_eq!(
            metrics
                .record("Scan", async { Err::<u32, _>(Throttled(500)) })
                .await,
            Err(Throttled(500))
        );
    }

    /// Instruments backed by an in-memory exporter.
    fn in_memory_metrics() -> (OperationMetrics, SdkMeterProvider, InMemoryMetricExporter) {
        let exporter = InMemoryMetricExporter::default();
        let provider = SdkMeterProvider::builder()
            .with_reader(PeriodicReader::builder(exporter.clone()).build())
            .build();
        let metrics = OperationMetrics::new(&provider.meter("test"), "items");
        (metrics, provider, exporter)
    }

    fn collect(provider: &SdkMeterProvider, exporter: &InMemoryMetricExporter) -> ResourceMetrics {
        provider.force_flush().unwrap();
        exporter
            .get_finished_metrics()
            .unwrap()
            .pop()
            .expect("a collection should have been exported")
    }

    /// `(value, attributes)` of each data point of the counter `name`.
    fn counter_points(metrics: &ResourceMetrics, name: &str) -> Vec<(u64, Vec<KeyValue>)> {
        let mut points = Vec::new();
        for metric in metrics
            .scope_metrics()
            .flat_map(|scope| scope.metrics())
            .filter(|metric| metric.name() == name)
        {
            if let AggregatedMetrics::U64(MetricData::Sum(sum)) = metric.data() {
                for point in sum.data_points() {
                    points.push((point.value(), point.attributes().cloned().collect()));
                }
            }
        }
        points
    }

    /// `(count, attributes)` of each duration histogram data point.
    fn duration_points(metrics: &ResourceMetrics) -> Vec<(u64, Vec<KeyValue>)> {
        let mut points = Vec::new();
        for metric in metrics
            .scope_metrics()
            .flat_map(|scope| scope.metrics())
            .filter(|metric| metric.name() == OPERATION_DURATION)
        {
            if let AggregatedMetrics::F64(MetricData::Histogram(histogram)) = metric.data() {
                for point in histogram.data_points() {
                    points.push((point.count(), point.attributes().cloned().collect()));
                }
            }
        }
        points
    }

    fn has_attribute(attributes: &[KeyValue], key: &str, value: &str) -> bool {
        attributes
            .iter()
            .any(|kv| kv.key.as_str() == key && kv.value.as_str() == value)
    }

    #[tokio::test]
    async fn test_success_counts_operation_only() {
        let (metrics, provider, exporter) = in_memory_metrics();

        let _ = metrics.record("GetItem", async { Ok::<_, Throttled>(()) }).await;

        let collected = collect(&provider, &exporter);
        let operations = counter_points(&collected, OPERATION_COUNT);
        assert_eq!(operations.len(), 1);
        assert_eq!(operations[0].0, 1);
        assert!(has_attribute(&operations[0].1, ATTR_OPERATION, "GetItem"));
        assert!(has_attribute(&operations[0].1, ATTR_TABLE, "items"));

        assert!(counter_points(&collected, OPERATION_ERROR_COUNT).is_empty());

        let durations = duration_points(&collected);
        assert_eq!(durations.len(), 1);
        assert_eq!(durations[0].0, 1);
        assert!(!durations[0].1.iter().any(|kv| kv.key.as_str() == ATTR_ERROR));
    }

    #[tokio::test]
    async fn test_failure_counts_error_only_and_tags_duration() {
        let (metrics, provider, exporter) = in_memory_metrics();

        let _ = metrics
            .record("PutItem", async { Err::<(), _>(Throttled(400)) })
            .await;

        let collected = collect(&provider, &exporter);
        assert!(counter_points(&collected, OPERATION_COUNT).is_empty());

        let errors = counter_points(&collected, OPERATION_ERROR_COUNT);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, 1);
        assert!(has_attribute(&errors[0].1, ATTR_OPERATION, "PutItem"));
        assert!(!errors[0].1.iter().any(|kv| kv.key.as_str() == ATTR_ERROR));

        let durations = duration_points(&collected);
        assert_eq!(durations.len(), 1);
        assert!(has_attribute(&durations[0].1, ATTR_ERROR, "true"));
        assert!(has_attribute(&durations[0].1, ATTR_TABLE, "items"));
    }
}
