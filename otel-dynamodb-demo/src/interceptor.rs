//! AWS SDK interceptor that ties DynamoDB calls into the active trace.
//!
//! Two things happen for every call made through an instrumented client:
//!
//! - Before execution, the call span is tagged with the DynamoDB operation
//!   name and the table(s) the request targets. The call span is the one
//!   installed by [`with_call_span`], or the current span outside of it.
//! - Around transmission, a client HTTP span is opened unless the request is
//!   telemetry traffic according to [`OutgoingCallFilter`].

use std::collections::HashMap;
use std::future::Future;

use aws_sdk_dynamodb::operation::batch_get_item::BatchGetItemInput;
use aws_sdk_dynamodb::operation::batch_write_item::BatchWriteItemInput;
use aws_sdk_dynamodb::operation::delete_item::DeleteItemInput;
use aws_sdk_dynamodb::operation::describe_table::DescribeTableInput;
use aws_sdk_dynamodb::operation::get_item::GetItemInput;
use aws_sdk_dynamodb::operation::put_item::PutItemInput;
use aws_sdk_dynamodb::operation::query::QueryInput;
use aws_sdk_dynamodb::operation::scan::ScanInput;
use aws_sdk_dynamodb::operation::update_item::UpdateItemInput;
use aws_smithy_runtime_api::box_error::BoxError;
use aws_smithy_runtime_api::client::interceptors::Intercept;
use aws_smithy_runtime_api::client::interceptors::context::{
    BeforeDeserializationInterceptorContextRef, BeforeSerializationInterceptorContextRef,
    BeforeTransmitInterceptorContextRef, Input,
};
use aws_smithy_runtime_api::client::orchestrator::Metadata;
use aws_smithy_runtime_api::client::runtime_components::RuntimeComponents;
use aws_smithy_types::config_bag::{ConfigBag, Storable, StoreReplace};
use otel_demo_telemetry::{OutgoingCallFilter, host_and_path};
use tracing::{Instrument, Span, field, info_span, trace};
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Span attribute carrying the DynamoDB operation name.
pub const ATTR_DYNAMODB_OPERATION: &str = "aws.dynamodb.operation";
/// Span attribute carrying the target table name(s).
pub const ATTR_DB_NAME: &str = "db.name";

const DYNAMODB_SERVICE: &str = "dynamodb";

tokio::task_local! {
    static CALL_SPAN: Span;
}

/// Run `future` inside `span` and make `span` the target of the
/// interceptor's DynamoDB attributes.
///
/// The SDK opens its own debug-level spans around each operation; when those
/// are enabled they become the current span inside the interceptor.
pub async fn with_call_span<F: Future>(span: Span, future: F) -> F::Output {
    CALL_SPAN
        .scope(span.clone(), future.instrument(span))
        .await
}

/// Span the DynamoDB attributes are recorded on.
fn call_span() -> Span {
    CALL_SPAN
        .try_with(Span::clone)
        .unwrap_or_else(|_| Span::current())
}

/// Whether the SDK service name belongs to DynamoDB.
pub fn is_dynamodb_service(service: &str) -> bool {
    service.eq_ignore_ascii_case(DYNAMODB_SERVICE)
}

/// Table name(s) targeted by a DynamoDB request.
///
/// Single-table requests yield their `TableName`; batch requests yield the
/// sorted keys of their request map joined with `,`. Anything else yields
/// `None` and no attribute is set.
pub fn table_target(input: &Input) -> Option<String> {
    if let Some(i) = input.downcast_ref::<PutItemInput>() {
        return i.table_name().map(str::to_string);
    }
    if let Some(i) = input.downcast_ref::<GetItemInput>() {
        return i.table_name().map(str::to_string);
    }
    if let Some(i) = input.downcast_ref::<ScanInput>() {
        return i.table_name().map(str::to_string);
    }
    if let Some(i) = input.downcast_ref::<QueryInput>() {
        return i.table_name().map(str::to_string);
    }
    if let Some(i) = input.downcast_ref::<UpdateItemInput>() {
        return i.table_name().map(str::to_string);
    }
    if let Some(i) = input.downcast_ref::<DeleteItemInput>() {
        return i.table_name().map(str::to_string);
    }
    if let Some(i) = input.downcast_ref::<DescribeTableInput>() {
        return i.table_name().map(str::to_string);
    }
    if let Some(i) = input.downcast_ref::<BatchWriteItemInput>() {
        return i.request_items().and_then(join_table_names);
    }
    if let Some(i) = input.downcast_ref::<BatchGetItemInput>() {
        return i.request_items().and_then(join_table_names);
    }
    None
}

/// Sorted, comma-joined keys of a batch request map.
pub fn join_table_names<V>(request_items: &HashMap<String, V>) -> Option<String> {
    if request_items.is_empty() {
        return None;
    }
    let mut names: Vec<&str> = request_items.keys().map(String::as_str).collect();
    names.sort_unstable();
    Some(names.join(","))
}

/// Client HTTP span kept in the interceptor state between transmit hooks.
#[derive(Debug, Clone)]
struct HttpCallSpan(Span);

impl Storable for HttpCallSpan {
    type Storer = StoreReplace<Self>;
}

/// Interceptor registered on the DynamoDB client.
#[derive(Debug, Clone)]
pub struct StorageCallInterceptor {
    filter: OutgoingCallFilter,
}

impl StorageCallInterceptor {
    pub fn new(filter: OutgoingCallFilter) -> Self {
        Self { filter }
    }
}

impl Intercept for StorageCallInterceptor {
    fn name(&self) -> &'static str {
        "StorageCallInterceptor"
    }

    fn read_before_execution(
        &self,
        context: &BeforeSerializationInterceptorContextRef<'_>,
        cfg: &mut ConfigBag,
    ) -> Result<(), BoxError> {
        let Some(metadata) = cfg.load::<Metadata>() else {
            return Ok(());
        };
        if !is_dynamodb_service(metadata.service()) {
            return Ok(());
        }

        let span = call_span();
        span.set_attribute(ATTR_DYNAMODB_OPERATION, metadata.name().to_string());
        if let Some(tables) = table_target(context.input()) {
            span.set_attribute(ATTR_DB_NAME, tables);
        }

        Ok(())
    }

    fn read_before_transmit(
        &self,
        context: &BeforeTransmitInterceptorContextRef<'_>,
        _runtime_components: &RuntimeComponents,
        cfg: &mut ConfigBag,
    ) -> Result<(), BoxError> {
        let request = context.request();
        let uri = request.uri();

        if self.filter.should_ignore_uri(uri) {
            trace!(uri, "Skipping telemetry request");
            return Ok(());
        }

        let (host, path) = host_and_path(uri).unwrap_or_default();
        let method = request.method();
        let span = info_span!(
            "http.client",
            otel.name = %format!("{} {}", method, host),
            otel.kind = "client",
            http.request.method = %method,
            server.address = %host,
            url.path = %path,
            http.response.status_code = field::Empty,
        );
        cfg.interceptor_state().store_put(HttpCallSpan(span));

        Ok(())
    }

    fn read_after_transmit(
        &self,
        context: &BeforeDeserializationInterceptorContextRef<'_>,
        _runtime_components: &RuntimeComponents,
        cfg: &mut ConfigBag,
    ) -> Result<(), BoxError> {
        if let Some(HttpCallSpan(span)) = cfg.load::<HttpCallSpan>() {
            span.record(
                "http.response.status_code",
                context.response().status().as_u16(),
            );
        }
        // Dropping the stored span closes it.
        cfg.interceptor_state().unset::<HttpCallSpan>();

        Ok(())
    }
}
