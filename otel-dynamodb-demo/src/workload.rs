//! DynamoDB sample workload: PutItem, GetItem and Scan.

use std::collections::HashMap;
use std::future::Future;

use aws_config::{BehaviorVersion, Region};
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::Utc;
use otel_demo_telemetry::OutgoingCallFilter;
use serde_json::Value;
use tracing::{Span, debug, error, info, info_span};

use crate::config::WorkloadConfig;
use crate::error::{DemoError, Result};
use crate::interceptor::{StorageCallInterceptor, with_call_span};
use crate::metrics::OperationMetrics;

const ITEM_MESSAGE: &str = "Hello from OTel demo";
const SCAN_LIMIT: i32 = 5;

/// One unit of work driven by the demo loop.
pub trait Workload {
    fn run_once(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Writes an item, reads it back and scans the table.
#[derive(Debug, Clone)]
pub struct DynamoDbWorkload {
    client: Client,
    table_name: String,
    region: String,
    metrics: OperationMetrics,
}

impl DynamoDbWorkload {
    /// Build a DynamoDB client for `config.region` with the trace
    /// interceptor installed.
    ///
    /// Credentials come from the default AWS provider chain.
    pub async fn connect(
        config: &WorkloadConfig,
        filter: OutgoingCallFilter,
        metrics: OperationMetrics,
    ) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let dynamo_config = aws_sdk_dynamodb::config::Builder::from(&sdk_config)
            .interceptor(StorageCallInterceptor::new(filter))
            .build();

        Self::new(
            Client::from_conf(dynamo_config),
            config.table_name.clone(),
            config.region.clone(),
            metrics,
        )
    }

    pub fn new(
        client: Client,
        table_name: String,
        region: String,
        metrics: OperationMetrics,
    ) -> Self {
        Self {
            client,
            table_name,
            region,
            metrics,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Run Put, Get and Scan once.
    pub async fn run_demo(&self) -> Result<()> {
        info!(
            table = %self.table_name,
            region = %self.region,
            "DynamoDB demo (OpenTelemetry instrumented)"
        );

        let id = format!("item-{}", Utc::now().timestamp_millis());
        debug!(id = %id, "Generated item id");

        let result = self.exercise(&id).await;

        if let Err(e) = &result {
            error!(error = %e, "DynamoDB error");
            if e.is_resource_not_found() {
                info!(
                    "Create a table named \"{}\" with partition key \"id\" (String) or set DYNAMODB_TABLE.",
                    self.table_name
                );
            }
        } else {
            info!("Done. Check your OTLP backend for DynamoDB spans.");
        }

        result
    }

    async fn exercise(&self, id: &str) -> Result<()> {
        self.put_item(id).await?;
        self.get_item(id).await?;
        self.scan().await
    }

    async fn put_item(&self, id: &str) -> Result<()> {
        info!("1. PutItem");
        let request = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .item("id", AttributeValue::S(id.to_string()))
            .item("message", AttributeValue::S(ITEM_MESSAGE.to_string()))
            .item("ts", AttributeValue::S(Utc::now().to_rfc3339()));

        with_call_span(
            self.call_span("PutItem"),
            self.metrics.record("PutItem", request.send()),
        )
        .await
        .map_err(|e| DemoError::dynamodb("PutItem", e))?;

        info!("   OK");
        Ok(())
    }

    async fn get_item(&self, id: &str) -> Result<()> {
        info!("2. GetItem");
        let request = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("id", AttributeValue::S(id.to_string()));

        let output = with_call_span(
            self.call_span("GetItem"),
            self.metrics.record("GetItem", request.send()),
        )
        .await
        .map_err(|e| DemoError::dynamodb("GetItem", e))?;

        match output.item() {
            Some(item) => {
                debug!(item = %item_to_json(item), "   Item");
                info!("   Item retrieved");
            }
            None => info!("   (no item found)"),
        }
        Ok(())
    }

    async fn scan(&self) -> Result<()> {
        info!("3. Scan (limit {})", SCAN_LIMIT);
        let request = self
            .client
            .scan()
            .table_name(&self.table_name)
            .limit(SCAN_LIMIT);

        let output = with_call_span(
            self.call_span("Scan"),
            self.metrics.record("Scan", request.send()),
        )
        .await
        .map_err(|e| DemoError::dynamodb("Scan", e))?;

        info!("   Scanned {} item(s)", output.count());
        let items = output.items();
        if items.is_empty() {
            debug!("   Items: (none)");
        } else {
            let rendered = Value::Array(items.iter().map(item_to_json).collect());
            debug!(items = %rendered, "   Items");
        }
        Ok(())
    }

    fn call_span(&self, operation: &'static str) -> Span {
        info_span!(
            "dynamodb.call",
            otel.name = %format!("DynamoDB.{}", operation),
            otel.kind = "client",
            rpc.system = "aws-api",
            rpc.service = "DynamoDB",
            rpc.method = operation,
            cloud.region = %self.region,
        )
    }
}

impl Workload for DynamoDbWorkload {
    async fn run_once(&mut self) -> Result<()> {
        self.run_demo().await
    }
}

/// Render a DynamoDB item as plain JSON for log output.
pub fn item_to_json(item: &HashMap<String, AttributeValue>) -> Value {
    Value::Object(
        item.iter()
            .map(|(k, v)| (k.clone(), attribute_to_json(v)))
            .collect(),
    )
}

fn attribute_to_json(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => n
            .parse::<serde_json::Number>()
            .map(Value::Number)
            .unwrap_or_else(|_| Value::String(n.clone())),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::L(items) => Value::Array(items.iter().map(attribute_to_json).collect()),
        AttributeValue::M(map) => item_to_json(map),
        AttributeValue::Ss(set) | AttributeValue::Ns(set) => {
            Value::Array(set.iter().cloned().map(Value::String).collect())
        }
        other => Value::String(format!("{:?}", other)),
    }
}
