//! DynamoDB OpenTelemetry demo.

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use otel_demo_telemetry::{
    INSTRUMENTATION_SCOPE, OutgoingCallFilter, TelemetryProviders, init_tracing,
};
use otel_dynamodb_demo::{AppConfig, DemoArgs, DemoLoop, DynamoDbWorkload, OperationMetrics};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = DemoArgs::parse();

    // Load configuration: file, then environment, then flags
    let (mut config, env_warnings) = AppConfig::load(args.config.as_deref())?;
    args.apply_to(&mut config);
    config.validate()?;

    // Initialize OpenTelemetry before anything that emits telemetry
    let providers = TelemetryProviders::init(&config.telemetry)?;
    init_tracing(&config.logging, config.telemetry.debug_enabled, &providers)?;

    for warning in env_warnings.iter().chain(providers.startup_warnings()) {
        warn!("{}", warning);
    }

    info!("Starting DynamoDB OpenTelemetry demo");
    info!(
        service = %config.telemetry.service_name,
        traces = %providers.endpoints().traces,
        metrics = %providers.endpoints().metrics,
        logs = %providers.endpoints().logs,
        authenticated = config.telemetry.exporter_token.is_some(),
        "Telemetry configured"
    );

    let metrics = OperationMetrics::new(
        &providers.meter(INSTRUMENTATION_SCOPE),
        config.workload.table_name.clone(),
    );
    let filter = OutgoingCallFilter::new(&config.telemetry);
    let mut workload = DynamoDbWorkload::connect(&config.workload, filter, metrics).await;

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let mut demo = DemoLoop::new(&config.demo);
    let summary = demo.run(&mut workload, &providers, shutdown_rx).await;

    let flush_stats = providers.flush_stats();
    let export_stats = providers.export_stats();
    info!(
        iterations = summary.iterations,
        failed_iterations = summary.failures,
        flushes = flush_stats.flushes,
        failed_flushes = flush_stats.failed,
        timed_out_flushes = flush_stats.timed_out,
        spans_exported = export_stats.spans_exported,
        export_errors = export_stats.export_errors,
        stopped_by_signal = summary.stopped_by_signal,
        "Final statistics"
    );

    providers.shutdown().await;

    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM.
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
