// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `wacast serve` command implementation.
//!
//! Starts the dispatch runner, the periodic reconciliation pass and the
//! HTTP gateway over one SQLite database, and shuts all three down on
//! SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use wacast_config::WacastConfig;
use wacast_core::{EventSinks, WacastError};
use wacast_gateway::{AuthConfig, GatewayState, HealthState, ServerConfig, start_server};
use wacast_whatsapp::CloudApiClient;

use crate::engine::Engine;
use crate::shutdown;

/// Unmatched events re-applied per reconciliation pass.
const RECONCILE_LIMIT: usize = 500;

type RenderFn = Arc<dyn Fn() -> String + Send + Sync>;

/// Runs the engine until a shutdown signal arrives.
pub async fn run_serve(config: WacastConfig) -> Result<(), WacastError> {
    info!("starting wacast serve");

    let (sinks, prometheus_render) = init_metrics(EventSinks::new());

    let sender = Arc::new(CloudApiClient::new(&config.whatsapp)?);
    let engine = Engine::build(&config, sender, sinks).await?;

    if config.gateway.bearer_token.is_none() {
        warn!("gateway.bearer_token is not set; operator routes will reject every request");
    }

    let cancel = shutdown::install_signal_handler();

    let runner = engine.runner.clone();
    let runner_cancel = cancel.clone();
    let runner_task = tokio::spawn(async move {
        runner.run(runner_cancel).await;
    });

    let ingestor = engine.ingestor.clone();
    let reconcile_cancel = cancel.clone();
    let interval = Duration::from_secs(config.webhook.reconcile_interval_secs.max(1));
    let reconcile_task = tokio::spawn(async move {
        ingestor
            .run_reconciliation(interval, RECONCILE_LIMIT, reconcile_cancel)
            .await;
    });
    info!(
        interval_secs = interval.as_secs(),
        "reconciliation loop started"
    );

    let state = GatewayState {
        orchestrator: engine.orchestrator.clone(),
        ingestor: engine.ingestor.clone(),
        registry: engine.registry.clone(),
        rate: engine.rate.clone(),
        alerts: engine.storage.clone(),
        verify_token: config.whatsapp.verify_token.clone(),
        auth: AuthConfig {
            bearer_token: config.gateway.bearer_token.clone(),
        },
        health: HealthState {
            start_time: std::time::Instant::now(),
            prometheus_render,
        },
    };
    let server_config = ServerConfig {
        host: config.gateway.host.clone(),
        port: config.gateway.port,
    };

    let served = start_server(&server_config, state, cancel.clone()).await;
    if let Err(ref e) = served {
        error!(error = %e, "gateway stopped with an error");
    }
    cancel.cancel();

    if let Err(e) = runner_task.await {
        error!(error = %e, "dispatch runner task panicked");
    }
    if let Err(e) = reconcile_task.await {
        error!(error = %e, "reconciliation task panicked");
    }

    info!("wacast serve shutdown complete");
    served
}

#[cfg(feature = "prometheus")]
fn init_metrics(sinks: EventSinks) -> (EventSinks, Option<RenderFn>) {
    use wacast_prometheus::{PrometheusAdapter, PrometheusSink};

    match PrometheusAdapter::new() {
        Ok(adapter) => {
            let adapter = Arc::new(adapter);
            let render: RenderFn = Arc::new(move || adapter.render());
            (sinks.with(Arc::new(PrometheusSink)), Some(render))
        }
        Err(e) => {
            warn!(error = %e, "metrics disabled");
            (sinks, None)
        }
    }
}

#[cfg(not(feature = "prometheus"))]
fn init_metrics(sinks: EventSinks) -> (EventSinks, Option<RenderFn>) {
    (sinks, None)
}
