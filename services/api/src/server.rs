use crate::cli::ServeArgs;
use crate::infra::{
    seed_verifications, AppState, CompletenessOracle, InMemoryAssignments, InMemoryBatches,
    InMemoryResponses, InMemoryUploads, InMemoryVerifications, PrepaidBilling, SeededDirectory,
};
use crate::routes::with_verification_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

use credverify::config::AppConfig;
use credverify::error::AppError;
use credverify::telemetry;
use credverify::workflows::verification::{
    BulkVerificationService, ExternalVerificationClient, HttpVerificationTransport,
    ProcessingService, RetryPolicy, VerificationState,
};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let verifications = Arc::new(InMemoryVerifications::default());
    seed_verifications(&verifications);
    let directory = Arc::new(SeededDirectory::standard(
        config.verification.default_timeout(),
    ));

    let client = ExternalVerificationClient::new(HttpVerificationTransport::default())
        .with_policy(RetryPolicy::from_config(&config.verification))
        .with_default_timeout(config.verification.default_timeout());

    let processing = Arc::new(ProcessingService::new(
        Arc::new(InMemoryAssignments::default()),
        Arc::new(InMemoryResponses::default()),
        Arc::clone(&verifications),
        directory.clone(),
        client,
    ));

    let bulk = Arc::new(BulkVerificationService::new(
        Arc::new(InMemoryBatches::default()),
        Arc::clone(&verifications),
        directory,
        Arc::new(PrepaidBilling {
            ceiling_cents: 10_000_000,
        }),
        Arc::new(InMemoryUploads::default()),
        Arc::new(CompletenessOracle),
        config.verification.bulk_unit_fee_cents,
    ));

    let app = with_verification_routes(VerificationState { processing, bulk })
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "credential verification service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
