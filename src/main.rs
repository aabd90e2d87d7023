//! Course enrollment service entry point.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use course_enrollment::adapters::http::{build_router, HttpSettings, PurchaseAppState, PurchaseSettings};
use course_enrollment::adapters::{
    MockPaymentGateway, PostgresBuyerDirectory, PostgresCourseCatalog, PostgresCourseRoster,
    PostgresPurchaseRepository, RazorpayGateway, ReconciliationSweep, StripeGateway,
    TracingInconsistencyReporter,
};
use course_enrollment::config::AppConfig;
use course_enrollment::domain::purchase::GatewayKind;
use course_enrollment::ports::{
    BuyerDirectory, CourseCatalog, CourseRoster, InconsistencyReporter, PaymentGateway,
    PurchaseRepository,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = AppConfig::load()?;
    init_tracing(&config);
    config.validate()?;

    info!(
        environment = ?config.server.environment,
        provider = %config.payment.provider,
        "Starting course enrollment service"
    );

    let pool = config
        .database
        .pool_options()
        .connect(&config.database.url)
        .await?;

    if config.database.run_migrations {
        info!("Running migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
    }

    let repository: Arc<dyn PurchaseRepository> =
        Arc::new(PostgresPurchaseRepository::new(pool.clone()));
    let catalog: Arc<dyn CourseCatalog> = Arc::new(
        PostgresCourseCatalog::new(pool.clone()).with_default_currency(config.payment.currency()?),
    );
    let buyers: Arc<dyn BuyerDirectory> = Arc::new(PostgresBuyerDirectory::new(pool.clone()));
    let roster: Arc<dyn CourseRoster> = Arc::new(PostgresCourseRoster::new(pool.clone()));
    let reporter: Arc<dyn InconsistencyReporter> = Arc::new(TracingInconsistencyReporter::new());

    let gateway: Arc<dyn PaymentGateway> = match config.payment.gateway_kind()? {
        GatewayKind::Stripe => Arc::new(StripeGateway::new(config.payment.stripe_config())),
        GatewayKind::Razorpay => Arc::new(RazorpayGateway::new(config.payment.razorpay_config())),
        GatewayKind::Mock => Arc::new(MockPaymentGateway::new()),
    };

    let reconciliation = &config.reconciliation;
    let state = PurchaseAppState::new(
        repository.clone(),
        catalog,
        buyers.clone(),
        roster.clone(),
        gateway,
        reporter,
        reconciliation.fanout_policy(),
        PurchaseSettings {
            gateway_timeout: config.payment.gateway_timeout(),
            fetch_retry: reconciliation.fetch_policy(),
            ledger_retry: reconciliation.ledger_policy(),
            refund_policy: reconciliation.refund_policy(),
        },
    );
    let fanout = state.fanout.clone();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweep_handle = if reconciliation.sweep_enabled {
        let sweep = ReconciliationSweep::new(
            repository,
            buyers,
            roster,
            fanout.clone(),
            reconciliation.sweep_config(),
        );
        Some(tokio::spawn(async move {
            if let Err(e) = sweep.run(shutdown_rx).await {
                error!(error = %e, "Reconciliation sweep stopped with error");
            }
        }))
    } else {
        None
    };

    let app = build_router(
        state,
        &HttpSettings {
            request_timeout: config.server.request_timeout(),
            cors_origins: config.server.cors_origins_list(),
        },
    );

    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the sweep, then let in-flight fan-out retries finish.
    let _ = shutdown_tx.send(true);
    if let Some(handle) = sweep_handle {
        let _ = handle.await;
    }
    info!(in_flight = fanout.in_flight(), "Draining enrollment fan-out");
    fanout.drain().await;

    info!("Shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    if config.is_production() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
