use encore_flow::nats::NatsTriggerBus;
use encore_flow::{ActionDispatcher, Clock, Collaborators, Engine, SystemClock};
use encore_integration::{HttpEmailSender, MailchimpAudienceSync};
use encore_scheduler::{ResumeScheduler, WakeupStore, WakeupSuspender};
use encore_worker::config::WorkerConfig;
use encore_worker::db::{
    PgAssetResolver, PgContactStore, PgGraphStore, PgOrderLedger, PgRunLedger, PgTemplateStore,
    PgWakeupStore,
};
use encore_worker::error::WorkerError;
use encore_worker::intake::TriggerIntake;
use rootcause::Report;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(error) = run().await {
        tracing::error!(%error, "worker failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<WorkerError>> {
    // Load configuration from environment
    let config = WorkerConfig::from_env().map_err(|e| WorkerError::Config {
        details: e.to_string(),
    })?;
    tracing::info!("Loaded configuration");

    let db_pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .map_err(|e| WorkerError::Database {
            details: e.to_string(),
        })?;

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .map_err(|e| WorkerError::Database {
            details: e.to_string(),
        })?;

    let email = HttpEmailSender::new(&config.email).map_err(|e| WorkerError::Provider {
        details: e.to_string(),
    })?;
    let audiences =
        MailchimpAudienceSync::new(&config.mailchimp).map_err(|e| WorkerError::Provider {
            details: e.to_string(),
        })?;

    let dispatcher = ActionDispatcher::new(
        Collaborators {
            contacts: Arc::new(PgContactStore::new(db_pool.clone())),
            templates: Arc::new(PgTemplateStore::new(db_pool.clone())),
            orders: Arc::new(PgOrderLedger::new(db_pool.clone())),
            email: Arc::new(email),
            assets: Arc::new(PgAssetResolver::new(db_pool.clone())),
            audiences: Arc::new(audiences),
        },
        config.tracking,
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let wakeups: Arc<dyn WakeupStore> = Arc::new(PgWakeupStore::new(db_pool.clone()));
    let engine = Engine::new(
        Arc::new(PgGraphStore::new(db_pool.clone())),
        Arc::new(PgRunLedger::new(db_pool)),
        Arc::new(WakeupSuspender::new(wakeups.clone())),
        dispatcher,
        clock.clone(),
        config.engine,
    );

    // Pick up runs left in flight by a previous process
    let recovered = engine
        .recover_active()
        .await
        .map_err(|e| WorkerError::Recovery {
            details: e.to_string(),
        })?;
    tracing::info!(recovered, "Recovered active runs");

    let bus = NatsTriggerBus::connect(config.nats)
        .await
        .map_err(|e| WorkerError::Bus {
            details: e.to_string(),
        })?;
    let subscription = bus.subscribe().await.map_err(|e| WorkerError::Bus {
        details: e.to_string(),
    })?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = ResumeScheduler::new(
        wakeups,
        Arc::new(engine.clone()),
        clock,
        config.scheduler,
    );
    let scheduler_shutdown = shutdown_rx.clone();
    let scheduler_task = tokio::spawn(async move { scheduler.run(scheduler_shutdown).await });

    let intake = TriggerIntake::new(Arc::new(engine), config.intake);
    let intake_task = tokio::spawn(intake.run(subscription, shutdown_rx));

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
    let _ = shutdown_tx.send(true);

    for (name, task) in [("scheduler", scheduler_task), ("intake", intake_task)] {
        if let Err(e) = task.await {
            tracing::warn!(task = name, error = %e, "Task ended abnormally");
        }
    }

    Ok(())
}
