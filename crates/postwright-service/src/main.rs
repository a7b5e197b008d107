use postwright_service::{
    DefaultAppState,
    config::Config,
    db,
    generation::GenerationService,
    jobs::{ImageJobRunner, ImageWorker, image_queue},
    repositories::SqlitePostRepository,
    routes::create_router,
    services::Clients,
    shutdown::{GracefulShutdownLayer, ShutdownState},
};
use std::sync::{Arc, Mutex};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("postwright_service=debug".parse().unwrap()),
        )
        .init();

    let config = Config::from_env().unwrap_or_else(|err| {
        error!(error = %err, "Invalid configuration");
        std::process::exit(1);
    });

    let connection = db::establish_connection(&config.database_url).unwrap_or_else(|err| {
        error!(database_url = %config.database_url, error = %err, "Failed to open database");
        std::process::exit(1);
    });

    info!(database_url = %config.database_url, "Connected to database");

    let clients = Clients::from_config(&config).unwrap_or_else(|err| {
        error!(error = %err, "Failed to build service clients");
        std::process::exit(1);
    });

    let posts = Arc::new(SqlitePostRepository::new(Arc::new(Mutex::new(connection))));
    let shutdown_state = ShutdownState::new();

    let (scheduler, jobs) = image_queue(config.job_queue_capacity, shutdown_state.clone());
    let worker = ImageWorker::new(
        jobs,
        ImageJobRunner::new(posts.clone(), clients.clone()),
        shutdown_state.clone(),
    );
    let worker = tokio::spawn(worker.run());

    let app_state = DefaultAppState::new(GenerationService::new(
        posts,
        clients,
        Arc::new(scheduler),
    ));

    let app = create_router()
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(GracefulShutdownLayer::new(shutdown_state.clone()))
                .layer(TimeoutLayer::new(config.request_timeout)),
        )
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .unwrap_or_else(|err| {
            error!(bind_address = %config.bind_address, error = %err, "Failed to bind to address");
            std::process::exit(1);
        });

    info!(bind_address = %config.bind_address, "Server running");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(shutdown_state));

    if let Err(err) = server.await {
        error!(error = %err, "Server error");
        std::process::exit(1);
    }

    if let Err(err) = worker.await {
        error!(error = %err, "Image worker panicked");
    }
    info!("Image worker drained");
}

async fn shutdown_signal(shutdown_state: ShutdownState) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
    let shutdown_completed = shutdown_state.completed();
    shutdown_state.start_shutdown();

    shutdown_completed.await;
    info!("Graceful shutdown completed - requests and running image jobs finished");
}
