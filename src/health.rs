// Health check endpoint
use crate::search::{GeneratorState, SemanticSearchService};
use actix_web::{dev::ServerHandle, web, App, HttpResponse, HttpServer};
use serde_json::json;
use std::sync::Arc;
use tracing_actix_web::TracingLogger;

async fn health(service: web::Data<SemanticSearchService>) -> HttpResponse {
    let cache = service.cache();
    let generator = match service.generator_state() {
        GeneratorState::Uninitialized => "uninitialized",
        GeneratorState::Initializing => "initializing",
        GeneratorState::Ready => "ready",
    };

    // A failed check disables the cache; searches keep working without it.
    let cache_healthy = cache.health_check();

    HttpResponse::Ok().json(json!({
        "status": if cache_healthy { "healthy" } else { "degraded" },
        "service": crate::mcp::server::SERVER_NAME,
        "cache": {
            "healthy": cache_healthy,
            "available": cache.is_available(),
            "stats": cache.stats(),
        },
        "embedding_generator": generator,
    }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health));
}

/// Binds the health server and spawns it onto the current runtime.
pub fn spawn_health_server(
    service: Arc<SemanticSearchService>,
    host: &str,
    port: u16,
) -> std::io::Result<ServerHandle> {
    let data = web::Data::from(service);
    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(data.clone())
            .configure(configure)
    })
    .workers(1)
    .disable_signals()
    .bind((host, port))?
    .run();

    let handle = server.handle();
    tokio::spawn(async move {
        if let Err(e) = server.await {
            tracing::error!("Health server failed: {}", e);
        }
    });

    tracing::info!("Health check listening on http://{}:{}/health", host, port);
    Ok(handle)
}
