use actix_cors::Cors;
use actix_web::middleware::{Compress, DefaultHeaders};
use actix_web::{App, HttpServer};
use utoipa_swagger_ui::SwaggerUi;

mod auth;
mod challenge;
mod config;
mod error;
mod models;
mod openapi;
mod password;
mod repo;
mod routes;
mod service;
mod token;

use config::AuthConfig;
use openapi::ApiDoc;
use routes::AppState;
use service::AuthService;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Environment variables must be set externally (shell, systemd, Docker).
    // Load .env automatically only in debug builds.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let auth_config = AuthConfig::from_env();
    info!("Bootstrapping authgate server");

    if !auth_config.enabled {
        // Stub mode: answer the config probe, refuse everything else.
        // No store connection is made.
        info!("Authentication disabled; serving stub routes");
        return HttpServer::new(|| {
            App::new()
                .wrap(TracingLogger::default())
                .configure(routes::config_disabled)
        })
        .bind(("0.0.0.0", 8080))?
        .run()
        .await;
    }

    validate_env_vars();
    info!("Registration allowed: {}", auth_config.allow_registration);

    if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new().install() {
        tracing::warn!("prometheus exporter not started: {e}");
    }

    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    let repo = repo::inmem::InMemRepo::new();
    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    info!("Using in-memory repository backend");

    #[cfg(feature = "postgres-store")]
    let repo = {
        use sqlx::postgres::PgPoolOptions;
        let db_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for postgres-store");
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&db_url)
            .await
            .expect("Failed to create Pg pool");
        repo::pg::ensure_schema(&pool)
            .await
            .expect("schema bootstrap failed");
        info!("Using Postgres repository backend");
        repo::pg::PgRepo::new(pool)
    };

    let repo = Arc::new(repo);
    let service = AuthService::new(repo.clone(), auth_config.clone());
    let state = AppState { challenges: repo, service, config: auth_config };

    let openapi = ApiDoc::openapi();
    info!("OpenAPI spec generated");

    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                // local dev frontend ports
                .allowed_origin("http://localhost:5173")
                .allowed_origin("http://127.0.0.1:5173")
                .allow_any_header()
                .allowed_methods(["GET", "POST", "OPTIONS"])
                .supports_credentials()
                .max_age(3600);
            if let Ok(front) = std::env::var("FRONTEND_URL") {
                c = c.allowed_origin(&front);
            }
            c
        };

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY"))
                    .add(("Referrer-Policy", "no-referrer")),
            )
            .wrap(cors)
            .configure(routes::config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
            .app_data(actix_web::web::Data::new(state.clone()))
    })
    .bind(("0.0.0.0", 8080))?;

    info!("Listening on http://0.0.0.0:8080");

    server.run().await
}

/// The token secret has no safe default; refuse to serve with a weak one.
fn validate_env_vars() {
    match std::env::var("JWT_SECRET") {
        Err(_) => {
            eprintln!("Missing required environment variable: JWT_SECRET");
            std::process::exit(1);
        }
        Ok(secret) if secret.len() < 32 => {
            eprintln!("JWT_SECRET must be at least 32 characters long");
            std::process::exit(1);
        }
        Ok(_) => {}
    }
}
