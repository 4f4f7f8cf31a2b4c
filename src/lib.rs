use actix_cors::Cors;
use actix_web::middleware::Compress;
use actix_web::{http::header, web, App, HttpServer};
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

pub mod config;
pub mod consent;
pub mod db;
pub mod document;
pub mod metrics;
pub mod storage;

#[cfg(test)]
mod test_support;

pub use crate::config::{AppConfig, StorageBackend};
pub use crate::db::AppState;

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_type: &str, message: &str) -> Self {
        Self {
            error: error_type.to_string(),
            message: message.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn not_found(message: &str) -> Self {
        Self::new("NotFound", message)
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new("BadRequest", message)
    }

    pub fn conflict(message: &str) -> Self {
        Self::new("Conflict", message)
    }

    pub fn internal_error(message: &str) -> Self {
        Self::new("InternalServerError", message)
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::consent::api::list_templates,
        crate::consent::api::create_template,
        crate::consent::api::get_template,
        crate::consent::api::delete_template,
        crate::consent::api::list_clients,
        crate::consent::api::create_client,
        crate::consent::api::get_client,
        crate::consent::api::delete_client,
        crate::consent::api::list_submissions,
        crate::consent::api::get_submission,
        crate::consent::api::delete_submission,
        crate::consent::api::download_document,
        crate::consent::api::regenerate_document
    ),
    components(
        schemas(
            consent::model::ConsentTemplate,
            consent::model::Client,
            consent::model::Submission,
            consent::model::CreateTemplateRequest,
            consent::model::CreateClientRequest,
            consent::api::RegenerateResponse,
            ErrorResponse,
        )
    ),
    tags(
        (name = "Consent Templates", description = "Consent template management."),
        (name = "Clients", description = "Saved client contacts."),
        (name = "Submissions", description = "Signed consent records and their documents.")
    ),
    servers(
        (url = "http://127.0.0.1:8080", description = "Local server")
    )
)]
pub struct ApiDoc;

/// Routes shared by the server and the integration tests: the JSON API
/// under `/api` and the HTML fill flow.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/api").configure(consent::api::config))
        .configure(consent::handlers::config);
}

pub async fn run() -> std::io::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }
    env_logger::init();

    let config = AppConfig::from_env();
    let app_state = match AppState::from_config(&config).await {
        Ok(state) => web::Data::new(state),
        Err(e) => {
            log::error!("Failed to initialise application state. Please check DATABASE_URL and the storage settings in .env. Error: {}", e);
            std::process::exit(1);
        }
    };

    let prometheus = metrics::middleware()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    // served directly only when artifacts live on local disk
    let media = match &config.storage {
        StorageBackend::Local(local) => {
            std::fs::create_dir_all(&local.root)?;
            Some((local.public_prefix.clone(), local.root.clone()))
        }
        StorageBackend::Supabase(_) => None,
    };

    log::info!(
        "Starting server at http://{} with document engines {:?}",
        config.bind_address,
        app_state.documents.engine_names()
    );

    HttpServer::new(move || {
        let app_state = app_state.clone();
        let prometheus = prometheus.clone();
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
            .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
            .max_age(3600);

        let mut app = App::new()
            .wrap(Compress::default())
            .wrap(prometheus)
            .wrap(cors)
            .app_data(app_state)
            .configure(configure)
            .route("/metrics/documents", web::get().to(metrics::document_metrics))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            );

        if let Some((prefix, root)) = &media {
            app = app.service(actix_files::Files::new(prefix, root));
        }
        app
    })
    .backlog(8192)
    .keep_alive(actix_web::http::KeepAlive::Os)
    .bind(&config.bind_address)?
    .run()
    .await
}
