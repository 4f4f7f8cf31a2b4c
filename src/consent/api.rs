//! JSON management API for templates, clients and submissions.

use actix_web::{web, HttpResponse, Responder};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::consent::form::{MAX_EMAIL_LEN, MAX_NAME_LEN, MAX_PHONE_LEN};
use crate::consent::model::{
    is_valid_slug, slugify, Client, ConsentTemplate, CreateClientRequest, CreateTemplateRequest,
    Submission, MAX_TITLE_LEN,
};
use crate::consent::validation::{
    validate_email_optional, validate_max_len, validate_required, ValidationError,
    ValidationErrors,
};
use crate::db::StoreError;
use crate::document::GenerationOutcome;
use crate::{AppState, ErrorResponse};

fn store_error(e: StoreError) -> HttpResponse {
    match e {
        StoreError::NotFound(what) => {
            HttpResponse::NotFound().json(ErrorResponse::not_found(&format!("{} not found", what)))
        }
        StoreError::Conflict(message) => {
            HttpResponse::Conflict().json(ErrorResponse::conflict(&message))
        }
        StoreError::Protected(message) => {
            HttpResponse::Conflict().json(ErrorResponse::new("Protected", &message))
        }
        StoreError::Backend(message) => {
            log::error!("Store failure: {}", message);
            HttpResponse::InternalServerError()
                .json(ErrorResponse::internal_error("Database operation failed"))
        }
    }
}

fn invalid(errors: &ValidationErrors) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse::bad_request(&errors.to_string()))
}

#[derive(Serialize, ToSchema)]
pub struct RegenerateResponse {
    /// `generated`, `exhausted` or `failed`.
    #[schema(example = "generated")]
    pub outcome: String,
    pub engine: Option<String>,
    /// Storage key of the document, when one exists.
    pub document: Option<String>,
    pub document_url: Option<String>,
}

// ============================================================================
// Templates
// ============================================================================

#[utoipa::path(
    context_path = "/api",
    tag = "Consent Templates",
    get,
    path = "/templates",
    responses(
        (status = 200, description = "All consent templates, newest first", body = [ConsentTemplate])
    )
)]
pub async fn list_templates(state: web::Data<AppState>) -> impl Responder {
    match state.templates().await {
        Ok(templates) => HttpResponse::Ok().json(templates),
        Err(e) => store_error(e),
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Consent Templates",
    post,
    path = "/templates",
    request_body = CreateTemplateRequest,
    responses(
        (status = 201, description = "Template created", body = ConsentTemplate),
        (status = 400, description = "Invalid title or slug", body = ErrorResponse),
        (status = 409, description = "Slug already taken", body = ErrorResponse)
    )
)]
pub async fn create_template(
    state: web::Data<AppState>,
    req: web::Json<CreateTemplateRequest>,
) -> impl Responder {
    let req = req.into_inner();
    let mut errors = ValidationErrors::new();
    if validate_required(&req.title, "title", &mut errors) {
        validate_max_len(req.title.trim(), "title", MAX_TITLE_LEN, &mut errors);
    }

    let slug = match req.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(slug) => slug.to_string(),
        None => slugify(&req.title),
    };
    if !is_valid_slug(&slug) {
        errors.add(ValidationError::new(
            "slug",
            "Enter a valid slug of at most 50 lowercase letters, numbers, underscores or hyphens.",
        ));
    }
    if let Err(errors) = errors.into_result() {
        return invalid(&errors);
    }

    let template = ConsentTemplate::new(slug, req.title.trim().to_string(), req.body);
    match state.store.insert_template(&template).await {
        Ok(()) => {
            state.invalidate_templates();
            log::info!("Template '{}' created", template.slug);
            HttpResponse::Created().json(template)
        }
        Err(e) => store_error(e),
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Consent Templates",
    get,
    path = "/templates/{slug}",
    params(
        ("slug" = String, Path, description = "Template slug")
    ),
    responses(
        (status = 200, description = "Template found", body = ConsentTemplate),
        (status = 404, description = "Template not found", body = ErrorResponse)
    )
)]
pub async fn get_template(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let slug = path.into_inner();
    match state.store.get_template_by_slug(&slug).await {
        Ok(Some(template)) => HttpResponse::Ok().json(template),
        Ok(None) => store_error(StoreError::NotFound(format!("Template '{}'", slug))),
        Err(e) => store_error(e),
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Consent Templates",
    delete,
    path = "/templates/{slug}",
    params(
        ("slug" = String, Path, description = "Template slug")
    ),
    responses(
        (status = 204, description = "Template deleted"),
        (status = 404, description = "Template not found", body = ErrorResponse),
        (status = 409, description = "Template still has submissions", body = ErrorResponse)
    )
)]
pub async fn delete_template(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let slug = path.into_inner();
    let template = match state.store.get_template_by_slug(&slug).await {
        Ok(Some(template)) => template,
        Ok(None) => return store_error(StoreError::NotFound(format!("Template '{}'", slug))),
        Err(e) => return store_error(e),
    };

    match state.store.delete_template(&template.id).await {
        Ok(()) => {
            state.invalidate_templates();
            log::info!("Template '{}' deleted", slug);
            HttpResponse::NoContent().finish()
        }
        Err(e) => store_error(e),
    }
}

// ============================================================================
// Clients
// ============================================================================

#[utoipa::path(
    context_path = "/api",
    tag = "Clients",
    get,
    path = "/clients",
    responses(
        (status = 200, description = "All saved clients", body = [Client])
    )
)]
pub async fn list_clients(state: web::Data<AppState>) -> impl Responder {
    match state.store.list_clients().await {
        Ok(clients) => HttpResponse::Ok().json(clients),
        Err(e) => store_error(e),
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Clients",
    post,
    path = "/clients",
    request_body = CreateClientRequest,
    responses(
        (status = 201, description = "Client created", body = Client),
        (status = 400, description = "Invalid client", body = ErrorResponse)
    )
)]
pub async fn create_client(
    state: web::Data<AppState>,
    req: web::Json<CreateClientRequest>,
) -> impl Responder {
    let req = req.into_inner();
    let mut errors = ValidationErrors::new();
    if validate_required(&req.full_name, "full_name", &mut errors) {
        validate_max_len(req.full_name.trim(), "full_name", MAX_NAME_LEN, &mut errors);
    }
    validate_email_optional(&req.email, "email", &mut errors);
    validate_max_len(req.email.trim(), "email", MAX_EMAIL_LEN, &mut errors);
    validate_max_len(req.phone.trim(), "phone", MAX_PHONE_LEN, &mut errors);
    if let Err(errors) = errors.into_result() {
        return invalid(&errors);
    }

    let client = Client::new(
        req.full_name.trim().to_string(),
        req.email.trim().to_string(),
        req.phone.trim().to_string(),
        req.notes,
    );
    match state.store.insert_client(&client).await {
        Ok(()) => HttpResponse::Created().json(client),
        Err(e) => store_error(e),
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Clients",
    get,
    path = "/clients/{id}",
    params(
        ("id" = Uuid, Path, description = "Client ID")
    ),
    responses(
        (status = 200, description = "Client found", body = Client),
        (status = 404, description = "Client not found", body = ErrorResponse)
    )
)]
pub async fn get_client(state: web::Data<AppState>, path: web::Path<Uuid>) -> impl Responder {
    let id = path.into_inner();
    match state.store.get_client(&id).await {
        Ok(Some(client)) => HttpResponse::Ok().json(client),
        Ok(None) => store_error(StoreError::NotFound(format!("Client {}", id))),
        Err(e) => store_error(e),
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Clients",
    delete,
    path = "/clients/{id}",
    params(
        ("id" = Uuid, Path, description = "Client ID")
    ),
    responses(
        (status = 204, description = "Client deleted, submissions kept without a client"),
        (status = 404, description = "Client not found", body = ErrorResponse)
    )
)]
pub async fn delete_client(state: web::Data<AppState>, path: web::Path<Uuid>) -> impl Responder {
    let id = path.into_inner();
    match state.store.delete_client(&id).await {
        Ok(()) => {
            log::info!("Client {} deleted", id);
            HttpResponse::NoContent().finish()
        }
        Err(e) => store_error(e),
    }
}

// ============================================================================
// Submissions
// ============================================================================

#[utoipa::path(
    context_path = "/api",
    tag = "Submissions",
    get,
    path = "/submissions",
    responses(
        (status = 200, description = "All submissions, newest first", body = [Submission])
    )
)]
pub async fn list_submissions(state: web::Data<AppState>) -> impl Responder {
    match state.store.list_submissions().await {
        Ok(submissions) => HttpResponse::Ok().json(submissions),
        Err(e) => store_error(e),
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Submissions",
    get,
    path = "/submissions/{id}",
    params(
        ("id" = Uuid, Path, description = "Submission ID")
    ),
    responses(
        (status = 200, description = "Submission found", body = Submission),
        (status = 404, description = "Submission not found", body = ErrorResponse)
    )
)]
pub async fn get_submission(state: web::Data<AppState>, path: web::Path<Uuid>) -> impl Responder {
    let id = path.into_inner();
    match state.store.get_submission(&id).await {
        Ok(Some(submission)) => HttpResponse::Ok().json(submission),
        Ok(None) => store_error(StoreError::NotFound(format!("Submission {}", id))),
        Err(e) => store_error(e),
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Submissions",
    delete,
    path = "/submissions/{id}",
    params(
        ("id" = Uuid, Path, description = "Submission ID")
    ),
    responses(
        (status = 204, description = "Submission and its stored files deleted"),
        (status = 404, description = "Submission not found", body = ErrorResponse)
    )
)]
pub async fn delete_submission(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> impl Responder {
    let id = path.into_inner();
    let submission = match state.store.delete_submission(&id).await {
        Ok(submission) => submission,
        Err(e) => return store_error(e),
    };

    for key in submission.artifact_keys() {
        if let Err(e) = state.storage.delete_file(&key).await {
            log::warn!("Failed to delete artifact {} of submission {}: {}", key, id, e);
        }
    }
    log::info!("Submission {} deleted", id);
    HttpResponse::NoContent().finish()
}

#[utoipa::path(
    context_path = "/api",
    tag = "Submissions",
    get,
    path = "/submissions/{id}/document",
    params(
        ("id" = Uuid, Path, description = "Submission ID")
    ),
    responses(
        (status = 200, description = "The generated consent document", content_type = "application/pdf"),
        (status = 404, description = "Submission or document not found", body = ErrorResponse)
    )
)]
pub async fn download_document(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> impl Responder {
    let id = path.into_inner();
    let key = match state.store.get_submission(&id).await {
        Ok(Some(Submission {
            document: Some(key),
            ..
        })) => key,
        Ok(Some(_)) => {
            return HttpResponse::NotFound().json(ErrorResponse::not_found(&format!(
                "Submission {} has no document",
                id
            )))
        }
        Ok(None) => return store_error(StoreError::NotFound(format!("Submission {}", id))),
        Err(e) => return store_error(e),
    };

    match state.storage.download_file(&key).await {
        Ok(bytes) => {
            let mime = mime_guess::from_path(&key).first_or_octet_stream();
            let filename = key.rsplit('/').next().unwrap_or(key.as_str());
            HttpResponse::Ok()
                .content_type(mime.as_ref())
                .insert_header((
                    "Content-Disposition",
                    format!("attachment; filename=\"{}\"", filename),
                ))
                .body(bytes)
        }
        Err(e) => {
            log::error!("Document {} of submission {} unreadable: {}", key, id, e);
            HttpResponse::NotFound().json(ErrorResponse::not_found(&format!(
                "Document for submission {} not found",
                id
            )))
        }
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Submissions",
    post,
    path = "/submissions/{id}/document",
    params(
        ("id" = Uuid, Path, description = "Submission ID")
    ),
    responses(
        (status = 200, description = "Generation ran; see outcome", body = RegenerateResponse),
        (status = 404, description = "Submission not found", body = ErrorResponse)
    )
)]
pub async fn regenerate_document(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> impl Responder {
    let id = path.into_inner();
    let submission = match state.store.get_submission(&id).await {
        Ok(Some(submission)) => submission,
        Ok(None) => return store_error(StoreError::NotFound(format!("Submission {}", id))),
        Err(e) => return store_error(e),
    };

    let outcome = state
        .documents
        .generate(state.store.as_ref(), state.storage.as_ref(), &submission)
        .await;

    let label = outcome.label();
    let response = match outcome {
        GenerationOutcome::Generated { engine, key } => RegenerateResponse {
            outcome: label.to_string(),
            engine: Some(engine.to_string()),
            document_url: Some(state.storage.get_asset_url(&key)),
            document: Some(key),
        },
        // the previous document, if any, is still current
        GenerationOutcome::Exhausted | GenerationOutcome::Failed(_) => RegenerateResponse {
            outcome: label.to_string(),
            engine: None,
            document_url: submission
                .document
                .as_deref()
                .map(|key| state.storage.get_asset_url(key)),
            document: submission.document,
        },
    };
    HttpResponse::Ok().json(response)
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/templates")
            .route(web::get().to(list_templates))
            .route(web::post().to(create_template)),
    )
    .service(
        web::resource("/templates/{slug}")
            .route(web::get().to(get_template))
            .route(web::delete().to(delete_template)),
    )
    .service(
        web::resource("/clients")
            .route(web::get().to(list_clients))
            .route(web::post().to(create_client)),
    )
    .service(
        web::resource("/clients/{id}")
            .route(web::get().to(get_client))
            .route(web::delete().to(delete_client)),
    )
    .service(web::resource("/submissions").route(web::get().to(list_submissions)))
    .service(
        web::resource("/submissions/{id}")
            .route(web::get().to(get_submission))
            .route(web::delete().to(delete_submission)),
    )
    .service(
        web::resource("/submissions/{id}/document")
            .route(web::get().to(download_document))
            .route(web::post().to(regenerate_document)),
    );
}
