use actix_web::{http::header, web, HttpResponse, Responder};
use serde::Deserialize;
use uuid::Uuid;

use crate::consent::builder::{resolve_client, submit, SubmitError};
use crate::consent::form::ConsentFormInput;
use crate::consent::model::ConsentTemplate;
use crate::consent::pages;
use crate::AppState;

/// Body limit for the fill form. The drawn signature arrives inline as a
/// base64 data URI, well past actix's 16 KiB urlencoded default.
pub const FORM_BODY_LIMIT: usize = 2 * 1024 * 1024;

#[derive(Debug, Default, Deserialize)]
pub struct FormQuery {
    pub client_id: Option<String>,
}

fn html(body: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body)
}

fn not_found(message: &str) -> HttpResponse {
    HttpResponse::NotFound()
        .content_type("text/html; charset=utf-8")
        .body(pages::not_found(message))
}

fn server_error() -> HttpResponse {
    HttpResponse::InternalServerError()
        .content_type("text/html; charset=utf-8")
        .body(pages::server_error())
}

fn form_action(slug: &str, query: &FormQuery) -> String {
    match query.client_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => format!("/form/{}?client_id={}", slug, id),
        None => format!("/form/{}", slug),
    }
}

async fn load_template(state: &AppState, slug: &str) -> Result<ConsentTemplate, HttpResponse> {
    match state.store.get_template_by_slug(slug).await {
        Ok(Some(template)) => Ok(template),
        Ok(None) => Err(not_found("This consent form does not exist.")),
        Err(e) => {
            log::error!("Failed to load template '{}': {}", slug, e);
            Err(server_error())
        }
    }
}

/// `GET /` - every available consent form.
pub async fn choose_template(state: web::Data<AppState>) -> impl Responder {
    match state.templates().await {
        Ok(templates) => html(pages::template_list(&templates)),
        Err(e) => {
            log::error!("Failed to list templates: {}", e);
            server_error()
        }
    }
}

/// `GET /form/{slug}` - blank form, pre-filled when `client_id` resolves.
pub async fn fill_form(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<FormQuery>,
) -> impl Responder {
    let slug = path.into_inner();
    let template = match load_template(&state, &slug).await {
        Ok(template) => template,
        Err(response) => return response,
    };

    let client = match resolve_client(state.store.as_ref(), query.client_id.as_deref()).await {
        Ok(client) => client,
        Err(e) => {
            log::error!("Failed to look up client: {}", e);
            return server_error();
        }
    };

    let values = client
        .as_ref()
        .map(ConsentFormInput::prefilled)
        .unwrap_or_default();
    html(pages::consent_form(
        &template,
        &values,
        None,
        &form_action(&template.slug, &query),
    ))
}

/// `POST /form/{slug}` - validate and persist, then generate the document.
pub async fn submit_form(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<FormQuery>,
    form: web::Form<ConsentFormInput>,
) -> impl Responder {
    let slug = path.into_inner();
    let template = match load_template(&state, &slug).await {
        Ok(template) => template,
        Err(response) => return response,
    };

    let client = match resolve_client(state.store.as_ref(), query.client_id.as_deref()).await {
        Ok(client) => client,
        Err(e) => {
            log::error!("Failed to look up client: {}", e);
            return server_error();
        }
    };

    let input = form.into_inner();
    let submission = match submit(
        state.store.as_ref(),
        state.storage.as_ref(),
        &template,
        client.as_ref(),
        &input,
    )
    .await
    {
        Ok(submission) => submission,
        Err(SubmitError::Invalid(errors)) => {
            log::debug!("Form '{}' rejected: {}", slug, errors);
            return html(pages::consent_form(
                &template,
                &input,
                Some(&errors),
                &form_action(&template.slug, &query),
            ));
        }
        Err(e) => {
            log::error!("Failed to save submission for '{}': {}", slug, e);
            return server_error();
        }
    };

    state
        .documents
        .generate(state.store.as_ref(), state.storage.as_ref(), &submission)
        .await;

    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, format!("/thanks/{}", submission.id)))
        .finish()
}

/// `GET /thanks/{id}` - confirmation with a document link when one exists.
pub async fn thank_you(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let id = match Uuid::parse_str(&path.into_inner()) {
        Ok(id) => id,
        Err(_) => return not_found("This submission does not exist."),
    };

    let submission = match state.store.get_submission(&id).await {
        Ok(Some(submission)) => submission,
        Ok(None) => return not_found("This submission does not exist."),
        Err(e) => {
            log::error!("Failed to load submission {}: {}", id, e);
            return server_error();
        }
    };

    let title = match state.store.get_template(&submission.template_id).await {
        Ok(Some(template)) => template.title,
        Ok(None) => String::new(),
        Err(e) => {
            log::error!("Failed to load template {}: {}", submission.template_id, e);
            return server_error();
        }
    };

    let document_url = submission
        .document
        .as_deref()
        .map(|key| state.storage.get_asset_url(key));
    html(pages::thank_you(&submission, &title, document_url.as_deref()))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(choose_template)))
        .service(
            web::resource("/form/{slug}")
                .app_data(web::FormConfig::default().limit(FORM_BODY_LIMIT))
                .route(web::get().to(fill_form))
                .route(web::post().to(submit_form)),
        )
        .service(web::resource("/thanks/{id}").route(web::get().to(thank_you)));
}
