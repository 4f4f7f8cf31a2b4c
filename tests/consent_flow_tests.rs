mod common;

use std::sync::Arc;

use actix_web::dev::ServiceResponse;
use actix_web::http::{header, StatusCode};
use actix_web::{test, App};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use consent_server::db::ConsentStore;
use consent_server::document::DocumentEngine;

use common::*;

fn location<B>(resp: &ServiceResponse<B>) -> String {
    resp.headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[actix_web::test]
async fn test_template_list_page() {
    let ctx = context();
    seed_template(&ctx.store, "facial-consent").await;
    let app = test::init_service(
        App::new()
            .app_data(ctx.state.clone())
            .configure(consent_server::configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/").to_request();
    let body = test::call_and_read_body(&app, req).await;
    let html = String::from_utf8_lossy(&body);

    assert!(html.contains("href=\"/form/facial-consent\""));
}

#[actix_web::test]
async fn test_unknown_slug_is_not_found() {
    let ctx = context();
    let app = test::init_service(
        App::new()
            .app_data(ctx.state.clone())
            .configure(consent_server::configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/form/missing").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::post()
        .uri("/form/missing")
        .set_form(form_fields("", "Jane Doe"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_form_prefilled_from_client() {
    let ctx = context();
    seed_template(&ctx.store, "facial-consent").await;
    let client = seed_client(&ctx.store).await;
    let app = test::init_service(
        App::new()
            .app_data(ctx.state.clone())
            .configure(consent_server::configure),
    )
    .await;

    let req = test::TestRequest::get()
        .uri(&format!("/form/facial-consent?client_id={}", client.id))
        .to_request();
    let body = test::call_and_read_body(&app, req).await;
    let html = String::from_utf8_lossy(&body);
    assert!(html.contains("value=\"Jane Doe\""));
    assert!(html.contains("value=\"jane@example.com\""));

    // malformed ids fall back to a blank form
    let req = test::TestRequest::get()
        .uri("/form/facial-consent?client_id=abc")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let html = String::from_utf8_lossy(&test::read_body(resp).await).to_string();
    assert!(!html.contains("value=\"Jane Doe\""));
}

#[actix_web::test]
async fn test_drawn_signature_submission_redirects_to_thanks() {
    let ctx = context();
    seed_template(&ctx.store, "facial-consent").await;
    let app = test::init_service(
        App::new()
            .app_data(ctx.state.clone())
            .configure(consent_server::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/form/facial-consent")
        .set_form(form_fields("data:image/png;base64,aGVsbG8=", ""))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let submissions = ctx.store.list_submissions().await.unwrap();
    assert_eq!(submissions.len(), 1);
    let submission = &submissions[0];
    assert_eq!(location(&resp), format!("/thanks/{}", submission.id));

    let signature = submission.signature_image.clone().unwrap();
    assert!(signature.starts_with("consent_signatures/facial-consent-Jane_Doe-"));
    assert!(signature.ends_with(".png"));
    assert_eq!(ctx.storage.get(&signature).unwrap(), b"hello");

    // the primary engine fails, the fallback produces the document
    let document = format!("consent_pdfs/consent-{}.pdf", submission.id);
    assert_eq!(submission.document.as_deref(), Some(document.as_str()));
    assert_eq!(ctx.storage.get(&document).unwrap(), PDF_BYTES);

    let req = test::TestRequest::get()
        .uri(&location(&resp))
        .to_request();
    let body = test::call_and_read_body(&app, req).await;
    let html = String::from_utf8_lossy(&body);
    assert!(html.contains("Thank you, Jane Doe"));
    assert!(html.contains(&format!("/media/{}", document)));
}

#[actix_web::test]
async fn test_large_drawn_signature_is_accepted() {
    let ctx = context();
    seed_template(&ctx.store, "facial-consent").await;
    let app = test::init_service(
        App::new()
            .app_data(ctx.state.clone())
            .configure(consent_server::configure),
    )
    .await;

    // a realistic canvas export, larger than the default form limit
    let image = vec![0x5Au8; 15_000];
    let payload = format!("data:image/png;base64,{}", BASE64.encode(&image));
    assert!(payload.len() > 16 * 1024);

    let req = test::TestRequest::post()
        .uri("/form/facial-consent")
        .set_form(form_fields(&payload, ""))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let submission = ctx.store.list_submissions().await.unwrap().remove(0);
    let signature = submission.signature_image.unwrap();
    assert_eq!(ctx.storage.get(&signature).unwrap(), image);
}

#[actix_web::test]
async fn test_typed_signature_only_submission() {
    let ctx = context();
    seed_template(&ctx.store, "facial-consent").await;
    let app = test::init_service(
        App::new()
            .app_data(ctx.state.clone())
            .configure(consent_server::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/form/facial-consent")
        .set_form(form_fields("", "Jane Doe"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    let submission = ctx.store.list_submissions().await.unwrap().remove(0);
    assert_eq!(submission.typed_signature, "Jane Doe");
    assert_eq!(submission.signature_image, None);
    assert_eq!(submission.answers["allergies"], "yes");
    assert_eq!(submission.answers["pregnancy"], "no");
    assert_eq!(submission.answers["medications"], "ibuprofen");
    assert_eq!(submission.answers["skin_conditions"], "");
}

#[actix_web::test]
async fn test_malformed_signature_rerenders_form() {
    let ctx = context();
    seed_template(&ctx.store, "facial-consent").await;
    let app = test::init_service(
        App::new()
            .app_data(ctx.state.clone())
            .configure(consent_server::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/form/facial-consent")
        .set_form(form_fields("data:image/png;base64,%%%", ""))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let html = String::from_utf8_lossy(&test::read_body(resp).await).to_string();
    assert!(html.contains("not valid base64"));
    assert!(html.contains("value=\"Chemical peel\""));
    assert!(ctx.store.list_submissions().await.unwrap().is_empty());
    assert!(ctx.storage.keys().is_empty());
}

#[actix_web::test]
async fn test_invalid_form_reports_every_error() {
    let ctx = context();
    seed_template(&ctx.store, "facial-consent").await;
    let app = test::init_service(
        App::new()
            .app_data(ctx.state.clone())
            .configure(consent_server::configure),
    )
    .await;

    let mut fields = form_fields("", "");
    set_field(&mut fields, "full_name", "");
    set_field(&mut fields, "consent_given", "false");
    let req = test::TestRequest::post()
        .uri("/form/facial-consent")
        .set_form(fields)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let html = String::from_utf8_lossy(&test::read_body(resp).await).to_string();
    assert_eq!(html.matches("This field is required.").count(), 2);
    assert!(ctx.store.list_submissions().await.unwrap().is_empty());
}

#[actix_web::test]
async fn test_missing_signature_rerenders_form() {
    let ctx = context();
    seed_template(&ctx.store, "facial-consent").await;
    let app = test::init_service(
        App::new()
            .app_data(ctx.state.clone())
            .configure(consent_server::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/form/facial-consent")
        .set_form(form_fields("", ""))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let html = String::from_utf8_lossy(&test::read_body(resp).await).to_string();
    assert!(html.contains("Please provide either a drawn or typed signature."));
    assert!(ctx.store.list_submissions().await.unwrap().is_empty());
}

#[actix_web::test]
async fn test_all_engines_failing_still_confirms() {
    let ctx = context_with_engines(vec![
        Arc::new(BrokenEngine("typst")) as Arc<dyn DocumentEngine>,
        Arc::new(BrokenEngine("genpdf")),
    ]);
    seed_template(&ctx.store, "facial-consent").await;
    let app = test::init_service(
        App::new()
            .app_data(ctx.state.clone())
            .configure(consent_server::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/form/facial-consent")
        .set_form(form_fields("", "Jane Doe"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    let submission = ctx.store.list_submissions().await.unwrap().remove(0);
    assert_eq!(submission.document, None);
    assert!(ctx.storage.keys().is_empty());

    let req = test::TestRequest::get()
        .uri(&location(&resp))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let html = String::from_utf8_lossy(&test::read_body(resp).await).to_string();
    assert!(html.contains("Thank you, Jane Doe"));
    assert!(!html.contains("consent_pdfs/"));
}

#[actix_web::test]
async fn test_client_is_linked_on_submit() {
    let ctx = context();
    seed_template(&ctx.store, "facial-consent").await;
    let client = seed_client(&ctx.store).await;
    let app = test::init_service(
        App::new()
            .app_data(ctx.state.clone())
            .configure(consent_server::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri(&format!("/form/facial-consent?client_id={}", client.id))
        .set_form(form_fields("", "Jane Doe"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    let submission = ctx.store.list_submissions().await.unwrap().remove(0);
    assert_eq!(submission.client_id, Some(client.id));
}

#[actix_web::test]
async fn test_unknown_thanks_is_not_found() {
    let ctx = context();
    let app = test::init_service(
        App::new()
            .app_data(ctx.state.clone())
            .configure(consent_server::configure),
    )
    .await;

    for uri in [
        "/thanks/not-a-uuid".to_string(),
        format!("/thanks/{}", uuid::Uuid::new_v4()),
    ] {
        let req = test::TestRequest::get().uri(&uri).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
