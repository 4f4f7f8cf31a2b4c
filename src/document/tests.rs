use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use super::layout::DocumentLayout;
use super::typst::render_source;
use super::*;
use crate::consent::model::{Answers, ConsentTemplate, Submission};
use crate::db::{ConsentStore, InMemoryStore};
use crate::storage::ObjectStorage;
use crate::test_support::MemoryStorage;

const PNG_BYTES: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00];

struct StubEngine {
    name: &'static str,
    output: Result<Vec<u8>, ()>,
    calls: AtomicUsize,
}

impl StubEngine {
    fn ok(name: &'static str, bytes: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            name,
            output: Ok(bytes.to_vec()),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            output: Err(()),
            calls: AtomicUsize::new(0),
        })
    }

    fn as_engine(self: &Arc<Self>) -> Arc<dyn DocumentEngine> {
        self.clone()
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DocumentEngine for StubEngine {
    fn name(&self) -> &'static str {
        self.name
    }

    fn render(&self, _layout: &DocumentLayout) -> Result<Vec<u8>, GeneratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.output.clone().map_err(|_| GeneratorError::TypstExit(1))
    }
}

struct SlowEngine;

impl DocumentEngine for SlowEngine {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn render(&self, _layout: &DocumentLayout) -> Result<Vec<u8>, GeneratorError> {
        std::thread::sleep(Duration::from_millis(500));
        Ok(b"late".to_vec())
    }
}

fn template() -> ConsentTemplate {
    ConsentTemplate::new(
        "facial-consent".to_string(),
        "Facial Treatment Consent".to_string(),
        "<p>I understand the risks.</p><p>Results vary.</p>".to_string(),
    )
}

fn submission(template: &ConsentTemplate) -> Submission {
    let mut answers = Answers::new();
    answers.insert("skin_conditions".to_string(), "".to_string());
    answers.insert("allergies".to_string(), "yes".to_string());
    answers.insert("medications".to_string(), "ibuprofen".to_string());
    answers.insert("pregnancy".to_string(), "no".to_string());

    let now = Utc.with_ymd_and_hms(2025, 11, 5, 14, 30, 0).unwrap();
    Submission {
        id: Uuid::new_v4(),
        template_id: template.id,
        client_id: None,
        full_name: "Jane Doe".to_string(),
        email: "".to_string(),
        phone: "555-0100".to_string(),
        treatment_date: NaiveDate::from_ymd_opt(2025, 11, 5).unwrap(),
        treatment_type: "Chemical peel".to_string(),
        answers,
        signature_image: None,
        typed_signature: "Jane Doe".to_string(),
        signed_at: now,
        document: None,
        consent_given: true,
        created_at: now,
    }
}

async fn seeded_store(template: &ConsentTemplate, submission: &Submission) -> InMemoryStore {
    let store = InMemoryStore::new();
    store.insert_template(template).await.unwrap();
    store.insert_submission(submission).await.unwrap();
    store
}

#[test]
fn test_layout_orders_answers_and_drops_empty_details() {
    let template = template();
    let submission = submission(&template);
    let layout = DocumentLayout::build(&template, &submission, None);

    assert_eq!(layout.title, "Facial Treatment Consent");
    assert_eq!(layout.terms, vec!["I understand the risks.", "Results vary."]);
    assert!(layout.details.iter().all(|(label, _)| label != "Email"));
    assert!(layout
        .details
        .contains(&("Treatment Date".to_string(), "05 November 2025".to_string())));

    let labels: Vec<&str> = layout.answers.iter().map(|(l, _)| l.as_str()).collect();
    assert_eq!(
        labels,
        vec!["Allergies", "Pregnancy", "Medications", "Skin Conditions"]
    );
    assert_eq!(layout.typed_signature.as_deref(), Some("Jane Doe"));
    assert!(!layout.drawn_signature);
}

#[test]
fn test_layout_keeps_only_recognised_images() {
    let template = template();
    let mut submission = submission(&template);
    submission.signature_image = Some("consent_signatures/sig.png".to_string());
    submission.typed_signature = String::new();

    let layout = DocumentLayout::build(&template, &submission, Some(PNG_BYTES.to_vec()));
    assert!(layout.signature_image.is_some());
    assert_eq!(layout.typed_signature, None);

    let layout = DocumentLayout::build(&template, &submission, Some(b"hello".to_vec()));
    assert!(layout.signature_image.is_none());
    assert!(layout.drawn_signature);
}

#[test]
fn test_display_value_for_empty_answer() {
    assert_eq!(DocumentLayout::display_value("  "), "-");
    assert_eq!(DocumentLayout::display_value("no"), "no");
}

#[test]
fn test_typst_source_escapes_values() {
    let template = template();
    let mut submission = submission(&template);
    submission.full_name = "Jane \"JD\" Doe".to_string();
    let layout = DocumentLayout::build(&template, &submission, None);

    let source = render_source(&layout, None);
    assert!(source.contains(r#"#heading(level: 1, "Facial Treatment Consent")"#));
    assert!(source.contains(r#""Jane \"JD\" Doe""#));
    assert!(source.contains(r#"strong("Skin Conditions"), "-""#));
    assert!(source.contains(r#"#text(style: "italic", "Jane Doe")"#));
    assert!(!source.contains("#image("));
}

#[test]
fn test_typst_source_embeds_signature_file() {
    let template = template();
    let mut submission = submission(&template);
    submission.signature_image = Some("consent_signatures/sig.png".to_string());
    let layout = DocumentLayout::build(&template, &submission, Some(PNG_BYTES.to_vec()));

    let source = render_source(&layout, Some("signature.png"));
    assert!(source.contains(r#"#image("signature.png", width: 6cm)"#));
}

#[tokio::test]
async fn test_falls_back_to_next_engine() {
    let primary = StubEngine::failing("primary");
    let secondary = StubEngine::ok("secondary", b"%PDF-1.7");
    let generator = DocumentGenerator::new(
        vec![primary.as_engine(), secondary.as_engine()],
        Duration::from_secs(5),
    );

    let template = template();
    let submission = submission(&template);
    let store = seeded_store(&template, &submission).await;
    let storage = MemoryStorage::default();

    let outcome = generator.generate(&store, &storage, &submission).await;

    let key = format!("consent_pdfs/consent-{}.pdf", submission.id);
    assert_eq!(
        outcome,
        GenerationOutcome::Generated {
            engine: "secondary",
            key: key.clone()
        }
    );
    assert_eq!(primary.calls(), 1);
    assert_eq!(secondary.calls(), 1);
    assert_eq!(storage.download_file(&key).await.unwrap(), b"%PDF-1.7");

    let stored = store.get_submission(&submission.id).await.unwrap().unwrap();
    assert_eq!(stored.document.as_deref(), Some(key.as_str()));
}

#[tokio::test]
async fn test_first_success_skips_remaining_engines() {
    let primary = StubEngine::ok("primary", b"%PDF-primary");
    let secondary = StubEngine::ok("secondary", b"%PDF-secondary");
    let generator = DocumentGenerator::new(
        vec![primary.as_engine(), secondary.as_engine()],
        Duration::from_secs(5),
    );

    let template = template();
    let submission = submission(&template);
    let layout = DocumentLayout::build(&template, &submission, None);

    let (engine, bytes) = generator.render_first_success(layout).await.unwrap();
    assert_eq!(engine, "primary");
    assert_eq!(bytes, b"%PDF-primary");
    assert_eq!(secondary.calls(), 0);
}

#[tokio::test]
async fn test_exhausted_chain_leaves_record_untouched() {
    let generator = DocumentGenerator::new(
        vec![
            StubEngine::failing("primary").as_engine(),
            StubEngine::failing("secondary").as_engine(),
        ],
        Duration::from_secs(5),
    );

    let template = template();
    let submission = submission(&template);
    let store = seeded_store(&template, &submission).await;
    let storage = MemoryStorage::default();

    let outcome = generator.generate(&store, &storage, &submission).await;

    assert_eq!(outcome, GenerationOutcome::Exhausted);
    assert!(storage.files.lock().is_empty());
    let stored = store.get_submission(&submission.id).await.unwrap().unwrap();
    assert_eq!(stored.document, None);
    assert_eq!(stored.full_name, "Jane Doe");
}

#[tokio::test]
async fn test_empty_output_counts_as_failure() {
    let generator = DocumentGenerator::new(
        vec![
            StubEngine::ok("blank", b"").as_engine(),
            StubEngine::ok("real", b"%PDF").as_engine(),
        ],
        Duration::from_secs(5),
    );
    let template = template();
    let layout = DocumentLayout::build(&template, &submission(&template), None);

    let (engine, _) = generator.render_first_success(layout).await.unwrap();
    assert_eq!(engine, "real");
}

#[tokio::test]
async fn test_slow_engine_times_out() {
    let fallback = StubEngine::ok("fallback", b"%PDF");
    let generator = DocumentGenerator::new(
        vec![Arc::new(SlowEngine) as Arc<dyn DocumentEngine>, fallback.as_engine()],
        Duration::from_millis(50),
    );
    let template = template();
    let layout = DocumentLayout::build(&template, &submission(&template), None);

    let (engine, _) = generator.render_first_success(layout).await.unwrap();
    assert_eq!(engine, "fallback");
}

#[tokio::test]
async fn test_regeneration_replaces_document() {
    let generator = DocumentGenerator::new(
        vec![StubEngine::ok("primary", b"%PDF-1").as_engine()],
        Duration::from_secs(5),
    );
    let template = template();
    let submission = submission(&template);
    let store = seeded_store(&template, &submission).await;
    let storage = MemoryStorage::default();

    let first = generator.generate(&store, &storage, &submission).await;
    let second = generator.generate(&store, &storage, &submission).await;

    assert_eq!(first, second);
    assert_eq!(storage.files.lock().len(), 1);
    let stored = store.get_submission(&submission.id).await.unwrap().unwrap();
    assert_eq!(stored.document, Some(document_key(&submission)));
    assert_eq!(stored.answers, submission.answers);
    assert_eq!(stored.typed_signature, submission.typed_signature);
}

#[tokio::test]
async fn test_missing_template_fails_without_rendering() {
    let engine = StubEngine::ok("primary", b"%PDF");
    let generator = DocumentGenerator::new(vec![engine.as_engine()], Duration::from_secs(5));
    let template = template();
    let submission = submission(&template);

    let outcome = generator
        .generate(&InMemoryStore::new(), &MemoryStorage::default(), &submission)
        .await;

    assert!(matches!(outcome, GenerationOutcome::Failed(_)));
    assert_eq!(engine.calls(), 0);
}

#[test]
fn test_default_chain_order() {
    let config = DocumentConfig {
        static_root: "./static".into(),
        font_dir: "./fonts".into(),
        font_family: "LiberationSans".to_string(),
        typst_bin: "typst".to_string(),
        timeout: Duration::from_secs(30),
    };
    let generator = DocumentGenerator::from_config(&config);
    assert_eq!(generator.engine_names(), vec!["typst", "genpdf"]);
}

fn unavailable_config() -> DocumentConfig {
    DocumentConfig {
        static_root: "/nonexistent/consent-static".into(),
        font_dir: "/nonexistent/consent-fonts".into(),
        font_family: "LiberationSans".to_string(),
        typst_bin: "/nonexistent/bin/typst".to_string(),
        timeout: Duration::from_secs(10),
    }
}

#[test]
fn test_genpdf_without_fonts_reports_font_error() {
    let template = template();
    let layout = DocumentLayout::build(&template, &submission(&template), None);

    let err = GenpdfEngine::new(&unavailable_config())
        .render(&layout)
        .unwrap_err();
    assert!(matches!(err, GeneratorError::Font(_)), "got {:?}", err);
}

#[test]
fn test_missing_typst_binary_is_an_io_error() {
    let template = template();
    let layout = DocumentLayout::build(&template, &submission(&template), None);

    let err = TypstEngine::new(&unavailable_config())
        .render(&layout)
        .unwrap_err();
    assert!(matches!(err, GeneratorError::TypstIo(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_real_engines_unavailable_is_exhausted() {
    let generator = DocumentGenerator::from_config(&unavailable_config());
    let template = template();
    let submission = submission(&template);
    let store = seeded_store(&template, &submission).await;
    let storage = MemoryStorage::default();

    let outcome = generator.generate(&store, &storage, &submission).await;

    assert_eq!(outcome, GenerationOutcome::Exhausted);
    assert!(storage.files.lock().is_empty());
    let stored = store.get_submission(&submission.id).await.unwrap().unwrap();
    assert_eq!(stored.document, None);
}
