//! Document generation - renders a submission into a downloadable PDF.
//!
//! - `layout` - engine-independent content of the document
//! - `typst` - primary engine, shells out to the Typst CLI
//! - `pdf` - secondary engine, pure Rust via genpdf
//!
//! Generation is best-effort: the first engine to succeed wins and a
//! failure never reaches the client.

pub mod common;
pub mod layout;
pub mod pdf;
pub mod typst;

#[cfg(test)]
mod tests;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::consent::model::Submission;
use crate::db::ConsentStore;
use crate::metrics::record_document_outcome;
use crate::storage::{object_key, ObjectStorage, DOCUMENT_NAMESPACE};

pub use layout::DocumentLayout;
pub use pdf::GenpdfEngine;
pub use typst::TypstEngine;

/// Errors that can occur while rendering a document.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("failed to load Typst preamble: {0}")]
    TemplateIo(#[source] std::io::Error),
    #[error("failed to create temporary file: {0}")]
    TempDir(#[source] std::io::Error),
    #[error("failed to write Typst source: {0}")]
    WriteSource(#[source] std::io::Error),
    #[error("Typst CLI execution failed: {0}")]
    TypstIo(#[source] std::io::Error),
    #[error("Typst CLI exited with status {0}")]
    TypstExit(i32),
    #[error("failed to read generated PDF: {0}")]
    ReadPdf(#[source] std::io::Error),
    #[error("failed to load fonts: {0}")]
    Font(String),
    #[error("failed to prepare signature image: {0}")]
    Image(String),
    #[error("failed to render PDF: {0}")]
    Pdf(String),
    #[error("engine produced an empty document")]
    EmptyOutput,
    #[error("engine timed out after {0:?}")]
    Timeout(Duration),
    #[error("engine task failed: {0}")]
    Join(String),
}

/// One renderer in the fallback chain.
pub trait DocumentEngine: Send + Sync {
    fn name(&self) -> &'static str;
    fn render(&self, layout: &DocumentLayout) -> Result<Vec<u8>, GeneratorError>;
}

/// Settings handed to the engines.
#[derive(Debug, Clone)]
pub struct DocumentConfig {
    pub static_root: PathBuf,
    pub font_dir: PathBuf,
    pub font_family: String,
    pub typst_bin: String,
    /// Upper bound for a single engine attempt.
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Generated { engine: &'static str, key: String },
    /// Every engine failed; the submission keeps its previous document.
    Exhausted,
    /// The pipeline could not run or store the result.
    Failed(String),
}

impl GenerationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Generated { .. } => "generated",
            Self::Exhausted => "exhausted",
            Self::Failed(_) => "failed",
        }
    }
}

pub fn document_key(submission: &Submission) -> String {
    object_key(DOCUMENT_NAMESPACE, &format!("consent-{}.pdf", submission.id))
}

pub struct DocumentGenerator {
    engines: Vec<Arc<dyn DocumentEngine>>,
    timeout: Duration,
}

impl DocumentGenerator {
    pub fn new(engines: Vec<Arc<dyn DocumentEngine>>, timeout: Duration) -> Self {
        Self { engines, timeout }
    }

    /// Typst first, genpdf as fallback.
    pub fn from_config(config: &DocumentConfig) -> Self {
        let engines: Vec<Arc<dyn DocumentEngine>> = vec![
            Arc::new(TypstEngine::new(config)),
            Arc::new(GenpdfEngine::new(config)),
        ];
        Self::new(engines, config.timeout)
    }

    pub fn engine_names(&self) -> Vec<&'static str> {
        self.engines.iter().map(|engine| engine.name()).collect()
    }

    /// Render with each engine in turn until one succeeds.
    pub async fn render_first_success(
        &self,
        layout: DocumentLayout,
    ) -> Option<(&'static str, Vec<u8>)> {
        let layout = Arc::new(layout);

        for engine in &self.engines {
            let name = engine.name();
            match self.render_with(engine.clone(), layout.clone()).await {
                Ok(bytes) => {
                    log::debug!("Engine '{}' rendered {} bytes", name, bytes.len());
                    return Some((name, bytes));
                }
                Err(e) => log::warn!("Document engine '{}' failed: {}", name, e),
            }
        }
        None
    }

    async fn render_with(
        &self,
        engine: Arc<dyn DocumentEngine>,
        layout: Arc<DocumentLayout>,
    ) -> Result<Vec<u8>, GeneratorError> {
        let task = tokio::task::spawn_blocking(move || engine.render(&layout));

        let bytes = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join)) => return Err(GeneratorError::Join(join.to_string())),
            Err(_) => return Err(GeneratorError::Timeout(self.timeout)),
        };

        if bytes.is_empty() {
            return Err(GeneratorError::EmptyOutput);
        }
        Ok(bytes)
    }

    /// Generate and store the document for a persisted submission.
    ///
    /// Never fails: every problem is logged and reported in the outcome.
    /// The storage key is derived from the submission id, so running this
    /// again replaces the previous file.
    pub async fn generate(
        &self,
        store: &dyn ConsentStore,
        storage: &dyn ObjectStorage,
        submission: &Submission,
    ) -> GenerationOutcome {
        let outcome = self.run(store, storage, submission).await;
        match &outcome {
            GenerationOutcome::Generated { engine, key } => {
                log::info!("Document for submission {} stored at {} ({})", submission.id, key, engine)
            }
            GenerationOutcome::Exhausted => log::warn!(
                "No document engine succeeded for submission {}, document left unchanged",
                submission.id
            ),
            GenerationOutcome::Failed(reason) => log::warn!(
                "Document generation for submission {} failed: {}",
                submission.id,
                reason
            ),
        }
        record_document_outcome(outcome.label());
        outcome
    }

    async fn run(
        &self,
        store: &dyn ConsentStore,
        storage: &dyn ObjectStorage,
        submission: &Submission,
    ) -> GenerationOutcome {
        let template = match store.get_template(&submission.template_id).await {
            Ok(Some(template)) => template,
            Ok(None) => {
                return GenerationOutcome::Failed(format!(
                    "template {} not found",
                    submission.template_id
                ))
            }
            Err(e) => return GenerationOutcome::Failed(e.to_string()),
        };

        let signature_bytes = match &submission.signature_image {
            Some(key) => match storage.download_file(key).await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    log::warn!("Signature image {} unavailable for document: {}", key, e);
                    None
                }
            },
            None => None,
        };

        let layout = DocumentLayout::build(&template, submission, signature_bytes);
        let (engine, bytes) = match self.render_first_success(layout).await {
            Some(rendered) => rendered,
            None => return GenerationOutcome::Exhausted,
        };

        let key = document_key(submission);
        if let Err(e) = storage.upload_file(&key, &bytes).await {
            return GenerationOutcome::Failed(format!("failed to store {}: {}", key, e));
        }
        if let Err(e) = store
            .set_submission_document(&submission.id, Some(&key))
            .await
        {
            return GenerationOutcome::Failed(e.to_string());
        }

        GenerationOutcome::Generated { engine, key }
    }
}
