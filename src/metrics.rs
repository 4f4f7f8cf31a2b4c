//! Prometheus metrics.
//!
//! Request metrics come from the actix middleware at `/metrics`; pipeline
//! counters live in [`REGISTRY`] and are exported at `/metrics/documents`.

use actix_web::{HttpResponse, Responder};
use actix_web_prometheus::{PrometheusMetrics, PrometheusMetricsBuilder};
use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

const NAMESPACE: &str = "consent_server";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    /// Document generation attempts by outcome (`generated`, `exhausted`, `failed`).
    pub static ref DOCUMENT_OUTCOMES: IntCounterVec = {
        let counter = IntCounterVec::new(
            Opts::new(
                "consent_document_generation_total",
                "Document generation runs by outcome",
            ),
            &["outcome"],
        )
        .expect("valid document outcome counter");
        if let Err(e) = REGISTRY.register(Box::new(counter.clone())) {
            log::warn!("Document outcome counter not registered: {}", e);
        }
        counter
    };
}

pub fn record_document_outcome(outcome: &str) {
    DOCUMENT_OUTCOMES.with_label_values(&[outcome]).inc();
}

/// Request metrics middleware serving `/metrics`.
pub fn middleware() -> Result<PrometheusMetrics, Box<dyn std::error::Error + Send + Sync>> {
    PrometheusMetricsBuilder::new(NAMESPACE)
        .endpoint("/metrics")
        .build()
        .map_err(|e| e.to_string().into())
}

pub fn render() -> Result<String, prometheus::Error> {
    // touch the lazy counter so the family is exported before the first run
    let _ = &*DOCUMENT_OUTCOMES;
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

pub async fn document_metrics() -> impl Responder {
    match render() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        Err(e) => {
            log::error!("Failed to encode document metrics: {}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}
