//! Consent forms: templates, the client-facing fill flow, and the JSON API.

pub mod api;
pub mod builder;
pub mod form;
pub mod handlers;
pub mod model;
pub mod pages;
pub mod questions;
pub mod signature;
pub mod validation;
