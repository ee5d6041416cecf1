//! # formwork core
//!
//! Runtime-agnostic survey logic: the answer type system, the survey config
//! model with its validation and normalization, domain records, the storage
//! port, and the two engines that drive it.
//!
//! | Module | Role |
//! |--------|------|
//! | [`answer`] | Closed set of answer variants, decoding and validation |
//! | [`question`] | Question model and config-time checks |
//! | [`survey_config`] | Survey config: validate, normalize, hash |
//! | [`models`] | Survey, session and sync records |
//! | [`store`] | The [`Store`](store::Store) port plus an in-memory adapter |
//! | [`sync`] | Reconciliation of parsed directories against the store |
//! | [`sessions`] | Session creation, answer submission, completion |
//!
//! This crate has no tokio runtime, sqlx, HTTP or filesystem dependency.
//! Engines take a `tracing::Span` at construction instead of logging through
//! a global handle.

pub mod answer;
pub mod error;
pub mod models;
pub mod question;
pub mod sessions;
pub mod store;
pub mod survey_config;
pub mod sync;

pub use error::{SurveyError, SurveyResult};
