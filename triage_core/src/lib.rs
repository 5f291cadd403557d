#![forbid(unsafe_code)]

//! Core domain model and decision logic for the symptom triage dialog.
//!
//! This crate provides:
//! - Domain types (health problems, questions, prescriptions)
//! - Catalog loading and validation
//! - Symptom matching
//! - The per-conversation dialog state machine
//! - Prescription resolution
//! - Session registry and the request-level service

pub mod types;
pub mod error;
pub mod catalog;
pub mod config;
pub mod logging;
pub mod matcher;
pub mod dialog;
pub mod resolver;
pub mod registry;
pub mod service;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use catalog::{build_default_catalog, get_default_catalog};
pub use config::Config;
pub use matcher::find_health_problem;
pub use dialog::{DialogState, NextStep, QuestionPrompt, Session};
pub use resolver::resolve_prescription;
pub use registry::SessionRegistry;
pub use service::{AnswerOutcome, IdentifyOutcome, ServiceOptions, TriageService};
