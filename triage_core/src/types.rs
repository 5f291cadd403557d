//! Core domain types for the symptom triage system.
//!
//! This module defines the fundamental types used throughout the system:
//! - Health problems and their synonyms
//! - Clarifying questions and answer options
//! - Prescription rulesets and payloads

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Health Problem Types
// ============================================================================

/// A known health problem (e.g., "headache")
///
/// `id` is the lowercased canonical name and is unique within a catalog.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthProblem {
    pub id: String,
    pub synonyms: Vec<String>,
}

impl HealthProblem {
    pub fn new(name: &str, synonyms: &[&str]) -> Self {
        Self {
            id: name.trim().to_lowercase(),
            synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Key used by the question and solution tables for this problem
    pub fn key(&self) -> String {
        problem_key(&self.id)
    }
}

/// Table key for a problem id: spaces become underscores
pub fn problem_key(id: &str) -> String {
    id.replace(' ', "_")
}

// ============================================================================
// Question Types
// ============================================================================

/// One selectable answer to a question
///
/// `category` drives prescription lookup. Options without one are recorded
/// but never match a rule.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerOption {
    #[serde(alias = "text")]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl AnswerOption {
    pub fn new(label: &str, category: &str) -> Self {
        Self {
            label: label.into(),
            category: Some(category.into()),
        }
    }
}

/// A clarifying question; option order is the order shown to the user
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    #[serde(rename = "question")]
    pub text: String,
    pub options: Vec<AnswerOption>,
}

impl Question {
    pub fn new(text: &str, options: Vec<AnswerOption>) -> Self {
        Self {
            text: text.into(),
            options,
        }
    }
}

// ============================================================================
// Prescription Types
// ============================================================================

/// Opaque recommendation payload, returned to callers verbatim
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Prescription(pub serde_json::Value);

impl Prescription {
    pub fn text(advice: &str) -> Self {
        Self(serde_json::Value::String(advice.into()))
    }

    /// The payload as plain text, if it is a JSON string
    pub fn as_text(&self) -> Option<&str> {
        self.0.as_str()
    }

    /// True for payloads that carry no advice: `null`, `false`, `0`, `""`,
    /// `[]` and `{}`
    pub fn is_blank(&self) -> bool {
        use serde_json::Value;
        match &self.0 {
            Value::Null => true,
            Value::Bool(b) => !b,
            Value::Number(n) => n.as_f64() == Some(0.0),
            Value::String(s) => s.is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::Object(fields) => fields.is_empty(),
        }
    }
}

/// Per-problem mapping from answer category to prescription
#[derive(Clone, Debug, PartialEq)]
pub struct PrescriptionRuleset {
    pub problem_id: String,
    pub rules: HashMap<String, Prescription>,
}

impl PrescriptionRuleset {
    pub fn get(&self, category: &str) -> Option<&Prescription> {
        self.rules.get(category)
    }
}

// ============================================================================
// Catalog Type
// ============================================================================

/// The complete catalog of health problems, questions and rulesets
///
/// `problems` keeps load order: symptom matching walks it front to back.
/// Question lists and rulesets are keyed by [`problem_key`].
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    pub problems: Vec<HealthProblem>,
    pub questions: HashMap<String, Vec<Question>>,
    pub rulesets: HashMap<String, PrescriptionRuleset>,
}
