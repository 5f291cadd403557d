//! Catalog of health problems, questions and prescription rulesets.
//!
//! The catalog is built once, either from the built-in defaults or from the
//! three JSON reference files in a data directory, and never changes after.

use crate::types::*;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

pub const PROBLEMS_FILE: &str = "health_problems.json";
pub const QUESTIONS_FILE: &str = "questions.json";
pub const SOLUTIONS_FILE: &str = "solutions.json";

/// Suffix on solution table keys, e.g. `headache_prescription_logic`
const RULESET_SUFFIX: &str = "_prescription_logic";

/// Cached default catalog - built once and reused across all operations
static DEFAULT_CATALOG: Lazy<Catalog> = Lazy::new(build_default_catalog_internal);

/// Get a reference to the cached default catalog
pub fn get_default_catalog() -> &'static Catalog {
    &DEFAULT_CATALOG
}

/// Builds the default catalog with the built-in problems and rules
///
/// **Note**: prefer `get_default_catalog()` outside of tests.
pub fn build_default_catalog() -> Catalog {
    build_default_catalog_internal()
}

fn build_default_catalog_internal() -> Catalog {
    let problems = vec![
        HealthProblem::new("headache", &["migraine", "head pain", "head hurts"]),
        HealthProblem::new("fever", &["high temperature", "feverish", "chills"]),
        HealthProblem::new("stomach pain", &["stomach ache", "tummy", "abdominal pain"]),
        HealthProblem::new("cough", &["coughing", "dry throat"]),
        // Recognised, but no question list yet
        HealthProblem::new("back pain", &["backache", "lower back"]),
    ];

    let mut questions = HashMap::new();
    let mut rulesets = HashMap::new();

    // ========================================================================
    // Headache
    // ========================================================================

    questions.insert(
        "headache".to_string(),
        vec![
            Question::new(
                "How severe is your headache?",
                vec![
                    AnswerOption::new("Mild, I can carry on as usual", "mild_pain"),
                    AnswerOption::new("Severe, it stops me working", "severe_pain"),
                ],
            ),
            Question::new(
                "How long has it lasted?",
                vec![
                    AnswerOption::new("A few hours", "short_duration"),
                    AnswerOption::new("More than three days", "long_duration"),
                ],
            ),
        ],
    );
    rulesets.insert(
        "headache".to_string(),
        ruleset(
            "headache",
            &[
                (
                    "severe_pain",
                    rx(
                        "Paracetamol 500mg",
                        "Rest in a dark room. See a doctor if it does not ease within a day.",
                    ),
                ),
                ("mild_pain", rx("Paracetamol 500mg", "Drink water and rest your eyes.")),
                ("long_duration", rx("None", "Headaches lasting days need a doctor's review.")),
            ],
        ),
    );

    // ========================================================================
    // Fever
    // ========================================================================

    questions.insert(
        "fever".to_string(),
        vec![
            Question::new(
                "What is your temperature?",
                vec![
                    AnswerOption::new("Below 38.5°C", "low_fever"),
                    AnswerOption::new("38.5°C or higher", "high_fever"),
                    AnswerOption::new("I have not measured it", "unknown_fever"),
                ],
            ),
            Question::new(
                "Do you have any other symptoms?",
                vec![
                    AnswerOption::new("Rash or stiff neck", "red_flag"),
                    AnswerOption::new("Body aches", "flu_like"),
                    AnswerOption::new("Nothing else", "fever_only"),
                ],
            ),
        ],
    );
    rulesets.insert(
        "fever".to_string(),
        ruleset(
            "fever",
            &[
                (
                    "high_fever",
                    rx(
                        "Ibuprofen 400mg",
                        "Keep hydrated. Seek care if it persists past 48 hours.",
                    ),
                ),
                ("low_fever", rx("Paracetamol 500mg", "Rest and drink plenty of fluids.")),
                ("red_flag", rx("None", "Seek urgent medical attention.")),
                ("flu_like", rx("Paracetamol 500mg", "Rest and keep warm.")),
            ],
        ),
    );

    // ========================================================================
    // Stomach pain
    // ========================================================================

    questions.insert(
        "stomach_pain".to_string(),
        vec![
            Question::new(
                "Where is the pain?",
                vec![
                    AnswerOption::new("Upper stomach, after eating", "indigestion"),
                    AnswerOption::new("Lower right side", "appendix_risk"),
                    AnswerOption::new("All over, with cramps", "cramps"),
                ],
            ),
            Question::new(
                "Have you been sick or had diarrhoea?",
                vec![
                    AnswerOption::new("Yes", "gastro"),
                    AnswerOption::new("No", "no_gastro"),
                ],
            ),
        ],
    );
    rulesets.insert(
        "stomach_pain".to_string(),
        ruleset(
            "stomach pain",
            &[
                (
                    "appendix_risk",
                    rx("None", "Pain in the lower right side needs urgent assessment."),
                ),
                (
                    "indigestion",
                    rx("Antacid", "Eat smaller meals and avoid lying down after eating."),
                ),
                ("gastro", rx("Oral rehydration salts", "Sip fluids and rest.")),
                ("cramps", rx("Hyoscine butylbromide 10mg", "Apply a warm compress.")),
            ],
        ),
    );

    // ========================================================================
    // Cough
    // ========================================================================

    questions.insert(
        "cough".to_string(),
        vec![Question::new(
            "What kind of cough do you have?",
            vec![
                AnswerOption::new("Dry and tickly", "dry_cough"),
                AnswerOption::new("Chesty, with phlegm", "wet_cough"),
                AnswerOption::new("Coughing up blood", "blood_cough"),
            ],
        )],
    );
    rulesets.insert(
        "cough".to_string(),
        ruleset(
            "cough",
            &[
                ("dry_cough", rx("Honey and lemon", "Soothe your throat with warm drinks.")),
                ("wet_cough", rx("Guaifenesin syrup", "Stay hydrated to loosen phlegm.")),
                ("blood_cough", rx("None", "See a doctor today.")),
            ],
        ),
    );

    Catalog {
        problems,
        questions,
        rulesets,
    }
}

fn rx(medication: &str, advice: &str) -> Prescription {
    Prescription(serde_json::json!({
        "medication": medication,
        "advice": advice,
    }))
}

fn ruleset(problem_id: &str, rules: &[(&str, Prescription)]) -> PrescriptionRuleset {
    PrescriptionRuleset {
        problem_id: problem_id.into(),
        rules: rules
            .iter()
            .map(|(category, p)| (category.to_string(), p.clone()))
            .collect(),
    }
}

// ============================================================================
// Reference file formats
// ============================================================================

#[derive(Debug, Deserialize)]
struct ProblemsFile {
    health_problems: Vec<ProblemRecord>,
}

#[derive(Debug, Deserialize)]
struct ProblemRecord {
    name: String,
    #[serde(default)]
    synonyms: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct QuestionsFile {
    questions: HashMap<String, Vec<Question>>,
}

#[derive(Debug, Deserialize)]
struct SolutionsFile {
    solutions: HashMap<String, HashMap<String, Prescription>>,
}

impl Catalog {
    /// Load the catalog from `health_problems.json`, `questions.json` and
    /// `solutions.json` in `dir`
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let problems = std::fs::read_to_string(dir.join(PROBLEMS_FILE))?;
        let questions = std::fs::read_to_string(dir.join(QUESTIONS_FILE))?;
        let solutions = std::fs::read_to_string(dir.join(SOLUTIONS_FILE))?;
        let catalog = Self::from_json(&problems, &questions, &solutions)?;
        tracing::info!(
            "Loaded catalog from {:?}: {} problems, {} question lists, {} rulesets",
            dir,
            catalog.problems.len(),
            catalog.questions.len(),
            catalog.rulesets.len()
        );
        Ok(catalog)
    }

    /// Build a catalog from the contents of the three reference files
    pub fn from_json(problems: &str, questions: &str, solutions: &str) -> Result<Self> {
        let problems: ProblemsFile = serde_json::from_str(problems)?;
        let questions: QuestionsFile = serde_json::from_str(questions)?;
        let solutions: SolutionsFile = serde_json::from_str(solutions)?;

        let problems = problems
            .health_problems
            .into_iter()
            .map(|r| HealthProblem {
                id: r.name.trim().to_lowercase(),
                synonyms: r.synonyms,
            })
            .collect::<Vec<_>>();

        let mut rulesets = HashMap::new();
        for (key, rules) in solutions.solutions {
            let Some(problem) = key.strip_suffix(RULESET_SUFFIX) else {
                tracing::warn!(
                    "Ignoring solution table '{}' without '{}' suffix",
                    key,
                    RULESET_SUFFIX
                );
                continue;
            };
            let problem_id = problems
                .iter()
                .find(|p| p.key() == problem)
                .map(|p| p.id.clone())
                .unwrap_or_else(|| problem.replace('_', " "));
            rulesets.insert(
                problem.to_string(),
                PrescriptionRuleset { problem_id, rules },
            );
        }

        Ok(Catalog {
            problems,
            questions: questions.questions,
            rulesets,
        })
    }

    /// Canonical problem ids in load order
    pub fn problem_ids(&self) -> impl Iterator<Item = &str> {
        self.problems.iter().map(|p| p.id.as_str())
    }

    /// Question list for a problem; `None` when there is none or it is empty
    pub fn questions_for(&self, problem_id: &str) -> Option<&[Question]> {
        self.questions
            .get(&problem_key(problem_id))
            .map(Vec::as_slice)
            .filter(|qs| !qs.is_empty())
    }

    pub fn ruleset_for(&self, problem_id: &str) -> Option<&PrescriptionRuleset> {
        self.rulesets.get(&problem_key(problem_id))
    }

    /// Validate the catalog for consistency and completeness
    ///
    /// Returns a list of validation errors, or empty Vec if valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        for problem in &self.problems {
            if problem.id.is_empty() {
                errors.push("Health problem has empty name".to_string());
                continue;
            }
            if !seen.insert(problem.key()) {
                errors.push(format!("Duplicate health problem '{}'", problem.id));
            }
            if problem.synonyms.iter().any(|s| s.trim().is_empty()) {
                errors.push(format!("Health problem '{}' has an empty synonym", problem.id));
            }
        }

        for (key, questions) in &self.questions {
            if !seen.contains(key) {
                errors.push(format!("Questions reference unknown problem '{}'", key));
            }
            for (i, question) in questions.iter().enumerate() {
                if question.text.is_empty() {
                    errors.push(format!("Question {} for '{}' has empty text", i + 1, key));
                }
                if question.options.is_empty() {
                    errors.push(format!("Question {} for '{}' has no options", i + 1, key));
                }
            }
        }

        for key in self.rulesets.keys() {
            if !seen.contains(key) {
                errors.push(format!("Solutions reference unknown problem '{}'", key));
            }
        }

        errors
    }

    /// Fail with [`Error::CatalogValidation`] if `validate` finds anything
    pub fn ensure_valid(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::CatalogValidation(errors.join("; ")))
        }
    }
}
