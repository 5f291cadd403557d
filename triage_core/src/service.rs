//! Request-level triage operations.
//!
//! [`TriageService`] is what a request layer talks to: it owns the shared
//! catalog and an injected [`SessionRegistry`], performs exactly one core
//! step per call, and turns recoverable misses into outcome values carrying
//! a user-facing message.

use crate::dialog::{NextStep, QuestionPrompt};
use crate::{
    find_health_problem, resolve_prescription, Catalog, Error, Prescription, Result, Session,
    SessionRegistry,
};
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

const UNMATCHED_MESSAGE: &str = concat!(
    "I could not identify your health concern. Please describe your symptoms more clearly. ",
    "For example: \"I have a headache\", \"I have fever\", \"I have stomach pain\", etc."
);
const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please start again.";
const NO_PRESCRIPTION_MESSAGE: &str = "Unable to generate prescription. Please consult a doctor.";

/// Outcome of [`TriageService::identify`]
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IdentifyOutcome {
    #[serde(rename = "not_found")]
    Unmatched { message: String },
    NoQuestions {
        health_problem: String,
        message: String,
    },
    #[serde(rename = "questions")]
    Question {
        health_problem: String,
        message: String,
        #[serde(flatten)]
        question: QuestionPrompt,
    },
}

/// Outcome of [`TriageService::submit_answer`]
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnswerOutcome {
    #[serde(rename = "session_not_found")]
    SessionNotFound { message: String },
    #[serde(rename = "questions")]
    Question {
        #[serde(flatten)]
        question: QuestionPrompt,
    },
    Prescription {
        health_problem: String,
        prescription: Prescription,
    },
    PrescriptionUnavailable {
        health_problem: String,
        message: String,
    },
}

/// Session behaviour knobs
#[derive(Clone, Debug, Default)]
pub struct ServiceOptions {
    /// Evict sessions idle for longer than this before each request
    pub idle_timeout: Option<Duration>,
}

/// The triage dialog service
pub struct TriageService {
    catalog: Arc<Catalog>,
    registry: Arc<SessionRegistry>,
    options: ServiceOptions,
}

impl TriageService {
    pub fn new(catalog: Arc<Catalog>, registry: Arc<SessionRegistry>) -> Self {
        Self::with_options(catalog, registry, ServiceOptions::default())
    }

    pub fn with_options(
        catalog: Arc<Catalog>,
        registry: Arc<SessionRegistry>,
        options: ServiceOptions,
    ) -> Self {
        Self {
            catalog,
            registry,
            options,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Identify the problem in `message` and, if it has questions, start a
    /// session under `session_id`
    pub fn identify(&self, session_id: &str, message: &str) -> Result<IdentifyOutcome> {
        self.sweep_idle()?;

        let Some(problem) = find_health_problem(&self.catalog, message) else {
            tracing::info!("Session '{}': no health problem identified", session_id);
            return Ok(IdentifyOutcome::Unmatched {
                message: UNMATCHED_MESSAGE.into(),
            });
        };
        let health_problem = problem.id.clone();

        let (session, first) = match Session::start(&self.catalog, session_id, &health_problem) {
            Ok(started) => started,
            Err(Error::NoQuestions(_)) => {
                tracing::info!(
                    "Session '{}': identified '{}' but it has no questions",
                    session_id,
                    health_problem
                );
                let message = format!(
                    "I identified that you may have {}, but I don't have detailed questions \
                     for this condition yet.",
                    health_problem
                );
                return Ok(IdentifyOutcome::NoQuestions {
                    health_problem,
                    message,
                });
            }
            Err(e) => return Err(e),
        };
        self.registry.create(session)?;

        let message = format!(
            "I understand you may be experiencing {}. Let me ask you a few questions \
             to provide better guidance.",
            health_problem
        );
        Ok(IdentifyOutcome::Question {
            health_problem,
            message,
            question: first,
        })
    }

    /// Record the answer at `answer_index` for the session's current question
    ///
    /// An out-of-range index is returned as [`Error::InvalidIndex`] with the
    /// session unchanged.
    pub fn submit_answer(&self, session_id: &str, answer_index: usize) -> Result<AnswerOutcome> {
        self.apply(session_id, |session| session.answer(answer_index))
    }

    /// Like [`TriageService::submit_answer`], rejecting the answer with
    /// [`Error::ConcurrentModification`] unless the session is still on
    /// question `question_number` (1-based)
    pub fn submit_answer_for(
        &self,
        session_id: &str,
        question_number: usize,
        answer_index: usize,
    ) -> Result<AnswerOutcome> {
        let expected = question_number.saturating_sub(1);
        self.apply(session_id, |session| session.answer_at(expected, answer_index))
    }

    /// Canonical problem ids in load order
    pub fn list_problems(&self) -> Vec<String> {
        self.catalog.problem_ids().map(String::from).collect()
    }

    /// Drop idle sessions when an idle timeout is configured
    fn sweep_idle(&self) -> Result<()> {
        if let Some(max_idle) = self.options.idle_timeout {
            self.registry.evict_idle(Utc::now(), max_idle)?;
        }
        Ok(())
    }

    fn apply<F>(&self, session_id: &str, f: F) -> Result<AnswerOutcome>
    where
        F: FnOnce(&mut Session) -> Result<NextStep>,
    {
        self.sweep_idle()?;

        let update = match self.registry.update(session_id, f) {
            Ok(update) => update,
            Err(e) if e.is_not_found() => {
                tracing::info!("Session '{}' not found", session_id);
                return Ok(AnswerOutcome::SessionNotFound {
                    message: SESSION_EXPIRED_MESSAGE.into(),
                });
            }
            Err(e) => return Err(e),
        };

        if let NextStep::Question(prompt) = update.value {
            return Ok(AnswerOutcome::Question { question: prompt });
        }

        let completed = update.completed.ok_or_else(|| {
            Error::State(format!("Session '{}' completed but was not released", session_id))
        })?;

        let outcome =
            match resolve_prescription(&self.catalog, &completed.problem_id, &completed.answers) {
                Some(prescription) => AnswerOutcome::Prescription {
                    health_problem: completed.problem_id,
                    prescription: prescription.clone(),
                },
                None => AnswerOutcome::PrescriptionUnavailable {
                    health_problem: completed.problem_id,
                    message: NO_PRESCRIPTION_MESSAGE.into(),
                },
            };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build_default_catalog, AnswerOption, HealthProblem, PrescriptionRuleset, Question};
    use std::collections::HashMap;

    fn headache_catalog() -> Catalog {
        let mut questions = HashMap::new();
        questions.insert(
            "headache".to_string(),
            vec![Question::new(
                "How bad is it?",
                vec![
                    AnswerOption::new("mild", "mild_pain"),
                    AnswerOption::new("severe", "severe_pain"),
                ],
            )],
        );

        let mut rules = HashMap::new();
        rules.insert("severe_pain".to_string(), Prescription::text("see a doctor"));
        let mut rulesets = HashMap::new();
        rulesets.insert(
            "headache".to_string(),
            PrescriptionRuleset {
                problem_id: "headache".into(),
                rules,
            },
        );

        Catalog {
            problems: vec![
                HealthProblem::new("headache", &["migraine"]),
                HealthProblem::new("sprain", &[]),
            ],
            questions,
            rulesets,
        }
    }

    fn service(catalog: Catalog) -> TriageService {
        crate::logging::init_test();
        TriageService::new(Arc::new(catalog), Arc::new(SessionRegistry::new()))
    }

    #[test]
    fn test_identify_by_synonym() {
        let service = service(headache_catalog());
        let outcome = service.identify("s1", "I have a migraine").unwrap();
        match outcome {
            IdentifyOutcome::Question {
                health_problem,
                question,
                ..
            } => {
                assert_eq!(health_problem, "headache");
                assert_eq!(question.question_number, 1);
                assert_eq!(question.total_questions, 1);
                assert_eq!(question.options.len(), 2);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(service.registry().get("s1").is_ok());
    }

    #[test]
    fn test_identify_unmatched_creates_no_session() {
        let service = service(headache_catalog());
        let outcome = service.identify("s1", "my knee is sore").unwrap();
        assert!(matches!(outcome, IdentifyOutcome::Unmatched { .. }));
        assert!(service.registry().is_empty().unwrap());
    }

    #[test]
    fn test_identify_without_questions() {
        let service = service(headache_catalog());
        let outcome = service.identify("s1", "I think it's a sprain").unwrap();
        assert_eq!(
            outcome,
            IdentifyOutcome::NoQuestions {
                health_problem: "sprain".into(),
                message: "I identified that you may have sprain, but I don't have detailed \
                          questions for this condition yet."
                    .into(),
            }
        );
        assert!(service.registry().is_empty().unwrap());
    }

    #[test]
    fn test_severe_answer_resolves_and_destroys_session() {
        let service = service(headache_catalog());
        service.identify("s1", "headache").unwrap();

        let outcome = service.submit_answer("s1", 1).unwrap();
        assert_eq!(
            outcome,
            AnswerOutcome::Prescription {
                health_problem: "headache".into(),
                prescription: Prescription::text("see a doctor"),
            }
        );
        assert!(service.registry().get("s1").is_err());
    }

    #[test]
    fn test_unresolvable_answer_still_destroys_session() {
        let service = service(headache_catalog());
        service.identify("s1", "headache").unwrap();

        let outcome = service.submit_answer("s1", 0).unwrap();
        match outcome {
            AnswerOutcome::PrescriptionUnavailable {
                health_problem,
                message,
            } => {
                assert_eq!(health_problem, "headache");
                assert_eq!(message, NO_PRESCRIPTION_MESSAGE);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(service.registry().get("s1").is_err());
    }

    #[test]
    fn test_blank_prescription_is_unavailable() {
        let mut catalog = headache_catalog();
        let ruleset = catalog.rulesets.get_mut("headache").unwrap();
        ruleset
            .rules
            .insert("severe_pain".into(), Prescription(serde_json::Value::Null));
        let service = service(catalog);
        service.identify("s1", "headache").unwrap();

        let outcome = service.submit_answer("s1", 1).unwrap();
        assert!(matches!(outcome, AnswerOutcome::PrescriptionUnavailable { .. }));
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "prescription_unavailable");
        assert!(service.registry().is_empty().unwrap());
    }

    #[test]
    fn test_unknown_session_is_repeatable() {
        let service = service(headache_catalog());
        for _ in 0..3 {
            let outcome = service.submit_answer("missing", 0).unwrap();
            assert_eq!(
                outcome,
                AnswerOutcome::SessionNotFound {
                    message: SESSION_EXPIRED_MESSAGE.into()
                }
            );
        }
        assert!(service.registry().is_empty().unwrap());
    }

    #[test]
    fn test_invalid_index_is_rejected_without_side_effects() {
        let service = service(headache_catalog());
        service.identify("s1", "headache").unwrap();

        let result = service.submit_answer("s1", 5);
        assert!(matches!(result, Err(Error::InvalidIndex { index: 5, options: 2 })));

        let session = service.registry().get("s1").unwrap();
        assert_eq!(session.cursor(), 0);
        assert!(session.answers().is_empty());

        // The session is still usable afterwards
        assert!(matches!(
            service.submit_answer("s1", 1).unwrap(),
            AnswerOutcome::Prescription { .. }
        ));
    }

    #[test]
    fn test_full_dialog_on_default_catalog() {
        let service = service(build_default_catalog());
        let outcome = service.identify("s1", "I've had a fever since yesterday").unwrap();
        match outcome {
            IdentifyOutcome::Question { health_problem, .. } => assert_eq!(health_problem, "fever"),
            other => panic!("unexpected outcome: {:?}", other),
        }

        let outcome = service.submit_answer("s1", 1).unwrap();
        match outcome {
            AnswerOutcome::Question { question } => {
                assert_eq!(question.question_number, 2);
                assert_eq!(question.total_questions, 2);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        // high_fever (question 1) outranks red_flag (question 2)
        match service.submit_answer("s1", 0).unwrap() {
            AnswerOutcome::Prescription { prescription, .. } => {
                assert_eq!(prescription.0["medication"], "Ibuprofen 400mg");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_stale_submission_is_rejected() {
        let service = service(build_default_catalog());
        service.identify("s1", "fever").unwrap();

        service.submit_answer_for("s1", 1, 0).unwrap();
        let stale = service.submit_answer_for("s1", 1, 1);
        assert!(matches!(stale, Err(Error::ConcurrentModification { .. })));
        assert_eq!(service.registry().get("s1").unwrap().cursor(), 1);
    }

    #[test]
    fn test_identify_again_restarts_session() {
        let service = service(build_default_catalog());
        service.identify("s1", "headache").unwrap();
        service.submit_answer("s1", 0).unwrap();

        service.identify("s1", "cough").unwrap();
        let session = service.registry().get("s1").unwrap();
        assert_eq!(session.problem_id, "cough");
        assert_eq!(session.cursor(), 0);
    }

    #[test]
    fn test_idle_sessions_are_swept_on_identify() {
        crate::logging::init_test();
        let registry = Arc::new(SessionRegistry::new());
        let service = TriageService::with_options(
            Arc::new(build_default_catalog()),
            Arc::clone(&registry),
            ServiceOptions {
                idle_timeout: Some(Duration::zero()),
            },
        );

        service.identify("old", "headache").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        service.identify("new", "cough").unwrap();

        assert!(registry.get("old").is_err());
        assert!(registry.get("new").is_ok());
    }

    #[test]
    fn test_idle_session_is_swept_before_answer() {
        crate::logging::init_test();
        let registry = Arc::new(SessionRegistry::new());
        let service = TriageService::with_options(
            Arc::new(build_default_catalog()),
            Arc::clone(&registry),
            ServiceOptions {
                idle_timeout: Some(Duration::zero()),
            },
        );

        service.identify("s1", "headache").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));

        let outcome = service.submit_answer("s1", 0).unwrap();
        assert_eq!(
            outcome,
            AnswerOutcome::SessionNotFound {
                message: SESSION_EXPIRED_MESSAGE.into()
            }
        );
        assert!(registry.is_empty().unwrap());
    }

    #[test]
    fn test_active_session_survives_sweep_on_answer() {
        crate::logging::init_test();
        let service = TriageService::with_options(
            Arc::new(build_default_catalog()),
            Arc::new(SessionRegistry::new()),
            ServiceOptions {
                idle_timeout: Some(Duration::minutes(30)),
            },
        );

        service.identify("s1", "headache").unwrap();
        let outcome = service.submit_answer("s1", 0).unwrap();
        assert!(matches!(outcome, AnswerOutcome::Question { .. }));
    }

    #[test]
    fn test_list_problems_in_load_order() {
        let service = service(build_default_catalog());
        assert_eq!(
            service.list_problems(),
            vec!["headache", "fever", "stomach pain", "cough", "back pain"]
        );
    }

    #[test]
    fn test_outcome_json_uses_status_tags() {
        let service = service(headache_catalog());
        let outcome = service.identify("s1", "migraine").unwrap();
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "questions");
        assert_eq!(json["health_problem"], "headache");
        assert_eq!(json["question"], "How bad is it?");
        assert_eq!(json["question_number"], 1);
        assert_eq!(json["options"][1]["label"], "severe");

        let outcome = service.submit_answer("s1", 1).unwrap();
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "prescription");
        assert_eq!(json["prescription"], "see a doctor");

        let outcome = service.submit_answer("s1", 1).unwrap();
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "session_not_found");
    }
}
