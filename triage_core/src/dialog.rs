//! Per-conversation dialog state machine.
//!
//! A [`Session`] walks a snapshot of one problem's question list in order,
//! recording the chosen option for each. States only move forward:
//!
//! ```text
//! AwaitingFirstQuestion -> InProgress -> Complete
//! ```
//!
//! A complete session is resolved by consuming it with [`Session::finish`];
//! there is no session left to be in a later state.

use crate::{AnswerOption, Catalog, Error, Question, Result};
use serde::Serialize;

/// Where a session is in its dialog
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DialogState {
    /// Created, no answer recorded yet
    AwaitingFirstQuestion,
    /// Some but not all questions answered
    InProgress,
    /// Every question answered; prescription not yet resolved
    Complete,
}

/// A question as presented to the user
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct QuestionPrompt {
    pub question: String,
    pub options: Vec<AnswerOption>,
    /// 1-based position of this question
    pub question_number: usize,
    pub total_questions: usize,
}

/// What follows a recorded answer
#[derive(Clone, Debug, PartialEq)]
pub enum NextStep {
    Question(QuestionPrompt),
    Complete,
}

/// Mutable state of one triage conversation
///
/// Only [`Session::start`] builds one, so `answers.len() == cursor` and
/// `cursor <= questions.len()` always hold.
#[derive(Clone, Debug)]
pub struct Session {
    pub session_id: String,
    pub problem_id: String,
    questions: Vec<Question>,
    cursor: usize,
    answers: Vec<AnswerOption>,
}

/// Answers of a session that reached `Complete`
#[derive(Clone, Debug)]
pub struct CompletedSession {
    pub session_id: String,
    pub problem_id: String,
    pub answers: Vec<AnswerOption>,
}

impl Session {
    /// Begin a dialog for `problem_id`
    ///
    /// Fails with [`Error::NoQuestions`] when the catalog has no questions
    /// for the problem; no session exists in that case.
    pub fn start(
        catalog: &Catalog,
        session_id: impl Into<String>,
        problem_id: &str,
    ) -> Result<(Self, QuestionPrompt)> {
        let questions = catalog
            .questions_for(problem_id)
            .ok_or_else(|| Error::NoQuestions(problem_id.to_string()))?;

        let session = Session {
            session_id: session_id.into(),
            problem_id: problem_id.to_string(),
            questions: questions.to_vec(),
            cursor: 0,
            answers: Vec::new(),
        };
        let first = session.prompt_at(0);

        tracing::info!(
            "Started session '{}' for '{}' with {} questions",
            session.session_id,
            session.problem_id,
            session.questions.len()
        );
        Ok((session, first))
    }

    pub fn state(&self) -> DialogState {
        if self.cursor == self.questions.len() {
            DialogState::Complete
        } else if self.cursor == 0 {
            DialogState::AwaitingFirstQuestion
        } else {
            DialogState::InProgress
        }
    }

    /// Index of the next question to answer
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    /// Options chosen so far, in question order
    pub fn answers(&self) -> &[AnswerOption] {
        &self.answers
    }

    pub fn current_question(&self) -> Result<&Question> {
        self.questions
            .get(self.cursor)
            .ok_or_else(|| Error::SessionComplete(self.session_id.clone()))
    }

    /// Record the option at `index` for the current question
    ///
    /// An out-of-range index or a finished session is rejected and leaves
    /// the session untouched.
    pub fn answer(&mut self, index: usize) -> Result<NextStep> {
        let question = self.current_question()?;
        let option = question
            .options
            .get(index)
            .cloned()
            .ok_or(Error::InvalidIndex {
                index,
                options: question.options.len(),
            })?;

        tracing::debug!(
            "Session '{}': question {} answered with '{}'",
            self.session_id,
            self.cursor + 1,
            option.label
        );
        self.answers.push(option);
        self.cursor += 1;

        if self.cursor < self.questions.len() {
            Ok(NextStep::Question(self.prompt_at(self.cursor)))
        } else {
            tracing::info!("Session '{}' answered all questions", self.session_id);
            Ok(NextStep::Complete)
        }
    }

    /// Like [`Session::answer`], but only if the session is still at
    /// `expected_cursor`
    ///
    /// Stale submissions fail with [`Error::ConcurrentModification`].
    pub fn answer_at(&mut self, expected_cursor: usize, index: usize) -> Result<NextStep> {
        if self.cursor != expected_cursor {
            return Err(Error::ConcurrentModification {
                session_id: self.session_id.clone(),
                expected: expected_cursor,
                actual: self.cursor,
            });
        }
        self.answer(index)
    }

    /// Consume a complete session, handing back its answers
    pub fn finish(self) -> Result<CompletedSession> {
        if self.state() != DialogState::Complete {
            return Err(Error::State(format!(
                "Session '{}' still has {} unanswered questions",
                self.session_id,
                self.questions.len().saturating_sub(self.cursor)
            )));
        }
        Ok(CompletedSession {
            session_id: self.session_id,
            problem_id: self.problem_id,
            answers: self.answers,
        })
    }

    fn prompt_at(&self, index: usize) -> QuestionPrompt {
        let question = &self.questions[index];
        QuestionPrompt {
            question: question.text.clone(),
            options: question.options.clone(),
            question_number: index + 1,
            total_questions: self.questions.len(),
        }
    }
}
