//! The evaluation wizard: loading, gating, answering, drafts and submission.

pub mod completion;
pub mod draft;
pub mod gate;
pub mod loader;
pub mod navigator;
pub mod sequence;
pub mod submission;

use crate::api::PortalClient;
use crate::error::{PortalResult, ValidationError};
use crate::models::{
    EvaluationSubject, EvaluationType, Group, LaunchWindow, Question, Session, SubjectKey,
};
use chrono::{DateTime, Utc};
use draft::{CompletionMarks, DraftStore};
use navigator::Navigator;
use submission::{Payload, SubmissionInput, SubmitOutcome};

/// What a wizard needs to start.
#[derive(Debug, Clone)]
pub struct WizardSetup {
    pub evaluation_type: EvaluationType,
    pub subject: EvaluationSubject,
    pub launch: LaunchWindow,
    pub questions: Vec<Question>,
    pub groups: Vec<Group>,
}

/// A finished submission, with the answers as they were sent.
#[derive(Debug, Clone)]
pub struct SubmissionReport {
    pub outcome: SubmitOutcome,
    pub grade: f64,
    pub answered: Navigator,
}

/// Navigator plus write-through persistence for one evaluation subject.
pub struct Wizard {
    evaluation_type: EvaluationType,
    subject: EvaluationSubject,
    subject_key: SubjectKey,
    mark_key: String,
    launch: LaunchWindow,
    navigator: Navigator,
    drafts: DraftStore,
    marks: CompletionMarks,
    started_at: DateTime<Utc>,
    resumed: bool,
}

impl Wizard {
    /// Start fresh, or resume the saved draft for this subject.
    pub fn open(
        session: &Session,
        setup: WizardSetup,
        drafts: DraftStore,
        marks: CompletionMarks,
    ) -> PortalResult<Self> {
        let WizardSetup {
            evaluation_type,
            subject,
            launch,
            questions,
            groups,
        } = setup;

        let subject_key = subject.subject_key(evaluation_type);
        let mark_key = draft::mark_key(evaluation_type, &subject, session);

        let (navigator, resumed) = match drafts.load(&subject_key, &groups)? {
            Some(saved) => {
                tracing::info!(subject = subject_key.as_str(), "resuming saved draft");
                (Navigator::restore(questions, groups, saved), true)
            }
            None => (Navigator::new(questions, groups), false),
        };

        Ok(Self {
            evaluation_type,
            subject,
            subject_key,
            mark_key,
            launch,
            navigator,
            drafts,
            marks,
            started_at: Utc::now(),
            resumed,
        })
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn evaluation_type(&self) -> EvaluationType {
        self.evaluation_type
    }

    pub fn subject(&self) -> &EvaluationSubject {
        &self.subject
    }

    pub fn launch(&self) -> &LaunchWindow {
        &self.launch
    }

    pub fn was_resumed(&self) -> bool {
        self.resumed
    }

    fn persist(&self) {
        let draft = self.navigator.draft();
        if draft.is_empty() {
            return;
        }
        if let Err(err) = self.drafts.save(&self.subject_key, &draft) {
            tracing::warn!(
                subject = self.subject_key.as_str(),
                error = %err,
                "could not save draft"
            );
        }
    }

    pub fn answer(
        &mut self,
        question_id: &str,
        group_id: &str,
        score: i64,
    ) -> Result<(), ValidationError> {
        self.navigator.answer(question_id, group_id, score)?;
        self.persist();
        Ok(())
    }

    pub fn set_comments(&mut self, comments: impl Into<String>) {
        self.navigator.set_comments(comments);
        self.persist();
    }

    pub fn advance(&mut self) -> bool {
        let moved = self.navigator.advance();
        if moved {
            self.persist();
        }
        moved
    }

    pub fn back(&mut self) -> bool {
        let moved = self.navigator.back();
        if moved {
            self.persist();
        }
        moved
    }

    pub fn jump_to(&mut self, question_id: &str) -> bool {
        let moved = self.navigator.jump_to(question_id);
        if moved {
            self.persist();
        }
        moved
    }

    /// Discard all answers for this subject and start over.
    pub fn reset(&mut self) -> PortalResult<()> {
        self.drafts.clear(&self.subject_key)?;
        self.navigator.reset();
        self.started_at = Utc::now();
        Ok(())
    }

    pub fn payload(
        &self,
        session: &Session,
        now: DateTime<Utc>,
    ) -> Result<Payload, ValidationError> {
        submission::build_payload(&SubmissionInput {
            evaluation_type: self.evaluation_type,
            session,
            subject: &self.subject,
            questions: self.navigator.questions(),
            answers: self.navigator.answers(),
            comments: self.navigator.comments(),
            launch: &self.launch,
            groups: self.navigator.groups(),
            started_at: self.started_at,
            finished_at: now,
        })
    }

    /// Validate, send, and on success (including "already submitted") mark
    /// the evaluation done, drop the draft and reset. On failure the draft is
    /// left untouched.
    pub async fn submit(
        &mut self,
        client: &PortalClient,
        session: &Session,
    ) -> PortalResult<SubmissionReport> {
        let payload = self.payload(session, Utc::now())?;
        let outcome = match submission::submit(client, &payload).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(
                    subject = self.subject_key.as_str(),
                    error = %err,
                    "submission failed"
                );
                return Err(err);
            }
        };

        let report = SubmissionReport {
            outcome,
            grade: payload.grade(),
            answered: self.navigator.clone(),
        };
        self.finish();
        Ok(report)
    }

    /// The backend has the evaluation; local bookkeeping failures are only logged.
    fn finish(&mut self) {
        if let Err(err) = self.marks.set(&self.mark_key, true) {
            tracing::warn!(key = %self.mark_key, error = %err, "could not store completion mark");
        }
        if let Err(err) = self.drafts.clear(&self.subject_key) {
            tracing::warn!(
                subject = self.subject_key.as_str(),
                error = %err,
                "could not clear submitted draft"
            );
        }
        self.navigator.reset();
    }

    /// Authoritative "already done?" check for this wizard's subject.
    pub async fn already_completed(&self, client: &PortalClient, session: &Session) -> bool {
        let Some(launch_id) = self.launch.launch_id.as_deref() else {
            return self.marks.is_marked(&self.mark_key);
        };
        self.marks
            .confirm(client, &self.mark_key, self.subject.evaluated_id(session), launch_id)
            .await
    }
}
