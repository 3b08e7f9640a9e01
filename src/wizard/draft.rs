//! Local persistence of in-progress answers, and of "already submitted" marks.

use crate::api::PortalClient;
use crate::error::PortalResult;
use crate::models::{
    AnswerMap, Draft, EvaluationSubject, EvaluationType, Group, GroupScores, Session, SubjectKey,
};
use crate::storage::KeyValueStore;
use crate::wizard::navigator::{MAX_SCORE, MIN_SCORE};
use serde_json::Value;
use std::sync::Arc;

fn answers_key(subject: &SubjectKey) -> String {
    format!("respuestas_{}", subject.as_str())
}

fn pointer_key(subject: &SubjectKey) -> String {
    format!("actual_{}", subject.as_str())
}

fn comments_key(subject: &SubjectKey) -> String {
    format!("comentarios_{}", subject.as_str())
}

fn valid_score(value: &Value) -> Option<u8> {
    let score = value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))?;
    (MIN_SCORE..=MAX_SCORE).contains(&score).then_some(score as u8)
}

/// Read stored answers, expanding the legacy single-group shape
/// (`{"q1": 8}`) into one score per current group.
fn decode_answers(raw: &str, groups: &[Group]) -> AnswerMap {
    let parsed: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(error = %err, "ignoring unreadable stored answers");
            return AnswerMap::new();
        }
    };
    let Value::Object(entries) = parsed else {
        tracing::warn!("ignoring stored answers that are not an object");
        return AnswerMap::new();
    };

    let mut answers = AnswerMap::new();
    for (question_id, value) in entries {
        let scores: GroupScores = match &value {
            Value::Object(per_group) => per_group
                .iter()
                .filter_map(|(group_id, score)| valid_score(score).map(|s| (group_id.clone(), s)))
                .collect(),
            legacy => match valid_score(legacy) {
                Some(score) => {
                    tracing::info!(question = %question_id, "migrating single-group draft answer");
                    groups.iter().map(|g| (g.id.clone(), score)).collect()
                }
                None => GroupScores::new(),
            },
        };
        if !scores.is_empty() {
            answers.insert(question_id, scores);
        }
    }
    answers
}

#[derive(Clone)]
pub struct DraftStore {
    store: Arc<dyn KeyValueStore>,
}

impl DraftStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// The pointer is written last, so a partial save never points past the
    /// stored answers.
    pub fn save(&self, subject: &SubjectKey, draft: &Draft) -> PortalResult<()> {
        let answers = serde_json::to_string(&draft.answers)?;
        self.store.set(&answers_key(subject), &answers)?;
        self.store.set(&comments_key(subject), &draft.comments)?;
        match &draft.current_question_id {
            Some(id) => self.store.set(&pointer_key(subject), id)?,
            None => self.store.remove(&pointer_key(subject))?,
        }
        Ok(())
    }

    /// `None` when nothing was ever saved for this subject.
    pub fn load(&self, subject: &SubjectKey, groups: &[Group]) -> PortalResult<Option<Draft>> {
        let answers = self.store.get(&answers_key(subject))?;
        let pointer = self.store.get(&pointer_key(subject))?;
        let comments = self.store.get(&comments_key(subject))?;

        if answers.is_none() && pointer.is_none() && comments.is_none() {
            return Ok(None);
        }

        Ok(Some(Draft {
            answers: answers
                .map(|raw| decode_answers(&raw, groups))
                .unwrap_or_default(),
            current_question_id: pointer.filter(|p| !p.trim().is_empty()),
            comments: comments.unwrap_or_default(),
        }))
    }

    pub fn clear(&self, subject: &SubjectKey) -> PortalResult<()> {
        self.store.remove(&answers_key(subject))?;
        self.store.remove(&pointer_key(subject))?;
        self.store.remove(&comments_key(subject))?;
        Ok(())
    }
}

/// Storage key of the "already submitted" mark for an evaluation.
pub fn mark_key(
    evaluation_type: EvaluationType,
    subject: &EvaluationSubject,
    session: &Session,
) -> String {
    match (evaluation_type, subject) {
        (_, EvaluationSubject::Teacher(teacher)) => format!(
            "evaluacion_docente_{}_completada_por_{}",
            teacher.id, session.user_id
        ),
        (EvaluationType::DeanSelfEvaluation, EvaluationSubject::Own) => {
            format!("evaluacion_decano_completada_{}", session.user_id)
        }
        (_, EvaluationSubject::Own) => {
            format!("evaluacion_docente_completada_{}", session.user_id)
        }
    }
}

/// Local cache of completed evaluations. The backend is authoritative
/// whenever it answers.
#[derive(Clone)]
pub struct CompletionMarks {
    store: Arc<dyn KeyValueStore>,
}

impl CompletionMarks {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn is_marked(&self, key: &str) -> bool {
        match self.store.get(key) {
            Ok(value) => value.as_deref() == Some("true"),
            Err(err) => {
                tracing::warn!(key, error = %err, "could not read completion mark");
                false
            }
        }
    }

    pub fn set(&self, key: &str, done: bool) -> PortalResult<()> {
        if done {
            self.store.set(key, "true")
        } else {
            self.store.remove(key)
        }
    }

    /// Ask the backend whether the evaluation is done, refreshing the mark.
    /// Falls back to the mark when the backend cannot be reached.
    pub async fn confirm(
        &self,
        client: &PortalClient,
        key: &str,
        subject_id: &str,
        launch_id: &str,
    ) -> bool {
        match client.verify_completion(subject_id, launch_id).await {
            Ok(done) => {
                if let Err(err) = self.set(key, done) {
                    tracing::warn!(key, error = %err, "could not update completion mark");
                }
                done
            }
            Err(err) => {
                let cached = self.is_marked(key);
                tracing::warn!(
                    key,
                    cached,
                    error = %err,
                    "completion check failed, using local mark"
                );
                cached
            }
        }
    }
}
