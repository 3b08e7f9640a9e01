//! Figures out which questionnaire and launch apply to an evaluation type and
//! loads its questions.
//!
//! Matching falls back in a fixed order: questionnaire by role tag, then a
//! fixed id per type; launch by questionnaire id, then by a type-specific
//! keyword in its description. An unrelated launch is never used.

use crate::api::{PortalClient, QuestionsFetch};
use crate::error::PortalResult;
use crate::models::{
    EvaluationSubject, EvaluationType, GateState, Group, LaunchWindow, Question, RawLaunch,
    RawQuestionnaire, Session, Teacher,
};
use crate::parser::{self, fold_text, value_to_id};
use crate::wizard::gate;
use crate::wizard::submission::sanitize_weight;
use chrono::{DateTime, Utc};

/// Group id used for the dean's self-evaluation, which has no course sections.
pub const DEAN_SELF_GROUP_ID: &str = "decano";

#[derive(Debug, Clone)]
pub struct Resolution {
    pub questions: Vec<Question>,
    pub launch: LaunchWindow,
    pub has_launch: bool,
    pub enabled: bool,
    /// Administrator message when evaluations are switched off.
    pub notice: Option<String>,
    /// Set when loading failed and the defaults below are in use.
    pub error: Option<String>,
}

impl Resolution {
    fn fallback(evaluation_type: EvaluationType, error: Option<String>) -> Self {
        Self {
            questions: Vec::new(),
            launch: LaunchWindow {
                questionnaire_id: evaluation_type.default_questionnaire_id().to_string(),
                launch_id: None,
                start_at: None,
                end_at: None,
                weight: evaluation_type.default_weight(),
                cycle_label: None,
            },
            has_launch: false,
            enabled: true,
            notice: None,
            error,
        }
    }

    pub fn gate(&self, now: DateTime<Utc>) -> GateState {
        gate::gate_for(self.has_launch.then_some(&self.launch), self.enabled, now)
    }

    /// Whether the wizard may be opened at all.
    pub fn can_proceed(&self, now: DateTime<Utc>) -> bool {
        self.error.is_none() && self.gate(now) == GateState::Open
    }
}

fn role_matches(evaluation_type: EvaluationType, questionnaire: &RawQuestionnaire) -> bool {
    questionnaire
        .evaluator_role
        .as_deref()
        .is_some_and(|role| role.trim().eq_ignore_ascii_case(evaluation_type.role_tag()))
}

fn name_preferred(evaluation_type: EvaluationType, questionnaire: &RawQuestionnaire) -> bool {
    let name = fold_text(questionnaire.name.as_deref().unwrap_or_default());
    match evaluation_type {
        EvaluationType::SelfEvaluation => true,
        EvaluationType::DeanEvaluatesTeacher => {
            name.contains("decano") && !name.contains("autoevaluacion")
        }
        EvaluationType::DeanSelfEvaluation => {
            name.contains("decano") && name.contains("autoevaluacion")
        }
    }
}

pub fn select_questionnaire(
    evaluation_type: EvaluationType,
    questionnaires: &[RawQuestionnaire],
) -> Option<&RawQuestionnaire> {
    let candidates: Vec<&RawQuestionnaire> = questionnaires
        .iter()
        .filter(|q| role_matches(evaluation_type, q))
        .collect();

    candidates
        .iter()
        .find(|q| name_preferred(evaluation_type, q))
        .or_else(|| candidates.first())
        .copied()
}

/// Keyword test on a launch's free-text description.
pub fn description_matches(evaluation_type: EvaluationType, description: &str) -> bool {
    let text = fold_text(description);
    match evaluation_type {
        EvaluationType::SelfEvaluation => {
            text.contains("autoevaluacion") && text.contains("docente") && !text.contains("decano")
        }
        EvaluationType::DeanEvaluatesTeacher => {
            text.contains("decano") && !text.contains("autoevaluacion")
        }
        EvaluationType::DeanSelfEvaluation => {
            text.contains("decano") && text.contains("autoevaluacion")
        }
    }
}

pub fn select_launch<'a>(
    evaluation_type: EvaluationType,
    questionnaire_id: &str,
    launches: &'a [RawLaunch],
) -> Option<&'a RawLaunch> {
    let by_id = launches.iter().find(|launch| {
        launch
            .questionnaire_id
            .as_ref()
            .and_then(value_to_id)
            .is_some_and(|id| id == questionnaire_id)
    });
    if by_id.is_some() {
        return by_id;
    }

    let by_keyword = launches.iter().find(|launch| {
        launch
            .description
            .as_deref()
            .is_some_and(|d| description_matches(evaluation_type, d))
    });
    if let Some(launch) = by_keyword {
        tracing::warn!(
            questionnaire_id,
            launch = ?launch.id,
            "no launch matched by questionnaire id, using description match"
        );
    }
    by_keyword
}

pub async fn resolve(client: &PortalClient, evaluation_type: EvaluationType) -> Resolution {
    let questionnaires = match client.list_questionnaires().await {
        Ok(list) => list,
        Err(err) => {
            tracing::error!(error = %err, "failed to load questionnaires");
            return Resolution::fallback(evaluation_type, Some(err.to_string()));
        }
    };

    let selected = select_questionnaire(evaluation_type, &questionnaires);
    let selected = selected.and_then(|q| value_to_id(&q.id).map(|id| (id, q)));
    let (questionnaire_id, weight) = match selected {
        Some((id, questionnaire)) => (
            id,
            sanitize_weight(questionnaire.weight.as_ref(), evaluation_type),
        ),
        None => {
            let id = evaluation_type.default_questionnaire_id();
            tracing::warn!(
                evaluation = evaluation_type.label(),
                questionnaire_id = id,
                "no questionnaire matched, using default id"
            );
            (id.to_string(), evaluation_type.default_weight())
        }
    };

    let launches = match client.list_launches().await {
        Ok(list) => list,
        Err(err) => {
            tracing::error!(error = %err, "failed to load launches");
            return Resolution::fallback(evaluation_type, Some(err.to_string()));
        }
    };

    let Some(raw_launch) = select_launch(evaluation_type, &questionnaire_id, &launches) else {
        tracing::info!(evaluation = evaluation_type.label(), "no applicable launch");
        let mut resolution = Resolution::fallback(evaluation_type, None);
        resolution.launch.questionnaire_id = questionnaire_id;
        resolution.launch.weight = weight;
        return resolution;
    };
    let launch = parser::launch_window(raw_launch, &questionnaire_id, weight);

    match client.fetch_questions(&questionnaire_id).await {
        Ok(QuestionsFetch::Loaded(response)) => Resolution {
            questions: parser::parse_questions(&response),
            launch,
            has_launch: true,
            enabled: true,
            notice: None,
            error: None,
        },
        Ok(QuestionsFetch::Disabled { message }) => {
            tracing::info!(?message, "evaluations disabled by administrator");
            Resolution {
                questions: Vec::new(),
                launch,
                has_launch: true,
                enabled: false,
                notice: message,
                error: None,
            }
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to load questions");
            Resolution::fallback(evaluation_type, Some(err.to_string()))
        }
    }
}

/// Groups the evaluation is answered for.
pub async fn subject_groups(
    client: &PortalClient,
    evaluation_type: EvaluationType,
    subject: &EvaluationSubject,
    session: &Session,
) -> PortalResult<Vec<Group>> {
    if evaluation_type == EvaluationType::DeanSelfEvaluation {
        return Ok(vec![Group {
            id: DEAN_SELF_GROUP_ID.to_string(),
            name: "Decanato".to_string(),
            subject: None,
        }]);
    }
    let raw = client.list_groups(subject.evaluated_id(session)).await?;
    Ok(parser::normalize_groups(&raw))
}

pub async fn faculty_teachers(client: &PortalClient) -> PortalResult<Vec<Teacher>> {
    let raw = client.list_faculty_teachers().await?;
    Ok(parser::normalize_teachers(&raw))
}
