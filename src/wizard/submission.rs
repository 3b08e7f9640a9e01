//! Turns a finished wizard into the backend payload and sends it.
//!
//! Validation always runs before the first request, so a malformed payload
//! never reaches the wire. Self-evaluations rejected with 403 are retried
//! without the explicit teacher id, first on the same endpoint and then on the
//! session-based fallback endpoint. A 409 means the evaluation was already
//! submitted and counts as success.

use crate::api::PortalClient;
use crate::error::{PortalError, PortalResult, ValidationError};
use crate::models::{
    AnswerMap, EvaluationSubject, EvaluationType, Group, LaunchWindow, Question, Session,
};
use crate::parser::{portal_offset, value_to_f64};
use crate::wizard::completion;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::LazyLock;

static TIMESTAMP_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}$").expect("timestamp pattern is valid")
});

/// Round half away from zero at two decimals, on the value as written
/// (55.555 -> 55.56).
pub fn round2(value: f64) -> f64 {
    match format!("{}e2", value).parse::<f64>() {
        Ok(scaled) => scaled.round() / 100.0,
        Err(_) => (value * 100.0).round() / 100.0,
    }
}

/// Coerce a raw weight to a number in [0, 100] with two decimals. Missing or
/// non-finite values take the type's default.
pub fn sanitize_weight(raw: Option<&Value>, evaluation_type: EvaluationType) -> f64 {
    match raw.and_then(value_to_f64).filter(|w| w.is_finite()) {
        Some(weight) => round2(weight.clamp(0.0, 100.0)),
        None => evaluation_type.default_weight(),
    }
}

/// Mean of every score across questions and groups, two decimals; 0 when empty.
pub fn compute_grade(answers: &AnswerMap) -> f64 {
    let (sum, count) = answers
        .values()
        .flat_map(|scores| scores.values())
        .fold((0u64, 0u64), |(sum, count), score| (sum + u64::from(*score), count + 1));
    if count == 0 {
        0.0
    } else {
        round2(sum as f64 / count as f64)
    }
}

/// `YYYY-MM-DD HH:MM:SS` on the portal's UTC-6 clock, whatever the local zone.
pub fn portal_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&portal_offset())
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

pub fn check_timestamp(value: &str) -> Result<(), ValidationError> {
    if TIMESTAMP_FORMAT.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::TimestampFormat(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelfEvaluationPayload {
    #[serde(rename = "IDDocente", skip_serializing_if = "Option::is_none")]
    pub teacher_id: Option<String>,
    #[serde(rename = "IDEvaluador")]
    pub evaluator_id: String,
    #[serde(rename = "IDEvaluado")]
    pub evaluated_id: String,
    #[serde(rename = "IDLanzamiento", skip_serializing_if = "Option::is_none")]
    pub launch_id: Option<String>,
    #[serde(rename = "grupos")]
    pub group_ids: Vec<String>,
    #[serde(rename = "nombresGrupos")]
    pub group_names: Vec<String>,
    #[serde(rename = "respuestas")]
    pub answers: AnswerMap,
    #[serde(rename = "ponderacion")]
    pub weight: f64,
    #[serde(rename = "calificacion")]
    pub grade: f64,
    #[serde(rename = "comentarios")]
    pub comments: String,
}

impl SelfEvaluationPayload {
    /// Same payload without the explicit teacher id; the server infers it
    /// from the session.
    pub fn reduced(&self) -> Self {
        Self {
            teacher_id: None,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeanTeacherPayload {
    #[serde(rename = "IDEvaluador")]
    pub evaluator_id: String,
    #[serde(rename = "IDDocenteEvaluado")]
    pub evaluated_teacher_id: String,
    #[serde(rename = "IDLanzamiento")]
    pub launch_id: String,
    #[serde(rename = "grupos")]
    pub group_ids: Vec<String>,
    #[serde(rename = "materias")]
    pub subjects: Vec<String>,
    #[serde(rename = "modoMultiGrupo")]
    pub multi_group: bool,
    #[serde(rename = "respuestas")]
    pub answers: AnswerMap,
    #[serde(rename = "ponderacion")]
    pub weight: f64,
    #[serde(rename = "calificacion")]
    pub grade: f64,
    #[serde(rename = "comentarios")]
    pub comments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeanSelfPayload {
    #[serde(rename = "IDDecano")]
    pub dean_id: String,
    #[serde(rename = "IDLanzamiento")]
    pub launch_id: String,
    #[serde(rename = "fechaInicio")]
    pub started_at: String,
    #[serde(rename = "fechaFin")]
    pub finished_at: String,
    #[serde(rename = "respuestas")]
    pub answers: AnswerMap,
    #[serde(rename = "ponderacion")]
    pub weight: f64,
    #[serde(rename = "calificacion")]
    pub grade: f64,
    #[serde(rename = "comentarios")]
    pub comments: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    SelfEvaluation(SelfEvaluationPayload),
    DeanEvaluatesTeacher {
        payload: DeanTeacherPayload,
        /// Scored question ids every group must have answered.
        question_ids: Vec<String>,
    },
    DeanSelfEvaluation(DeanSelfPayload),
}

impl Payload {
    pub fn grade(&self) -> f64 {
        match self {
            Payload::SelfEvaluation(p) => p.grade,
            Payload::DeanEvaluatesTeacher { payload, .. } => payload.grade,
            Payload::DeanSelfEvaluation(p) => p.grade,
        }
    }

    /// Structural checks that must pass before anything is sent.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Payload::SelfEvaluation(p) => {
                if p.evaluator_id != p.evaluated_id {
                    return Err(ValidationError::IdentityMismatch {
                        evaluator: p.evaluator_id.clone(),
                        evaluated: p.evaluated_id.clone(),
                    });
                }
                if p.group_ids.len() != p.group_names.len() {
                    return Err(ValidationError::GroupArrayMismatch {
                        ids: p.group_ids.len(),
                        names: p.group_names.len(),
                    });
                }
                if p.group_ids.is_empty() {
                    return Err(ValidationError::NoGroups);
                }
                Ok(())
            }
            Payload::DeanEvaluatesTeacher {
                payload,
                question_ids,
            } => {
                if payload.group_ids.is_empty() {
                    return Err(ValidationError::NoGroups);
                }
                let mut missing: Vec<String> = Vec::new();
                for group_id in &payload.group_ids {
                    let answered_all = question_ids.iter().all(|q| {
                        payload
                            .answers
                            .get(q)
                            .is_some_and(|scores| scores.contains_key(group_id))
                    });
                    if !answered_all {
                        missing.push(group_id.clone());
                    }
                }
                if missing.is_empty() {
                    Ok(())
                } else {
                    Err(ValidationError::MissingGroupGrades { groups: missing })
                }
            }
            Payload::DeanSelfEvaluation(p) => {
                check_timestamp(&p.started_at)?;
                check_timestamp(&p.finished_at)
            }
        }
    }
}

/// Everything the assembler reads from a finished wizard.
#[derive(Debug, Clone)]
pub struct SubmissionInput<'a> {
    pub evaluation_type: EvaluationType,
    pub session: &'a Session,
    pub subject: &'a EvaluationSubject,
    pub questions: &'a [Question],
    pub answers: &'a AnswerMap,
    pub comments: &'a str,
    pub launch: &'a LaunchWindow,
    pub groups: &'a [Group],
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

pub fn build_payload(input: &SubmissionInput<'_>) -> Result<Payload, ValidationError> {
    if input.groups.is_empty() {
        return Err(ValidationError::NoGroups);
    }

    let weight = sanitize_weight(
        Some(&Value::from(input.launch.weight)),
        input.evaluation_type,
    );
    let grade = compute_grade(input.answers);
    let group_ids: Vec<String> = input.groups.iter().map(|g| g.id.clone()).collect();

    let payload = match input.evaluation_type {
        EvaluationType::SelfEvaluation => {
            if !completion::is_whole_form_complete(input.questions, input.answers, input.groups) {
                return Err(ValidationError::Incomplete);
            }
            let evaluated_id = input.subject.evaluated_id(input.session).to_string();
            Payload::SelfEvaluation(SelfEvaluationPayload {
                teacher_id: Some(evaluated_id.clone()),
                evaluator_id: input.session.user_id.clone(),
                evaluated_id,
                launch_id: input.launch.launch_id.clone(),
                group_ids,
                group_names: input.groups.iter().map(|g| g.name.clone()).collect(),
                answers: input.answers.clone(),
                weight,
                grade,
                comments: input.comments.trim().to_string(),
            })
        }
        EvaluationType::DeanEvaluatesTeacher => {
            let EvaluationSubject::Teacher(teacher) = input.subject else {
                return Err(ValidationError::IdentityMismatch {
                    evaluator: input.session.user_id.clone(),
                    evaluated: input.session.user_id.clone(),
                });
            };
            let launch_id = input
                .launch
                .launch_id
                .clone()
                .ok_or(ValidationError::MissingLaunch)?;
            Payload::DeanEvaluatesTeacher {
                payload: DeanTeacherPayload {
                    evaluator_id: input.session.user_id.clone(),
                    evaluated_teacher_id: teacher.id.clone(),
                    launch_id,
                    group_ids,
                    subjects: input
                        .groups
                        .iter()
                        .map(|g| g.subject.clone().unwrap_or_else(|| g.name.clone()))
                        .collect(),
                    multi_group: true,
                    answers: input.answers.clone(),
                    weight,
                    grade,
                    comments: input.comments.trim().to_string(),
                },
                question_ids: input
                    .questions
                    .iter()
                    .filter(|q| !q.is_comment())
                    .map(|q| q.id.clone())
                    .collect(),
            }
        }
        EvaluationType::DeanSelfEvaluation => {
            if !completion::is_whole_form_complete(input.questions, input.answers, input.groups) {
                return Err(ValidationError::Incomplete);
            }
            let launch_id = input
                .launch
                .launch_id
                .clone()
                .ok_or(ValidationError::MissingLaunch)?;
            Payload::DeanSelfEvaluation(DeanSelfPayload {
                dean_id: input.session.user_id.clone(),
                launch_id,
                started_at: portal_timestamp(input.started_at),
                finished_at: portal_timestamp(input.finished_at),
                answers: input.answers.clone(),
                weight,
                grade,
                comments: input.comments.trim().to_string(),
            })
        }
    };

    payload.validate()?;
    Ok(payload)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted,
    /// 409: someone already submitted this evaluation.
    AlreadyCompleted,
}

enum Attempt {
    Done(SubmitOutcome),
    Forbidden,
}

async fn attempt<B: Serialize>(
    client: &PortalClient,
    path: &str,
    body: &B,
    number: usize,
) -> PortalResult<Attempt> {
    let response = client.post_json(path, body).await?;
    tracing::info!(
        endpoint = path,
        attempt = number,
        status = response.status,
        "submission attempt"
    );
    match response.status {
        200..=299 => Ok(Attempt::Done(SubmitOutcome::Submitted)),
        409 => Ok(Attempt::Done(SubmitOutcome::AlreadyCompleted)),
        403 => Ok(Attempt::Forbidden),
        status => Err(PortalError::Status {
            url: path.to_string(),
            status,
            body: response.body.chars().take(500).collect(),
        }),
    }
}

/// Validate and send. At most three sequential requests, no delay between them.
pub async fn submit(client: &PortalClient, payload: &Payload) -> PortalResult<SubmitOutcome> {
    payload.validate()?;
    let endpoints = client.endpoints();

    match payload {
        Payload::SelfEvaluation(full) => {
            let reduced = full.reduced();
            let first = attempt(client, &endpoints.submit_self, full, 1).await?;
            if let Attempt::Done(outcome) = first {
                return Ok(outcome);
            }
            tracing::warn!("self-evaluation rejected with 403, retrying without teacher id");
            if let Attempt::Done(outcome) =
                attempt(client, &endpoints.submit_self, &reduced, 2).await?
            {
                return Ok(outcome);
            }
            tracing::warn!("self-evaluation rejected again, retrying on fallback endpoint");
            match attempt(client, &endpoints.submit_self_fallback, &reduced, 3).await? {
                Attempt::Done(outcome) => Ok(outcome),
                Attempt::Forbidden => Err(PortalError::Authorization {
                    endpoint: endpoints.submit_self_fallback.clone(),
                    attempts: 3,
                }),
            }
        }
        Payload::DeanEvaluatesTeacher { payload, .. } => {
            match attempt(client, &endpoints.submit_dean, payload, 1).await? {
                Attempt::Done(outcome) => Ok(outcome),
                Attempt::Forbidden => Err(PortalError::Authorization {
                    endpoint: endpoints.submit_dean.clone(),
                    attempts: 1,
                }),
            }
        }
        Payload::DeanSelfEvaluation(payload) => {
            match attempt(client, &endpoints.submit_dean_self, payload, 1).await? {
                Attempt::Done(outcome) => Ok(outcome),
                Attempt::Forbidden => Err(PortalError::Authorization {
                    endpoint: endpoints.submit_dean_self.clone(),
                    attempts: 1,
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Endpoints;
    use crate::models::{GroupScores, Role, Teacher};
    use chrono::TimeZone;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn scores(pairs: &[(&str, u8)]) -> GroupScores {
        pairs.iter().map(|(g, s)| (g.to_string(), *s)).collect()
    }

    fn groups() -> Vec<Group> {
        vec![
            Group {
                id: "g1".into(),
                name: "1A".into(),
                subject: Some("Cálculo".into()),
            },
            Group {
                id: "g2".into(),
                name: "2B".into(),
                subject: None,
            },
        ]
    }

    fn questions() -> Vec<Question> {
        vec![
            Question::scale("q1", "Uno"),
            Question::scale("q2", "Dos"),
            Question::comment(),
        ]
    }

    fn full_answers() -> AnswerMap {
        let mut answers = AnswerMap::new();
        answers.insert("q1".into(), scores(&[("g1", 10), ("g2", 8)]));
        answers.insert("q2".into(), scores(&[("g1", 6), ("g2", 8)]));
        answers
    }

    fn session(role: Role) -> Session {
        Session {
            user_id: "15".into(),
            name: "Ana".into(),
            role,
            token: "t".into(),
        }
    }

    fn launch() -> LaunchWindow {
        LaunchWindow {
            questionnaire_id: "2".into(),
            launch_id: Some("8".into()),
            start_at: None,
            end_at: None,
            weight: 70.0,
            cycle_label: None,
        }
    }

    fn input<'a>(
        evaluation_type: EvaluationType,
        session: &'a Session,
        subject: &'a EvaluationSubject,
        questions: &'a [Question],
        answers: &'a AnswerMap,
        launch: &'a LaunchWindow,
        groups: &'a [Group],
    ) -> SubmissionInput<'a> {
        SubmissionInput {
            evaluation_type,
            session,
            subject,
            questions,
            answers,
            comments: "  Buen semestre ",
            launch,
            groups,
            started_at: Utc.with_ymd_and_hms(2025, 5, 10, 2, 30, 0).unwrap(),
            finished_at: Utc.with_ymd_and_hms(2025, 5, 10, 3, 5, 9).unwrap(),
        }
    }

    #[test]
    fn test_sanitize_weight_boundaries() {
        let t = EvaluationType::SelfEvaluation;
        assert_eq!(sanitize_weight(Some(&json!(-5)), t), 0.0);
        assert_eq!(sanitize_weight(Some(&json!(150)), t), 100.0);
        assert_eq!(sanitize_weight(Some(&json!("NaN")), t), 70.0);
        let dean = EvaluationType::DeanEvaluatesTeacher;
        assert_eq!(sanitize_weight(Some(&json!("NaN")), dean), 30.0);
        assert_eq!(sanitize_weight(Some(&json!(55.555)), t), 55.56);
        assert_eq!(sanitize_weight(Some(&json!(" 42.1 ")), t), 42.1);
        assert_eq!(sanitize_weight(None, EvaluationType::DeanSelfEvaluation), 30.0);
        assert_eq!(format!("{:.2}", sanitize_weight(Some(&json!(-5)), t)), "0.00");
    }

    #[test]
    fn test_grade_is_mean_of_all_scores() {
        let mut answers = AnswerMap::new();
        answers.insert("q1".into(), scores(&[("g1", 10), ("g2", 8)]));
        answers.insert("q2".into(), scores(&[("g1", 6)]));
        assert_eq!(compute_grade(&answers), 8.0);
        assert_eq!(compute_grade(&AnswerMap::new()), 0.0);

        let mut answers = AnswerMap::new();
        answers.insert("q1".into(), scores(&[("g1", 10), ("g2", 9), ("g3", 9)]));
        assert_eq!(compute_grade(&answers), 9.33);
    }

    #[test]
    fn test_portal_timestamp_is_utc_minus_six() {
        let at = Utc.with_ymd_and_hms(2025, 5, 10, 2, 30, 0).unwrap();
        let stamp = portal_timestamp(at);
        assert_eq!(stamp, "2025-05-09 20:30:00");
        assert!(check_timestamp(&stamp).is_ok());
        assert!(check_timestamp("2025-05-09T20:30:00").is_err());
        assert!(check_timestamp("09/05/2025 20:30").is_err());
    }

    #[test]
    fn test_self_payload_shape() {
        let s = session(Role::Teacher);
        let (qs, answers, l, gs) = (questions(), full_answers(), launch(), groups());
        let payload = build_payload(&input(
            EvaluationType::SelfEvaluation,
            &s,
            &EvaluationSubject::Own,
            &qs,
            &answers,
            &l,
            &gs,
        ))
        .unwrap();

        let Payload::SelfEvaluation(p) = &payload else {
            panic!("expected self-evaluation payload");
        };
        assert_eq!(p.evaluator_id, p.evaluated_id);
        assert_eq!(p.group_ids, vec!["g1", "g2"]);
        assert_eq!(p.group_names, vec!["1A", "2B"]);
        assert_eq!(p.grade, 8.0);
        assert_eq!(p.comments, "Buen semestre");

        let body = serde_json::to_value(p).unwrap();
        assert_eq!(body["IDDocente"], json!("15"));
        assert_eq!(body["respuestas"]["q1"]["g2"], json!(8));
        let reduced = serde_json::to_value(p.reduced()).unwrap();
        assert!(reduced.get("IDDocente").is_none());
        assert_eq!(reduced["IDEvaluador"], json!("15"));
    }

    #[test]
    fn test_self_payload_rejects_other_subject() {
        let s = session(Role::Teacher);
        let other = EvaluationSubject::Teacher(Teacher {
            id: "99".into(),
            name: "Otro".into(),
        });
        let (qs, answers, l, gs) = (questions(), full_answers(), launch(), groups());
        let err = build_payload(&input(
            EvaluationType::SelfEvaluation,
            &s,
            &other,
            &qs,
            &answers,
            &l,
            &gs,
        ))
        .unwrap_err();
        assert!(matches!(err, ValidationError::IdentityMismatch { .. }));
    }

    #[test]
    fn test_dean_payload_requires_every_group() {
        let s = session(Role::Dean);
        let teacher = EvaluationSubject::Teacher(Teacher {
            id: "7".into(),
            name: "Luis".into(),
        });
        let (qs, l, gs) = (questions(), launch(), groups());
        let mut answers = full_answers();
        answers.insert("q2".into(), scores(&[("g1", 6)]));

        let err = build_payload(&input(
            EvaluationType::DeanEvaluatesTeacher,
            &s,
            &teacher,
            &qs,
            &answers,
            &l,
            &gs,
        ))
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingGroupGrades {
                groups: vec!["g2".into()]
            }
        );

        let answers = full_answers();
        let payload = build_payload(&input(
            EvaluationType::DeanEvaluatesTeacher,
            &s,
            &teacher,
            &qs,
            &answers,
            &l,
            &gs,
        ))
        .unwrap();
        let Payload::DeanEvaluatesTeacher { payload, .. } = payload else {
            panic!("expected dean payload");
        };
        let body = serde_json::to_value(&payload).unwrap();
        assert_eq!(body["modoMultiGrupo"], json!(true));
        assert_eq!(body["IDDocenteEvaluado"], json!("7"));
        assert_eq!(body["materias"], json!(["Cálculo", "2B"]));
    }

    #[test]
    fn test_dean_self_payload_timestamps() {
        let s = session(Role::Dean);
        let (qs, l) = (questions(), launch());
        let gs = vec![Group {
            id: "decano".into(),
            name: "Decanato".into(),
            subject: None,
        }];
        let mut answers = AnswerMap::new();
        answers.insert("q1".into(), scores(&[("decano", 9)]));
        answers.insert("q2".into(), scores(&[("decano", 7)]));

        let payload = build_payload(&input(
            EvaluationType::DeanSelfEvaluation,
            &s,
            &EvaluationSubject::Own,
            &qs,
            &answers,
            &l,
            &gs,
        ))
        .unwrap();
        let Payload::DeanSelfEvaluation(p) = payload else {
            panic!("expected dean self payload");
        };
        assert_eq!(p.started_at, "2025-05-09 20:30:00");
        assert_eq!(p.finished_at, "2025-05-09 21:05:09");
        assert_eq!(p.grade, 8.0);
        assert_eq!(p.weight, 70.0);
    }

    #[test]
    fn test_incomplete_self_evaluation_rejected() {
        let s = session(Role::Teacher);
        let (qs, l, gs) = (questions(), launch(), groups());
        let mut answers = AnswerMap::new();
        answers.insert("q1".into(), scores(&[("g1", 10), ("g2", 8)]));
        let err = build_payload(&input(
            EvaluationType::SelfEvaluation,
            &s,
            &EvaluationSubject::Own,
            &qs,
            &answers,
            &l,
            &gs,
        ))
        .unwrap_err();
        assert_eq!(err, ValidationError::Incomplete);
    }

    fn self_payload() -> Payload {
        let s = session(Role::Teacher);
        let (qs, answers, l, gs) = (questions(), full_answers(), launch(), groups());
        build_payload(&input(
            EvaluationType::SelfEvaluation,
            &s,
            &EvaluationSubject::Own,
            &qs,
            &answers,
            &l,
            &gs,
        ))
        .unwrap()
    }

    fn client_for(server: &Server) -> PortalClient {
        PortalClient::new(&server.url(), "t".into(), Endpoints::default()).unwrap()
    }

    #[tokio::test]
    async fn test_403_chain_succeeds_on_fallback() {
        let mut server = Server::new_async().await;
        let full = server
            .mock("POST", "/evaluaciones/autoevaluacion")
            .match_body(Matcher::PartialJson(json!({"IDDocente": "15"})))
            .with_status(403)
            .expect(1)
            .create_async()
            .await;
        let reduced = server
            .mock("POST", "/evaluaciones/autoevaluacion")
            .with_status(403)
            .expect(1)
            .create_async()
            .await;
        let fallback = server
            .mock("POST", "/evaluaciones/autoevaluacion/sesion")
            .with_status(201)
            .expect(1)
            .create_async()
            .await;

        let outcome = submit(&client_for(&server), &self_payload()).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Submitted);
        full.assert_async().await;
        reduced.assert_async().await;
        fallback.assert_async().await;
    }

    #[tokio::test]
    async fn test_403_chain_exhausted_is_authorization_error() {
        let mut server = Server::new_async().await;
        let primary = server
            .mock("POST", "/evaluaciones/autoevaluacion")
            .with_status(403)
            .expect(2)
            .create_async()
            .await;
        let fallback = server
            .mock("POST", "/evaluaciones/autoevaluacion/sesion")
            .with_status(403)
            .expect(1)
            .create_async()
            .await;

        let err = submit(&client_for(&server), &self_payload()).await.unwrap_err();
        assert!(matches!(err, PortalError::Authorization { attempts: 3, .. }));
        primary.assert_async().await;
        fallback.assert_async().await;
    }

    #[tokio::test]
    async fn test_409_is_already_completed() {
        let mut server = Server::new_async().await;
        let primary = server
            .mock("POST", "/evaluaciones/autoevaluacion")
            .with_status(409)
            .expect(1)
            .create_async()
            .await;

        let outcome = submit(&client_for(&server), &self_payload()).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::AlreadyCompleted);
        primary.assert_async().await;
    }

    #[tokio::test]
    async fn test_invalid_payload_never_sent() {
        let mut server = Server::new_async().await;
        let never = server
            .mock("POST", Matcher::Any)
            .with_status(200)
            .expect(0)
            .create_async()
            .await;

        let Payload::SelfEvaluation(mut p) = self_payload() else {
            unreachable!()
        };
        p.group_names.pop();
        let err = submit(&client_for(&server), &Payload::SelfEvaluation(p))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PortalError::Validation(ValidationError::GroupArrayMismatch { .. })
        ));
        never.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_is_fatal_without_retry() {
        let mut server = Server::new_async().await;
        let primary = server
            .mock("POST", "/evaluaciones/autoevaluacion")
            .with_status(500)
            .expect(1)
            .create_async()
            .await;

        let err = submit(&client_for(&server), &self_payload()).await.unwrap_err();
        assert!(matches!(err, PortalError::Status { status: 500, .. }));
        primary.assert_async().await;
    }

    #[tokio::test]
    async fn test_409_on_reduced_retry_stops_chain() {
        let mut server = Server::new_async().await;
        let full = server
            .mock("POST", "/evaluaciones/autoevaluacion")
            .match_body(Matcher::PartialJson(json!({"IDDocente": "15"})))
            .with_status(403)
            .expect(1)
            .create_async()
            .await;
        let reduced = server
            .mock("POST", "/evaluaciones/autoevaluacion")
            .with_status(409)
            .expect(1)
            .create_async()
            .await;
        let fallback = server
            .mock("POST", "/evaluaciones/autoevaluacion/sesion")
            .with_status(201)
            .expect(0)
            .create_async()
            .await;

        let outcome = submit(&client_for(&server), &self_payload()).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::AlreadyCompleted);
        full.assert_async().await;
        reduced.assert_async().await;
        fallback.assert_async().await;
    }

    #[tokio::test]
    async fn test_409_on_fallback_is_already_completed() {
        let mut server = Server::new_async().await;
        let primary = server
            .mock("POST", "/evaluaciones/autoevaluacion")
            .with_status(403)
            .expect(2)
            .create_async()
            .await;
        let fallback = server
            .mock("POST", "/evaluaciones/autoevaluacion/sesion")
            .with_status(409)
            .expect(1)
            .create_async()
            .await;

        let outcome = submit(&client_for(&server), &self_payload()).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::AlreadyCompleted);
        primary.assert_async().await;
        fallback.assert_async().await;
    }

    /// Self-evaluation endpoints that a dean submission must never hit.
    async fn self_paths_untouched(server: &mut Server) -> [mockito::Mock; 2] {
        let primary = server
            .mock("POST", "/evaluaciones/autoevaluacion")
            .expect(0)
            .create_async()
            .await;
        let fallback = server
            .mock("POST", "/evaluaciones/autoevaluacion/sesion")
            .expect(0)
            .create_async()
            .await;
        [primary, fallback]
    }

    #[tokio::test]
    async fn test_dean_403_is_not_retried() {
        let s = session(Role::Dean);
        let teacher = EvaluationSubject::Teacher(Teacher {
            id: "7".into(),
            name: "Luis".into(),
        });
        let (qs, answers, l, gs) = (questions(), full_answers(), launch(), groups());
        let payload = build_payload(&input(
            EvaluationType::DeanEvaluatesTeacher,
            &s,
            &teacher,
            &qs,
            &answers,
            &l,
            &gs,
        ))
        .unwrap();

        let mut server = Server::new_async().await;
        let dean = server
            .mock("POST", "/evaluaciones/decano/docente")
            .with_status(403)
            .expect(1)
            .create_async()
            .await;
        let untouched = self_paths_untouched(&mut server).await;

        let err = submit(&client_for(&server), &payload).await.unwrap_err();
        assert!(matches!(err, PortalError::Authorization { attempts: 1, .. }));
        dean.assert_async().await;
        for mock in &untouched {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn test_dean_self_403_is_not_retried() {
        let s = session(Role::Dean);
        let (qs, l) = (questions(), launch());
        let gs = vec![Group {
            id: "decano".into(),
            name: "Decanato".into(),
            subject: None,
        }];
        let mut answers = AnswerMap::new();
        answers.insert("q1".into(), scores(&[("decano", 9)]));
        answers.insert("q2".into(), scores(&[("decano", 7)]));
        let payload = build_payload(&input(
            EvaluationType::DeanSelfEvaluation,
            &s,
            &EvaluationSubject::Own,
            &qs,
            &answers,
            &l,
            &gs,
        ))
        .unwrap();

        let mut server = Server::new_async().await;
        let dean_self = server
            .mock("POST", "/evaluaciones/decano/autoevaluacion")
            .with_status(403)
            .expect(1)
            .create_async()
            .await;
        let untouched = self_paths_untouched(&mut server).await;

        let err = submit(&client_for(&server), &payload).await.unwrap_err();
        assert!(matches!(err, PortalError::Authorization { attempts: 1, .. }));
        dean_self.assert_async().await;
        for mock in &untouched {
            mock.assert_async().await;
        }
    }
}
