use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Portal API Models
// ============================================================================

/// Most list endpoints wrap their rows in `{ "db": [...] }`.
#[derive(Debug, Clone, Deserialize)]
pub struct DbEnvelope<T> {
    #[serde(default = "Vec::new")]
    pub db: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestionsResponse {
    #[serde(default)]
    pub preguntas: Vec<RawQuestion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawQuestion {
    #[serde(rename = "IDPregunta")]
    pub id: Value,
    #[serde(rename = "Pregunta", default)]
    pub text: String,
    #[serde(rename = "IDAspecto")]
    pub aspect_id: Option<Value>,
    #[serde(rename = "Aspecto")]
    pub aspect_name: Option<String>,
    #[serde(rename = "PonderacionAspecto")]
    pub aspect_weight: Option<Value>,
}

/// Body of a 403 on the questions endpoint when evaluations are switched off.
#[derive(Debug, Clone, Deserialize)]
pub struct DisabledResponse {
    #[serde(rename = "evaluacionesHabilitadas")]
    pub enabled: Option<bool>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawQuestionnaire {
    #[serde(rename = "IDCuestionario")]
    pub id: Value,
    #[serde(rename = "RolEvaluador")]
    pub evaluator_role: Option<String>,
    #[serde(rename = "Cuestionario")]
    pub name: Option<String>,
    #[serde(rename = "Ponderacion")]
    pub weight: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLaunch {
    #[serde(rename = "IDLanzamiento")]
    pub id: Value,
    #[serde(rename = "IDCuestionario")]
    pub questionnaire_id: Option<Value>,
    #[serde(rename = "Descripcion")]
    pub description: Option<String>,
    #[serde(rename = "Inicio")]
    pub start: Option<String>,
    #[serde(rename = "Final")]
    pub end: Option<String>,
    #[serde(rename = "Ciclo")]
    pub cycle: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyResponse {
    #[serde(rename = "yaRealizada", default)]
    pub already_done: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawGroup {
    #[serde(rename = "IDGrupo")]
    pub id: Value,
    #[serde(rename = "Grupo")]
    pub name: Option<String>,
    #[serde(rename = "Materia")]
    pub subject: Option<String>,
}

/// Teacher rows come from several backend views, each naming the id differently.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTeacher {
    #[serde(rename = "IDDocente")]
    pub teacher_id: Option<Value>,
    #[serde(rename = "IDReferencia")]
    pub reference_id: Option<Value>,
    #[serde(rename = "IDEmpleado")]
    pub employee_id: Option<Value>,
    #[serde(rename = "Nombre")]
    pub name: Option<String>,
    #[serde(rename = "NombreCompleto")]
    pub full_name: Option<String>,
}

// ============================================================================
// Domain Models
// ============================================================================

pub type QuestionId = String;
pub type GroupId = String;

/// Scores for one question, one entry per answered group.
pub type GroupScores = IndexMap<GroupId, u8>;

/// Question id -> group id -> score (1-10). The comment lives apart from this map.
pub type AnswerMap = IndexMap<QuestionId, GroupScores>;

/// Id of the synthetic free-text question appended to every questionnaire.
pub const COMMENT_QUESTION_ID: &str = "coment";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionKind {
    Scale,
    Comment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub text: String,
    pub kind: QuestionKind,
    pub aspect_id: Option<String>,
    pub aspect_name: Option<String>,
    pub aspect_weight: Option<f64>,
}

impl Question {
    #[cfg(test)]
    pub fn scale(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            kind: QuestionKind::Scale,
            aspect_id: None,
            aspect_name: None,
            aspect_weight: None,
        }
    }

    pub fn comment() -> Self {
        Self {
            id: COMMENT_QUESTION_ID.to_string(),
            text: "Comentarios adicionales".to_string(),
            kind: QuestionKind::Comment,
            aspect_id: None,
            aspect_name: None,
            aspect_weight: None,
        }
    }

    pub fn is_comment(&self) -> bool {
        self.kind == QuestionKind::Comment
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub subject: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Teacher {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvaluationType {
    /// A teacher evaluating their own performance.
    SelfEvaluation,
    /// A dean evaluating one teacher of the faculty.
    DeanEvaluatesTeacher,
    /// The dean's own self-evaluation (legacy submission path).
    DeanSelfEvaluation,
}

impl EvaluationType {
    pub fn label(&self) -> &'static str {
        match self {
            EvaluationType::SelfEvaluation => "Autoevaluación docente",
            EvaluationType::DeanEvaluatesTeacher => "Evaluación del decano al docente",
            EvaluationType::DeanSelfEvaluation => "Autoevaluación del decano",
        }
    }

    /// Value of `RolEvaluador` that marks a questionnaire as applicable.
    pub fn role_tag(&self) -> &'static str {
        match self {
            EvaluationType::SelfEvaluation => "DOCENTE",
            EvaluationType::DeanEvaluatesTeacher | EvaluationType::DeanSelfEvaluation => "DECANO",
        }
    }

    pub fn default_questionnaire_id(&self) -> &'static str {
        match self {
            EvaluationType::SelfEvaluation => "2",
            EvaluationType::DeanEvaluatesTeacher | EvaluationType::DeanSelfEvaluation => "3",
        }
    }

    pub fn default_weight(&self) -> f64 {
        match self {
            EvaluationType::SelfEvaluation => 70.0,
            EvaluationType::DeanEvaluatesTeacher | EvaluationType::DeanSelfEvaluation => 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationSubject {
    /// The logged-in user evaluates themself.
    Own,
    /// The logged-in dean evaluates this teacher.
    Teacher(Teacher),
}

impl EvaluationSubject {
    /// Namespace under which drafts for this subject are stored.
    pub fn subject_key(&self, evaluation_type: EvaluationType) -> SubjectKey {
        match (self, evaluation_type) {
            (EvaluationSubject::Teacher(teacher), _) => {
                SubjectKey(format!("evaluar_docente_{}", teacher.id))
            }
            (EvaluationSubject::Own, EvaluationType::DeanSelfEvaluation) => {
                SubjectKey("decano".to_string())
            }
            (EvaluationSubject::Own, _) => SubjectKey("docente".to_string()),
        }
    }

    /// Id of the person being evaluated.
    pub fn evaluated_id<'a>(&'a self, session: &'a Session) -> &'a str {
        match self {
            EvaluationSubject::Own => &session.user_id,
            EvaluationSubject::Teacher(teacher) => &teacher.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubjectKey(pub String);

impl SubjectKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Teacher,
    Dean,
}

impl Role {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "decano" | "dean" => Role::Dean,
            _ => Role::Teacher,
        }
    }

    pub fn evaluations(&self) -> &'static [EvaluationType] {
        match self {
            Role::Teacher => &[EvaluationType::SelfEvaluation],
            Role::Dean => &[
                EvaluationType::DeanEvaluatesTeacher,
                EvaluationType::DeanSelfEvaluation,
            ],
        }
    }
}

/// The authenticated user. Built once at startup and handed to whoever needs it.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub name: String,
    pub role: Role,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LaunchWindow {
    pub questionnaire_id: String,
    pub launch_id: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub weight: f64,
    pub cycle_label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    NotYetOpen,
    Open,
    Closed,
    /// Questionnaires switched off by an administrator, or no launch applies.
    Disabled,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub answers: AnswerMap,
    pub current_question_id: Option<QuestionId>,
    pub comments: String,
}

impl Draft {
    pub fn is_empty(&self) -> bool {
        self.answers.is_empty() && self.comments.is_empty()
    }
}
