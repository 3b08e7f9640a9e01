use thiserror::Error;

/// Structural problems found before a payload is sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no groups are associated with this evaluation")]
    NoGroups,
    #[error("evaluator id {evaluator} does not match evaluated id {evaluated}")]
    IdentityMismatch { evaluator: String, evaluated: String },
    #[error("group ids ({ids}) and group names ({names}) differ in length")]
    GroupArrayMismatch { ids: usize, names: usize },
    #[error("missing grade for one or more groups: {}", .groups.join(", "))]
    MissingGroupGrades { groups: Vec<String> },
    #[error("the questionnaire is not complete")]
    Incomplete,
    #[error("invalid timestamp '{0}', expected YYYY-MM-DD HH:MM:SS")]
    TimestampFormat(String),
    #[error("score {0} is outside the 1-10 scale")]
    ScoreOutOfRange(i64),
    #[error("unknown question '{0}'")]
    UnknownQuestion(String),
    #[error("unknown group '{0}'")]
    UnknownGroup(String),
    #[error("no launch is available for this evaluation")]
    MissingLaunch,
}

#[derive(Debug, Error)]
pub enum PortalError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("authorization rejected by {endpoint} after {attempts} attempt(s)")]
    Authorization { endpoint: String, attempts: usize },
    #[error("request to {url} failed with status {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl PortalError {
    /// Message suitable for the status line of the UI.
    pub fn user_message(&self) -> String {
        match self {
            PortalError::Configuration(_) => {
                "La evaluación no está disponible en este momento.".to_string()
            }
            PortalError::Validation(err) => format!("No se pudo enviar: {}", err),
            PortalError::Authorization { .. } => {
                "El servidor rechazó el envío por permisos. Tus respuestas siguen guardadas."
                    .to_string()
            }
            PortalError::Status { status, .. } => format!(
                "El servidor respondió con un error ({}). Intenta de nuevo.",
                status
            ),
            PortalError::Transport(_) | PortalError::Decode(_) => {
                "No se pudo contactar al servidor. Intenta de nuevo.".to_string()
            }
            PortalError::Storage(_) => {
                "No se pudo acceder al almacenamiento local.".to_string()
            }
        }
    }
}

pub type PortalResult<T> = Result<T, PortalError>;
