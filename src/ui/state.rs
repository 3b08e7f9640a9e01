use crate::error::PortalResult;
use crate::models::{EvaluationSubject, EvaluationType, GateState, Group, LaunchWindow, Teacher};
use crate::wizard::loader::Resolution;
use crate::wizard::submission::SubmitOutcome;

#[derive(Debug, Clone)]
pub enum AppState {
    EvaluationSelection {
        options: Vec<EvaluationType>,
        selected_index: usize,
    },
    LoadingTeachers,
    TeacherSelection {
        teachers: Vec<Teacher>,
        selected_index: usize,
    },
    LoadingQuestionnaire {
        evaluation_type: EvaluationType,
        subject_label: String,
    },
    Gate {
        evaluation_type: EvaluationType,
        gate: GateState,
        launch: Option<LaunchWindow>,
        notice: Option<String>,
    },
    AlreadyCompleted {
        evaluation_type: EvaluationType,
        subject_label: String,
    },
    Answering(AnswerView),
    Submitting,
    SubmissionComplete {
        outcome: SubmitOutcome,
        grade: f64,
        receipt: Option<String>,
    },
    Error {
        message: String,
    },
}

/// UI-only state of the question screen; the answers live in the wizard.
#[derive(Debug, Clone, Default)]
pub struct AnswerView {
    pub group_index: usize,
    pub editing_comment: bool,
    pub comment_input: String,
    pub message: Option<String>,
}

impl AnswerView {
    pub fn with_comment(comment: &str) -> Self {
        Self {
            comment_input: comment.to_string(),
            ..Self::default()
        }
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }
}

/// Result of a background questionnaire load.
#[derive(Debug)]
pub struct LoadResult {
    pub evaluation_type: EvaluationType,
    pub subject: EvaluationSubject,
    pub resolution: Resolution,
    pub groups: PortalResult<Vec<Group>>,
}

pub fn subject_label(subject: &EvaluationSubject, own_name: &str) -> String {
    match subject {
        EvaluationSubject::Own if own_name.is_empty() => "Mi evaluación".to_string(),
        EvaluationSubject::Own => own_name.to_string(),
        EvaluationSubject::Teacher(teacher) => teacher.name.clone(),
    }
}

/// Digit keys map onto the 1-10 scale, with 0 standing for 10.
pub fn score_for_key(c: char) -> Option<i64> {
    match c {
        '1'..='9' => c.to_digit(10).map(i64::from),
        '0' => Some(10),
        _ => None,
    }
}
