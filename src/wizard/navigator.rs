//! The question-by-question state machine.
//!
//! Only the current position is stored; whether a move is legal is derived from
//! the answers every time.

use crate::error::ValidationError;
use crate::models::{AnswerMap, Draft, Group, GroupScores, Question};
use crate::wizard::completion;

pub const MIN_SCORE: i64 = 1;
pub const MAX_SCORE: i64 = 10;

#[derive(Debug, Clone)]
pub struct Navigator {
    questions: Vec<Question>,
    groups: Vec<Group>,
    answers: AnswerMap,
    comments: String,
    current: usize,
}

impl Navigator {
    /// Fresh start on the first question. A comment question is appended if missing.
    pub fn new(mut questions: Vec<Question>, groups: Vec<Group>) -> Self {
        if !questions.last().is_some_and(Question::is_comment) {
            questions.retain(|q| !q.is_comment());
            questions.push(Question::comment());
        }
        Self {
            questions,
            groups,
            answers: AnswerMap::new(),
            comments: String::new(),
            current: 0,
        }
    }

    /// Resume from a draft. A pointer to a question that no longer exists falls
    /// back to the first question. Scores for retired questions or groups are
    /// dropped.
    pub fn restore(questions: Vec<Question>, groups: Vec<Group>, draft: Draft) -> Self {
        let mut nav = Self::new(questions, groups);
        let Draft {
            answers,
            current_question_id,
            comments,
        } = draft;

        nav.answers = answers
            .into_iter()
            .filter(|(id, _)| nav.position(id).is_some())
            .map(|(id, scores)| {
                let live: GroupScores = scores
                    .into_iter()
                    .filter(|(group_id, _)| nav.groups.iter().any(|g| &g.id == group_id))
                    .collect();
                (id, live)
            })
            .filter(|(_, scores)| !scores.is_empty())
            .collect();
        nav.comments = comments;
        nav.current = match current_question_id.as_deref().and_then(|id| nav.position(id)) {
            Some(index) => index,
            None => {
                if let Some(stale) = current_question_id {
                    tracing::warn!(question = %stale, "draft pointer no longer exists, restarting");
                }
                0
            }
        };
        nav
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn answers(&self) -> &AnswerMap {
        &self.answers
    }

    pub fn comments(&self) -> &str {
        &self.comments
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &Question {
        &self.questions[self.current]
    }

    pub fn position(&self, question_id: &str) -> Option<usize> {
        self.questions.iter().position(|q| q.id == question_id)
    }

    pub fn is_complete_at(&self, index: usize) -> bool {
        self.questions
            .get(index)
            .is_some_and(|q| {
                completion::is_complete(q, &self.questions, &self.answers, &self.groups)
            })
    }

    pub fn is_current_complete(&self) -> bool {
        self.is_complete_at(self.current)
    }

    pub fn is_form_complete(&self) -> bool {
        completion::is_whole_form_complete(&self.questions, &self.answers, &self.groups)
    }

    pub fn on_last_question(&self) -> bool {
        self.current + 1 == self.questions.len()
    }

    /// Earlier and already-complete questions are always reachable; the next
    /// one only once the current one is complete.
    pub fn is_accessible(&self, index: usize) -> bool {
        if index >= self.questions.len() {
            return false;
        }
        let c = self.current;
        index == c
            || index < c
            || self.is_complete_at(index)
            || (index == c + 1 && self.is_complete_at(c))
    }

    /// Move to the next question if the current one is complete.
    pub fn advance(&mut self) -> bool {
        if self.is_current_complete() && !self.on_last_question() {
            self.current += 1;
            true
        } else {
            false
        }
    }

    /// Step back one question. Always legal unless already at the start.
    pub fn back(&mut self) -> bool {
        if self.current > 0 {
            self.current -= 1;
            true
        } else {
            false
        }
    }

    /// Jump to `question_id` if it is accessible; otherwise nothing happens.
    pub fn jump_to(&mut self, question_id: &str) -> bool {
        match self.position(question_id) {
            Some(index) if self.is_accessible(index) => {
                self.current = index;
                true
            }
            _ => false,
        }
    }

    pub fn answer(
        &mut self,
        question_id: &str,
        group_id: &str,
        score: i64,
    ) -> Result<(), ValidationError> {
        if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
            return Err(ValidationError::ScoreOutOfRange(score));
        }
        let question = self
            .questions
            .iter()
            .find(|q| q.id == question_id && !q.is_comment())
            .ok_or_else(|| ValidationError::UnknownQuestion(question_id.to_string()))?;
        if !self.groups.iter().any(|g| g.id == group_id) {
            return Err(ValidationError::UnknownGroup(group_id.to_string()));
        }

        let id = question.id.clone();
        // Range checked above.
        self.answers
            .entry(id)
            .or_default()
            .insert(group_id.to_string(), score as u8);
        Ok(())
    }

    pub fn set_comments(&mut self, comments: impl Into<String>) {
        self.comments = comments.into();
    }

    /// Linear progress through the list, 0-100. Goes down on backward jumps.
    pub fn progress(&self) -> u8 {
        let total = self.questions.len() as f64;
        (((self.current + 1) as f64 / total) * 100.0).round() as u8
    }

    pub fn draft(&self) -> Draft {
        Draft {
            answers: self.answers.clone(),
            current_question_id: Some(self.current().id.clone()),
            comments: self.comments.clone(),
        }
    }

    pub fn reset(&mut self) {
        self.answers.clear();
        self.comments.clear();
        self.current = 0;
    }
}
