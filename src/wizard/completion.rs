//! Whether a question, or the whole questionnaire, has been answered for every group.

use crate::models::{AnswerMap, Group, GroupId, Question};

/// Groups that still lack a score for `question_id`.
pub fn missing_groups<'a>(
    question_id: &str,
    answers: &AnswerMap,
    groups: &'a [Group],
) -> Vec<&'a GroupId> {
    let scores = answers.get(question_id);
    groups
        .iter()
        .filter(|group| scores.map_or(true, |s| !s.contains_key(&group.id)))
        .map(|group| &group.id)
        .collect()
}

fn scale_complete(question_id: &str, answers: &AnswerMap, groups: &[Group]) -> bool {
    !groups.is_empty() && missing_groups(question_id, answers, groups).is_empty()
}

/// Every scored question has a score for every group. An empty group list is
/// never complete.
pub fn is_whole_form_complete(
    questions: &[Question],
    answers: &AnswerMap,
    groups: &[Group],
) -> bool {
    !groups.is_empty()
        && questions
            .iter()
            .filter(|q| !q.is_comment())
            .all(|q| scale_complete(&q.id, answers, groups))
}

/// A scored question is complete when all groups are scored; the comment
/// question is complete when everything before it is.
pub fn is_complete(
    question: &Question,
    questions: &[Question],
    answers: &AnswerMap,
    groups: &[Group],
) -> bool {
    if question.is_comment() {
        is_whole_form_complete(questions, answers, groups)
    } else {
        scale_complete(&question.id, answers, groups)
    }
}

/// Lookup by id. Unknown ids are incomplete.
pub fn is_complete_by_id(
    question_id: &str,
    questions: &[Question],
    answers: &AnswerMap,
    groups: &[Group],
) -> bool {
    questions
        .iter()
        .find(|q| q.id == question_id)
        .is_some_and(|q| is_complete(q, questions, answers, groups))
}

/// Number of scored questions fully answered.
pub fn answered_count(questions: &[Question], answers: &AnswerMap, groups: &[Group]) -> usize {
    questions
        .iter()
        .filter(|q| !q.is_comment() && scale_complete(&q.id, answers, groups))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GroupScores, COMMENT_QUESTION_ID};

    fn group(id: &str) -> Group {
        Group {
            id: id.to_string(),
            name: format!("Grupo {}", id),
            subject: None,
        }
    }

    fn questions() -> Vec<Question> {
        vec![
            Question::scale("q1", "Domina la materia"),
            Question::scale("q2", "Es puntual"),
            Question::comment(),
        ]
    }

    fn scores(pairs: &[(&str, u8)]) -> GroupScores {
        pairs.iter().map(|(g, s)| (g.to_string(), *s)).collect()
    }

    #[test]
    fn test_group_coverage_flips_completion() {
        let qs = questions();
        let mut answers = AnswerMap::new();
        answers.insert("q1".to_string(), scores(&[("g1", 9), ("g2", 7)]));

        let mut groups = vec![group("g1"), group("g2")];
        assert!(is_complete_by_id("q1", &qs, &answers, &groups));

        groups.push(group("g3"));
        assert!(!is_complete_by_id("q1", &qs, &answers, &groups));
        assert_eq!(missing_groups("q1", &answers, &groups), vec!["g3"]);

        groups.pop();
        assert!(is_complete_by_id("q1", &qs, &answers, &groups));
    }

    #[test]
    fn test_empty_groups_never_complete() {
        let qs = questions();
        let mut answers = AnswerMap::new();
        answers.insert("q1".to_string(), scores(&[("g1", 9)]));
        answers.insert("q2".to_string(), scores(&[("g1", 9)]));

        assert!(!is_complete_by_id("q1", &qs, &answers, &[]));
        assert!(!is_complete_by_id(COMMENT_QUESTION_ID, &qs, &answers, &[]));
        assert!(!is_whole_form_complete(&qs, &answers, &[]));
    }

    #[test]
    fn test_comment_gated_on_scored_questions() {
        let qs = questions();
        let groups = vec![group("g1")];
        let mut answers = AnswerMap::new();
        answers.insert("q1".to_string(), scores(&[("g1", 10)]));

        assert!(!is_complete_by_id(COMMENT_QUESTION_ID, &qs, &answers, &groups));

        answers.insert("q2".to_string(), scores(&[("g1", 4)]));
        assert!(is_complete_by_id(COMMENT_QUESTION_ID, &qs, &answers, &groups));
        assert_eq!(answered_count(&qs, &answers, &groups), 2);
    }

    #[test]
    fn test_unknown_question_is_incomplete() {
        let qs = questions();
        assert!(!is_complete_by_id("q99", &qs, &AnswerMap::new(), &[group("g1")]));
    }
}
