//! Normalization of backend records into domain records.
//!
//! The portal backend is loose about shapes: ids arrive as numbers or strings, a
//! teacher's identity hides under one of several field names, and dates come in
//! more than one format. Everything is resolved here, once, at ingestion.

use crate::models::{
    Group, LaunchWindow, Question, QuestionKind, QuestionsResponse, RawGroup, RawLaunch,
    RawQuestion, RawTeacher, Teacher,
};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use serde_json::Value;

/// Seconds west of UTC of the portal's wall clock (UTC-6, no DST).
const PORTAL_OFFSET_WEST_SECS: i32 = 6 * 3600;

pub fn portal_offset() -> FixedOffset {
    FixedOffset::west_opt(PORTAL_OFFSET_WEST_SECS).unwrap_or_else(|| Utc.fix())
}

/// Canonical string form of an id that may be a JSON number or string.
pub fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                n.as_f64().map(|f| f.to_string())
            }
        }
        _ => None,
    }
}

/// Loose numeric coercion: numbers pass through, strings are parsed.
/// Non-finite results are returned as-is; callers decide what to do with them.
pub fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Lowercase and strip Spanish diacritics so keyword matching ignores accents.
pub fn fold_text(text: &str) -> String {
    text.chars()
        .flat_map(|c| c.to_lowercase())
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

/// Parse a backend date. RFC 3339 strings carry their own offset; naive
/// date-times and bare dates are read on the portal's wall clock.
pub fn parse_backend_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;

    portal_offset()
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_question(raw: &RawQuestion) -> Option<Question> {
    let id = value_to_id(&raw.id)?;
    Some(Question {
        id,
        text: raw.text.trim().to_string(),
        kind: QuestionKind::Scale,
        aspect_id: raw.aspect_id.as_ref().and_then(value_to_id),
        aspect_name: raw.aspect_name.clone(),
        aspect_weight: raw
            .aspect_weight
            .as_ref()
            .and_then(value_to_f64)
            .filter(|w| w.is_finite()),
    })
}

/// Scored questions in backend order, followed by the synthetic comment question.
pub fn parse_questions(response: &QuestionsResponse) -> Vec<Question> {
    let mut questions: Vec<Question> = response
        .preguntas
        .iter()
        .filter_map(|raw| {
            let parsed = parse_question(raw);
            if parsed.is_none() {
                tracing::warn!(id = ?raw.id, "skipping question without a usable id");
            }
            parsed
        })
        .collect();
    questions.push(Question::comment());
    questions
}

/// Identity priority: `IDDocente`, then `IDReferencia`, then `IDEmpleado`.
pub fn normalize_teacher(raw: &RawTeacher) -> Option<Teacher> {
    let id = [&raw.teacher_id, &raw.reference_id, &raw.employee_id]
        .into_iter()
        .flatten()
        .find_map(value_to_id)?;

    let name = raw
        .full_name
        .as_deref()
        .or(raw.name.as_deref())
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Docente {}", id));

    Some(Teacher { id, name })
}

pub fn normalize_teachers(raw: &[RawTeacher]) -> Vec<Teacher> {
    raw.iter()
        .filter_map(|record| {
            let teacher = normalize_teacher(record);
            if teacher.is_none() {
                tracing::warn!(name = ?record.name, "dropping teacher record without identity");
            }
            teacher
        })
        .collect()
}

pub fn normalize_group(raw: &RawGroup) -> Option<Group> {
    let id = value_to_id(&raw.id)?;
    let name = raw
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| id.clone());
    Some(Group {
        id,
        name,
        subject: raw.subject.clone(),
    })
}

pub fn normalize_groups(raw: &[RawGroup]) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    for group in raw.iter().filter_map(normalize_group) {
        // The same section can be listed once per subject.
        if !groups.iter().any(|g| g.id == group.id) {
            groups.push(group);
        }
    }
    groups
}

pub fn launch_window(raw: &RawLaunch, questionnaire_id: &str, weight: f64) -> LaunchWindow {
    LaunchWindow {
        questionnaire_id: questionnaire_id.to_string(),
        launch_id: value_to_id(&raw.id),
        start_at: raw.start.as_deref().and_then(parse_backend_datetime),
        end_at: raw.end.as_deref().and_then(parse_backend_datetime),
        weight,
        cycle_label: raw.cycle.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use serde_json::json;

    #[test]
    fn test_parse_questions_appends_comment() {
        let response: QuestionsResponse = serde_json::from_value(json!({
            "preguntas": [
                {"IDPregunta": 11, "Pregunta": " Domina la materia ", "IDAspecto": 1, "Aspecto": "Dominio", "PonderacionAspecto": "40"},
                {"IDPregunta": "12", "Pregunta": "Es puntual"},
                {"IDPregunta": null, "Pregunta": "sin id"}
            ],
            "cuestionario": {"IDCuestionario": 2}
        }))
        .unwrap();

        let questions = parse_questions(&response);
        assert_eq!(questions.len(), 3);
        assert_eq!(questions[0].id, "11");
        assert_eq!(questions[0].text, "Domina la materia");
        assert_eq!(questions[0].aspect_id.as_deref(), Some("1"));
        assert_eq!(questions[0].aspect_weight, Some(40.0));
        assert_eq!(questions[1].id, "12");
        assert!(questions[2].is_comment());
        assert_eq!(questions[2].id, "coment");
    }

    #[test]
    fn test_teacher_identity_priority() {
        let raw: RawTeacher = serde_json::from_value(json!({
            "IDReferencia": "R-7",
            "IDEmpleado": 99,
            "Nombre": "Ana López"
        }))
        .unwrap();
        let teacher = normalize_teacher(&raw).unwrap();
        assert_eq!(teacher.id, "R-7");
        assert_eq!(teacher.name, "Ana López");

        let raw: RawTeacher = serde_json::from_value(json!({
            "IDDocente": 15,
            "IDReferencia": "R-7",
            "NombreCompleto": "Luis Pérez"
        }))
        .unwrap();
        assert_eq!(normalize_teacher(&raw).unwrap().id, "15");

        let raw: RawTeacher =
            serde_json::from_value(json!({"IDDocente": "", "IDEmpleado": 4})).unwrap();
        let teacher = normalize_teacher(&raw).unwrap();
        assert_eq!(teacher.id, "4");
        assert_eq!(teacher.name, "Docente 4");

        let raw: RawTeacher = serde_json::from_value(json!({"Nombre": "Nadie"})).unwrap();
        assert!(normalize_teacher(&raw).is_none());
    }

    #[test]
    fn test_groups_are_deduplicated() {
        let raw: Vec<RawGroup> = serde_json::from_value(json!([
            {"IDGrupo": 1, "Grupo": "1A", "Materia": "Cálculo"},
            {"IDGrupo": 1, "Grupo": "1A", "Materia": "Álgebra"},
            {"IDGrupo": 2, "Materia": "Física"}
        ]))
        .unwrap();
        let groups = normalize_groups(&raw);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].subject.as_deref(), Some("Cálculo"));
        assert_eq!(groups[1].name, "2");
    }

    #[test]
    fn test_parse_backend_datetime_formats() {
        let utc = parse_backend_datetime("2025-03-01T12:00:00Z").unwrap();
        assert_eq!(utc.hour(), 12);

        // Naive values are portal wall-clock time, six hours behind UTC.
        let naive = parse_backend_datetime("2025-03-01 08:30:00").unwrap();
        assert_eq!(naive.hour(), 14);
        assert_eq!(naive.minute(), 30);

        let date_only = parse_backend_datetime("2025-03-01").unwrap();
        assert_eq!(date_only.hour(), 6);

        assert!(parse_backend_datetime("").is_none());
        assert!(parse_backend_datetime("pronto").is_none());
    }

    #[test]
    fn test_fold_text() {
        assert_eq!(fold_text("AUTOEVALUACIÓN Docente"), "autoevaluacion docente");
        assert_eq!(fold_text("Año"), "ano");
    }

    #[test]
    fn test_value_coercion() {
        assert_eq!(value_to_id(&json!(3)), Some("3".to_string()));
        assert_eq!(value_to_id(&json!(" 3 ")), Some("3".to_string()));
        assert_eq!(value_to_id(&json!(null)), None);
        assert_eq!(value_to_f64(&json!("55.5")), Some(55.5));
        assert_eq!(value_to_f64(&json!(true)), None);
    }
}
