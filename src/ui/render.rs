use crate::models::{EvaluationType, GateState, LaunchWindow, Teacher};
use crate::parser::portal_offset;
use crate::ui::state::{subject_label, AnswerView, AppState};
use crate::wizard::completion::answered_count;
use crate::wizard::navigator::Navigator;
use crate::wizard::submission::SubmitOutcome;
use crate::wizard::Wizard;
use chrono::{DateTime, Utc};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, List, ListItem, Paragraph, Wrap},
    Frame,
};

const TITLE: &str = "Portal Docente - Evaluaciones";

pub fn render_ui(frame: &mut Frame, state: &AppState, wizard: Option<&Wizard>) {
    match state {
        AppState::EvaluationSelection {
            options,
            selected_index,
        } => render_evaluation_selection(frame, options, *selected_index),
        AppState::LoadingTeachers => render_loading(frame, "Cargando docentes de la facultad..."),
        AppState::TeacherSelection {
            teachers,
            selected_index,
        } => render_teacher_selection(frame, teachers, *selected_index),
        AppState::LoadingQuestionnaire {
            evaluation_type,
            subject_label,
        } => render_loading(
            frame,
            &format!(
                "Cargando {} para {}...",
                evaluation_type.label(),
                subject_label
            ),
        ),
        AppState::Gate {
            evaluation_type,
            gate,
            launch,
            notice,
        } => render_gate(frame, *evaluation_type, *gate, launch.as_ref(), notice.as_deref()),
        AppState::AlreadyCompleted {
            evaluation_type,
            subject_label,
        } => render_notice(
            frame,
            "Evaluación completada",
            &format!(
                "{} para {} ya fue enviada. Gracias.",
                evaluation_type.label(),
                subject_label
            ),
            Color::Green,
        ),
        AppState::Answering(view) => match wizard {
            Some(wizard) => render_answering(frame, wizard, view),
            None => render_loading(frame, "Preparando cuestionario..."),
        },
        AppState::Submitting => render_loading(frame, "Enviando evaluación..."),
        AppState::SubmissionComplete {
            outcome,
            grade,
            receipt,
        } => render_submission_complete(frame, *outcome, *grade, receipt.as_deref()),
        AppState::Error { message } => render_error(frame, message),
    }
}

fn cyan_block(title: impl Into<String>) -> Block<'static> {
    Block::default()
        .title(title.into())
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
}

fn highlight(selected: bool) -> Style {
    if selected {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    }
}

fn help_line(frame: &mut Frame, area: Rect, text: &str) {
    let help = Paragraph::new(text.to_string())
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Center);
    frame.render_widget(help, area);
}

fn split_body_help(area: Rect) -> (Rect, Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(area);
    (chunks[0], chunks[1])
}

fn render_loading(frame: &mut Frame, message: &str) {
    let paragraph = Paragraph::new(message.to_string())
        .block(cyan_block(TITLE))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });

    frame.render_widget(paragraph, frame.area());
}

fn render_evaluation_selection(
    frame: &mut Frame,
    options: &[EvaluationType],
    selected_index: usize,
) {
    let (body, help) = split_body_help(frame.area());

    let items: Vec<ListItem> = options
        .iter()
        .enumerate()
        .map(|(i, option)| {
            let prefix = if i == selected_index { "> " } else { "  " };
            ListItem::new(format!("{}{}", prefix, option.label()))
                .style(highlight(i == selected_index))
        })
        .collect();

    frame.render_widget(List::new(items).block(cyan_block("Selecciona una evaluación")), body);
    help_line(frame, help, "[↑↓: Navegar | Enter: Abrir | q: Salir]");
}

fn render_teacher_selection(frame: &mut Frame, teachers: &[Teacher], selected_index: usize) {
    let (body, help) = split_body_help(frame.area());

    let items: Vec<ListItem> = teachers
        .iter()
        .enumerate()
        .map(|(i, teacher)| {
            let prefix = if i == selected_index { "> " } else { "  " };
            ListItem::new(format!("{}{}", prefix, teacher.name))
                .style(highlight(i == selected_index))
        })
        .collect();

    frame.render_widget(List::new(items).block(cyan_block("Selecciona un docente")), body);
    help_line(
        frame,
        help,
        &format!(
            "{} docente(s) | [↑↓: Navegar | Enter: Evaluar | Esc: Volver | q: Salir]",
            teachers.len()
        ),
    );
}

fn format_local(at: DateTime<Utc>) -> String {
    at.with_timezone(&portal_offset())
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

fn render_gate(
    frame: &mut Frame,
    evaluation_type: EvaluationType,
    gate: GateState,
    launch: Option<&LaunchWindow>,
    notice: Option<&str>,
) {
    let (headline, color) = match gate {
        GateState::NotYetOpen => ("La evaluación aún no está abierta.", Color::Yellow),
        GateState::Closed => ("El periodo de evaluación ya cerró.", Color::Red),
        GateState::Disabled => ("Las evaluaciones no están habilitadas.", Color::Red),
        GateState::Open => ("La evaluación está abierta.", Color::Green),
    };

    let mut text = vec![
        Line::from(Span::styled(
            evaluation_type.label(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(headline, Style::default().fg(color))),
    ];
    if let Some(notice) = notice {
        text.push(Line::from(notice.to_string()));
    }
    if let Some(launch) = launch {
        text.push(Line::from(""));
        if let Some(cycle) = &launch.cycle_label {
            text.push(Line::from(format!("Periodo: {}", cycle)));
        }
        if let Some(start) = launch.start_at {
            text.push(Line::from(format!("Inicio: {}", format_local(start))));
        }
        if let Some(end) = launch.end_at {
            text.push(Line::from(format!("Cierre: {}", format_local(end))));
        }
    }

    let (body, help) = split_body_help(frame.area());
    let paragraph = Paragraph::new(text)
        .block(
            Block::default()
                .title(TITLE)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color)),
        )
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, body);
    help_line(frame, help, "[Enter/Esc: Volver | q: Salir]");
}

fn question_marker(navigator: &Navigator, index: usize) -> (&'static str, Style) {
    if index == navigator.current_index() {
        ("▶", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    } else if navigator.is_complete_at(index) {
        ("✓", Style::default().fg(Color::Green))
    } else if navigator.is_accessible(index) {
        ("·", Style::default())
    } else {
        ("🔒", Style::default().fg(Color::DarkGray))
    }
}

fn render_answering(frame: &mut Frame, wizard: &Wizard, view: &AnswerView) {
    let navigator = wizard.navigator();
    let area = frame.area();

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(area);

    let gauge = Gauge::default()
        .block(cyan_block(format!(
            "{} - {}{}",
            wizard.evaluation_type().label(),
            subject_label(wizard.subject(), ""),
            wizard
                .launch()
                .cycle_label
                .as_deref()
                .map(|c| format!(" ({})", c))
                .unwrap_or_default()
        )))
        .gauge_style(Style::default().fg(Color::Green))
        .percent(u16::from(navigator.progress()))
        .label(format!(
            "{}% | pregunta {}/{}",
            navigator.progress(),
            navigator.current_index() + 1,
            navigator.questions().len()
        ));
    frame.render_widget(gauge, rows[0]);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(rows[1]);

    let items: Vec<ListItem> = navigator
        .questions()
        .iter()
        .enumerate()
        .map(|(i, question)| {
            let (marker, style) = question_marker(navigator, i);
            ListItem::new(format!("{} {}. {}", marker, i + 1, question.text)).style(style)
        })
        .collect();
    frame.render_widget(List::new(items).block(cyan_block("Preguntas")), columns[0]);

    let question = navigator.current();
    if question.is_comment() {
        let border = if view.editing_comment {
            Color::Yellow
        } else {
            Color::Cyan
        };
        let cursor = if view.editing_comment { "_" } else { "" };
        let paragraph = Paragraph::new(vec![
            Line::from(Span::styled(
                question.text.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(format!("{}{}", view.comment_input, cursor)),
        ])
        .block(
            Block::default()
                .title("Comentarios (opcional)")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border)),
        )
        .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, columns[1]);
    } else {
        let mut text = vec![Line::from(Span::styled(
            question.text.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        ))];
        if let Some(aspect) = &question.aspect_name {
            text.push(Line::from(Span::styled(
                format!("Aspecto: {}", aspect),
                Style::default().fg(Color::DarkGray),
            )));
        }
        text.push(Line::from(""));

        let scores = navigator.answers().get(&question.id);
        for (i, group) in navigator.groups().iter().enumerate() {
            let selected = i == view.group_index;
            let prefix = if selected { "> " } else { "  " };
            let score = scores
                .and_then(|s| s.get(&group.id))
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string());
            let subject = group
                .subject
                .as_deref()
                .map(|s| format!(" ({})", s))
                .unwrap_or_default();
            text.push(Line::from(vec![
                Span::styled(format!("{}{}{}", prefix, group.name, subject), highlight(selected)),
                Span::raw(": "),
                Span::styled(score, Style::default().fg(Color::Green)),
            ]));
        }

        let paragraph = Paragraph::new(text)
            .block(cyan_block("Calificación por grupo (1-10)"))
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, columns[1]);
    }

    let status = match &view.message {
        Some(message) => Paragraph::new(message.clone()).style(Style::default().fg(Color::Yellow)),
        None => Paragraph::new(format!(
            "{} de {} preguntas respondidas",
            answered_count(
                navigator.questions(),
                navigator.answers(),
                navigator.groups()
            ),
            navigator.questions().iter().filter(|q| !q.is_comment()).count()
        )),
    };
    frame.render_widget(
        status
            .block(Block::default().borders(Borders::ALL))
            .alignment(Alignment::Center),
        rows[2],
    );

    let help = if view.editing_comment {
        "[Escribe tu comentario | Enter/Esc: Terminar]"
    } else if question.is_comment() {
        "[e: Editar | s: Enviar | ←: Anterior | Home/End: Saltar | r: Reiniciar | Esc: Salir]"
    } else {
        concat!(
            "[↑↓: Grupo | 1-9,0: Calificar | ←→: Pregunta | ",
            "Home/End: Saltar | r: Reiniciar | Esc: Salir]"
        )
    };
    help_line(frame, rows[3], help);
}

fn render_submission_complete(
    frame: &mut Frame,
    outcome: SubmitOutcome,
    grade: f64,
    receipt: Option<&str>,
) {
    let headline = match outcome {
        SubmitOutcome::Submitted => "¡Evaluación enviada!",
        SubmitOutcome::AlreadyCompleted => "Esta evaluación ya se había enviado.",
    };

    let text = vec![
        Line::from(Span::styled(
            headline,
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled("Calificación: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(format!("{:.2}", grade)),
        ]),
        Line::from(vec![
            Span::styled("Comprobante: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(receipt.unwrap_or("no disponible").to_string()),
        ]),
    ];

    let (body, help) = split_body_help(frame.area());
    let paragraph = Paragraph::new(text)
        .block(cyan_block(TITLE))
        .alignment(Alignment::Center);
    frame.render_widget(paragraph, body);
    help_line(frame, help, "[Enter: Continuar | q: Salir]");
}

fn render_notice(frame: &mut Frame, title: &str, message: &str, color: Color) {
    let (body, help) = split_body_help(frame.area());
    let text = vec![
        Line::from(Span::styled(
            title.to_string(),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(message.to_string()),
    ];
    let paragraph = Paragraph::new(text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color)),
        )
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, body);
    help_line(frame, help, "[Enter: Continuar | q: Salir]");
}

fn render_error(frame: &mut Frame, message: &str) {
    render_notice(frame, "Error", message, Color::Red);
}
