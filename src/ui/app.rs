use crate::api::PortalClient;
use crate::export;
use crate::models::{EvaluationSubject, EvaluationType, Session, Teacher};
use crate::ui::render::render_ui;
use crate::ui::state::{score_for_key, subject_label, AnswerView, AppState, LoadResult};
use crate::wizard::draft::{CompletionMarks, DraftStore};
use crate::wizard::completion::is_complete_by_id;
use crate::wizard::loader;
use crate::wizard::sequence::{RequestSequencer, Stamped};
use crate::wizard::submission::SubmitOutcome;
use crate::wizard::{Wizard, WizardSetup};
use anyhow::Result;
use chrono::Utc;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::path::PathBuf;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Evaluation to open right away instead of showing the menu.
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub evaluation_type: EvaluationType,
    pub teacher: Option<Teacher>,
}

pub struct App {
    client: PortalClient,
    session: Session,
    drafts: DraftStore,
    marks: CompletionMarks,
    export_dir: PathBuf,
    state: AppState,
    wizard: Option<Wizard>,
    sequencer: RequestSequencer,
    load_tx: UnboundedSender<Stamped<LoadResult>>,
    load_rx: UnboundedReceiver<Stamped<LoadResult>>,
}

impl App {
    pub fn new(
        client: PortalClient,
        session: Session,
        drafts: DraftStore,
        marks: CompletionMarks,
        export_dir: PathBuf,
    ) -> Self {
        let (load_tx, load_rx) = unbounded_channel();
        let state = Self::menu_state(&session);
        Self {
            client,
            session,
            drafts,
            marks,
            export_dir,
            state,
            wizard: None,
            sequencer: RequestSequencer::new(),
            load_tx,
            load_rx,
        }
    }

    fn menu_state(session: &Session) -> AppState {
        AppState::EvaluationSelection {
            options: session.role.evaluations().to_vec(),
            selected_index: 0,
        }
    }

    pub async fn run(&mut self, start: Option<StartRequest>) -> Result<()> {
        // Setup terminal
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        if let Some(start) = start {
            self.open_request(start).await;
        }

        // Main event loop
        let result = self.event_loop(&mut terminal).await;

        // Restore terminal
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        result
    }

    async fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> Result<()> {
        loop {
            terminal.draw(|f| render_ui(f, &self.state, self.wizard.as_ref()))?;

            while let Ok(stamped) = self.load_rx.try_recv() {
                if let Some(result) = self.sequencer.accept(stamped) {
                    self.on_questionnaire_loaded(result).await;
                }
            }

            if event::poll(std::time::Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if self.handle_key_event(key).await {
                        break; // User quit
                    }
                }
            }

            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        Ok(())
    }

    async fn open_request(&mut self, start: StartRequest) {
        match (start.evaluation_type, start.teacher) {
            (EvaluationType::DeanEvaluatesTeacher, Some(teacher)) => {
                self.start_load(start.evaluation_type, EvaluationSubject::Teacher(teacher));
            }
            (EvaluationType::DeanEvaluatesTeacher, None) => self.load_teachers().await,
            (evaluation_type, _) => self.start_load(evaluation_type, EvaluationSubject::Own),
        }
    }

    async fn load_teachers(&mut self) {
        self.state = AppState::LoadingTeachers;
        match loader::faculty_teachers(&self.client).await {
            Ok(teachers) if teachers.is_empty() => {
                self.state = AppState::Error {
                    message: "No hay docentes asignados a tu facultad.".to_string(),
                };
            }
            Ok(teachers) => {
                self.state = AppState::TeacherSelection {
                    teachers,
                    selected_index: 0,
                };
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load faculty teachers");
                self.state = AppState::Error {
                    message: format!("No se pudieron cargar los docentes: {}", e.user_message()),
                };
            }
        }
    }

    /// Load questionnaire and groups in the background. Only the most recent
    /// load is ever applied.
    fn start_load(&mut self, evaluation_type: EvaluationType, subject: EvaluationSubject) {
        let ticket = self.sequencer.issue();
        self.wizard = None;
        self.state = AppState::LoadingQuestionnaire {
            evaluation_type,
            subject_label: subject_label(&subject, &self.session.name),
        };

        let client = self.client.clone();
        let session = self.session.clone();
        let tx = self.load_tx.clone();
        tokio::spawn(async move {
            let resolution = loader::resolve(&client, evaluation_type).await;
            let groups = loader::subject_groups(&client, evaluation_type, &subject, &session).await;
            let _ = tx.send(Stamped {
                ticket,
                value: LoadResult {
                    evaluation_type,
                    subject,
                    resolution,
                    groups,
                },
            });
        });
    }

    async fn on_questionnaire_loaded(&mut self, result: LoadResult) {
        let LoadResult {
            evaluation_type,
            subject,
            resolution,
            groups,
        } = result;
        let now = Utc::now();

        if let Some(error) = &resolution.error {
            tracing::warn!(%error, "questionnaire unavailable");
            self.state = AppState::Error {
                message: "La evaluación no está disponible en este momento. Intenta más tarde."
                    .to_string(),
            };
            return;
        }

        if !resolution.can_proceed(now) {
            self.state = AppState::Gate {
                evaluation_type,
                gate: resolution.gate(now),
                launch: resolution.has_launch.then(|| resolution.launch.clone()),
                notice: resolution.notice.clone(),
            };
            return;
        }

        let groups = match groups {
            Ok(groups) if groups.is_empty() => {
                self.state = AppState::Error {
                    message: "No hay grupos asociados a esta evaluación.".to_string(),
                };
                return;
            }
            Ok(groups) => groups,
            Err(e) => {
                tracing::error!(error = %e, "failed to load groups");
                self.state = AppState::Error {
                    message: e.user_message(),
                };
                return;
            }
        };

        let label = subject_label(&subject, &self.session.name);
        let setup = WizardSetup {
            evaluation_type,
            subject,
            launch: resolution.launch,
            questions: resolution.questions,
            groups,
        };
        let opened = Wizard::open(&self.session, setup, self.drafts.clone(), self.marks.clone());
        let wizard = match opened {
            Ok(wizard) => wizard,
            Err(e) => {
                self.state = AppState::Error {
                    message: e.user_message(),
                };
                return;
            }
        };

        if wizard.already_completed(&self.client, &self.session).await {
            self.state = AppState::AlreadyCompleted {
                evaluation_type,
                subject_label: label,
            };
            return;
        }

        let mut view = AnswerView::with_comment(wizard.navigator().comments());
        if wizard.was_resumed() {
            view.set_message("Se recuperó tu avance guardado.");
        }
        self.wizard = Some(wizard);
        self.state = AppState::Answering(view);
    }

    async fn handle_key_event(&mut self, key: KeyEvent) -> bool {
        let current_state = std::mem::replace(&mut self.state, AppState::Submitting);

        match current_state {
            AppState::EvaluationSelection {
                options,
                mut selected_index,
            } => match key.code {
                KeyCode::Char('q') => return true,
                KeyCode::Up => {
                    selected_index = selected_index.saturating_sub(1);
                    self.state = AppState::EvaluationSelection {
                        options,
                        selected_index,
                    };
                }
                KeyCode::Down => {
                    if selected_index < options.len().saturating_sub(1) {
                        selected_index += 1;
                    }
                    self.state = AppState::EvaluationSelection {
                        options,
                        selected_index,
                    };
                }
                KeyCode::Enter => match options.get(selected_index).copied() {
                    Some(evaluation_type) => {
                        self.open_request(StartRequest {
                            evaluation_type,
                            teacher: None,
                        })
                        .await;
                    }
                    None => {
                        self.state = AppState::EvaluationSelection {
                            options,
                            selected_index,
                        };
                    }
                },
                _ => {
                    self.state = AppState::EvaluationSelection {
                        options,
                        selected_index,
                    };
                }
            },
            AppState::TeacherSelection {
                teachers,
                mut selected_index,
            } => match key.code {
                KeyCode::Char('q') => return true,
                KeyCode::Esc => self.state = Self::menu_state(&self.session),
                KeyCode::Up => {
                    selected_index = selected_index.saturating_sub(1);
                    self.state = AppState::TeacherSelection {
                        teachers,
                        selected_index,
                    };
                }
                KeyCode::Down => {
                    if selected_index < teachers.len().saturating_sub(1) {
                        selected_index += 1;
                    }
                    self.state = AppState::TeacherSelection {
                        teachers,
                        selected_index,
                    };
                }
                KeyCode::Enter => match teachers.get(selected_index).cloned() {
                    Some(teacher) => self.start_load(
                        EvaluationType::DeanEvaluatesTeacher,
                        EvaluationSubject::Teacher(teacher),
                    ),
                    None => {
                        self.state = AppState::TeacherSelection {
                            teachers,
                            selected_index,
                        };
                    }
                },
                _ => {
                    self.state = AppState::TeacherSelection {
                        teachers,
                        selected_index,
                    };
                }
            },
            AppState::LoadingQuestionnaire {
                evaluation_type,
                subject_label,
            } => match key.code {
                KeyCode::Esc => {
                    // Whatever is in flight is now stale.
                    self.sequencer.cancel_all();
                    self.state = Self::menu_state(&self.session);
                }
                KeyCode::Char('q') => return true,
                _ => {
                    self.state = AppState::LoadingQuestionnaire {
                        evaluation_type,
                        subject_label,
                    };
                }
            },
            AppState::Answering(view) => return self.handle_answering_key(key, view).await,
            AppState::Submitting => self.state = AppState::Submitting,
            state @ (AppState::Gate { .. }
            | AppState::AlreadyCompleted { .. }
            | AppState::SubmissionComplete { .. }
            | AppState::Error { .. }) => match key.code {
                KeyCode::Char('q') => return true,
                KeyCode::Esc | KeyCode::Enter => {
                    self.wizard = None;
                    self.state = Self::menu_state(&self.session);
                }
                _ => self.state = state,
            },
            state => {
                // Loading screens ignore input
                self.state = state;
            }
        }
        false
    }

    async fn handle_answering_key(&mut self, key: KeyEvent, mut view: AnswerView) -> bool {
        let Some(wizard) = self.wizard.as_mut() else {
            self.state = Self::menu_state(&self.session);
            return false;
        };

        if view.editing_comment {
            match key.code {
                KeyCode::Esc | KeyCode::Enter => {
                    view.editing_comment = false;
                    wizard.set_comments(view.comment_input.clone());
                }
                KeyCode::Backspace => {
                    view.comment_input.pop();
                    wizard.set_comments(view.comment_input.clone());
                }
                KeyCode::Char(c) => {
                    view.comment_input.push(c);
                    wizard.set_comments(view.comment_input.clone());
                }
                _ => {}
            }
            self.state = AppState::Answering(view);
            return false;
        }

        view.message = None;
        let on_comment = wizard.navigator().current().is_comment();
        let group_count = wizard.navigator().groups().len();

        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Esc => {
                // Draft stays saved; the wizard can be resumed later.
                self.wizard = None;
                self.state = Self::menu_state(&self.session);
                return false;
            }
            KeyCode::Up => view.group_index = view.group_index.saturating_sub(1),
            KeyCode::Down => {
                if view.group_index + 1 < group_count {
                    view.group_index += 1;
                }
            }
            KeyCode::Left => {
                wizard.back();
            }
            KeyCode::Right | KeyCode::Enter if !on_comment => {
                if !wizard.advance() {
                    view.set_message(
                        "Responde esta pregunta para todos los grupos antes de continuar.",
                    );
                }
            }
            KeyCode::Home => {
                let first = wizard.navigator().questions()[0].id.clone();
                wizard.jump_to(&first);
            }
            KeyCode::End => {
                let furthest = {
                    let nav = wizard.navigator();
                    (0..nav.questions().len())
                        .rev()
                        .find(|&i| nav.is_accessible(i))
                        .map(|i| nav.questions()[i].id.clone())
                };
                if let Some(id) = furthest {
                    wizard.jump_to(&id);
                }
            }
            KeyCode::Char('e') | KeyCode::Enter if on_comment => {
                view.editing_comment = true;
            }
            KeyCode::Char('r') => match wizard.reset() {
                Ok(()) => {
                    view = AnswerView::default();
                    view.set_message("Se borraron tus respuestas.");
                }
                Err(e) => view.set_message(e.user_message()),
            },
            KeyCode::Char('s') if on_comment => {
                if !wizard.navigator().is_form_complete() {
                    view.set_message("Faltan calificaciones por responder.");
                } else {
                    self.state = AppState::Submitting;
                    return self.submit(view).await;
                }
            }
            KeyCode::Char(c) if !on_comment => {
                if let Some(score) = score_for_key(c) {
                    let question_id = wizard.navigator().current().id.clone();
                    let group_index = view.group_index.min(group_count.saturating_sub(1));
                    let group_id = wizard.navigator().groups()[group_index].id.clone();
                    match wizard.answer(&question_id, &group_id, score) {
                        Ok(()) => {
                            let nav = wizard.navigator();
                            let complete = is_complete_by_id(
                                &question_id,
                                nav.questions(),
                                nav.answers(),
                                nav.groups(),
                            );
                            if complete {
                                view.set_message("Pregunta completa. Pulsa → para continuar.");
                            } else if view.group_index + 1 < group_count {
                                view.group_index += 1;
                            }
                        }
                        Err(e) => view.set_message(e.to_string()),
                    }
                }
            }
            _ => {}
        }

        if wizard.navigator().current().is_comment() {
            view.comment_input = wizard.navigator().comments().to_string();
        }
        self.state = AppState::Answering(view);
        false
    }

    async fn submit(&mut self, mut view: AnswerView) -> bool {
        let Some(wizard) = self.wizard.as_mut() else {
            self.state = Self::menu_state(&self.session);
            return false;
        };

        let label = subject_label(wizard.subject(), &self.session.name);
        match wizard.submit(&self.client, &self.session).await {
            Ok(report) => {
                let receipt = match export::export_receipt(&report, &label, &self.export_dir) {
                    Ok(path) => Some(path.display().to_string()),
                    Err(e) => {
                        tracing::warn!(error = %e, "could not write receipt");
                        None
                    }
                };
                if report.outcome == SubmitOutcome::AlreadyCompleted {
                    tracing::info!(subject = %label, "evaluation was already submitted");
                }
                self.wizard = None;
                self.state = AppState::SubmissionComplete {
                    outcome: report.outcome,
                    grade: report.grade,
                    receipt,
                };
            }
            Err(e) => {
                view.set_message(e.user_message());
                self.state = AppState::Answering(view);
            }
        }
        false
    }
}
