mod api;
mod config;
mod error;
mod export;
mod models;
mod parser;
mod storage;
mod telemetry;
mod ui;
mod wizard;

use anyhow::{Context, Result};
use config::Config;
use models::{Role, Session};
use std::sync::Arc;
use storage::{FileStore, KeyValueStore};
use ui::App;
use wizard::draft::{CompletionMarks, DraftStore};

#[cfg(feature = "cli")]
mod cli {
    use crate::api::PortalClient;
    use crate::models::{EvaluationType, Role, Teacher};
    use crate::ui::StartRequest;
    use crate::wizard::loader;
    use anyhow::Result;
    use clap::{Parser, ValueEnum};

    #[derive(Debug, Clone, Copy, ValueEnum)]
    pub enum Evaluation {
        /// Teacher self-evaluation
        Docente,
        /// Dean evaluates a teacher
        DecanoDocente,
        /// Dean self-evaluation
        Decano,
    }

    impl From<Evaluation> for EvaluationType {
        fn from(value: Evaluation) -> Self {
            match value {
                Evaluation::Docente => EvaluationType::SelfEvaluation,
                Evaluation::DecanoDocente => EvaluationType::DeanEvaluatesTeacher,
                Evaluation::Decano => EvaluationType::DeanSelfEvaluation,
            }
        }
    }

    #[derive(Parser, Debug)]
    #[command(version, about = "Teacher portal evaluation wizard")]
    pub struct Args {
        /// Open this evaluation directly instead of showing the menu
        #[arg(long, value_enum)]
        pub evaluation: Option<Evaluation>,

        /// Teacher id to evaluate (dean evaluations only)
        #[arg(long)]
        pub teacher: Option<String>,
    }

    pub async fn start_request(
        args: Args,
        role: Role,
        client: &PortalClient,
    ) -> Result<Option<StartRequest>> {
        let Some(evaluation) = args.evaluation else {
            return Ok(None);
        };
        let evaluation_type = EvaluationType::from(evaluation);
        if !role.evaluations().contains(&evaluation_type) {
            anyhow::bail!("'{}' is not available for this role", evaluation_type.label());
        }

        let teacher = match (evaluation_type, args.teacher) {
            (EvaluationType::DeanEvaluatesTeacher, Some(id)) => {
                let teachers = loader::faculty_teachers(client).await?;
                let teacher = teachers.into_iter().find(|t| t.id == id).unwrap_or_else(|| {
                    tracing::warn!(teacher = %id, "teacher not in faculty list, using bare id");
                    Teacher {
                        name: format!("Docente {}", id),
                        id,
                    }
                });
                Some(teacher)
            }
            _ => None,
        };

        Ok(Some(StartRequest {
            evaluation_type,
            teacher,
        }))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    #[cfg(feature = "cli")]
    let args = <cli::Args as clap::Parser>::parse();

    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;
    telemetry::init(&config.log_file, &config.log_level)?;

    let session = Session {
        user_id: config.user_id.clone(),
        name: config.user_name.clone(),
        role: Role::parse(&config.role),
        token: config.token.clone(),
    };
    tracing::info!(user = %session.user_id, role = ?session.role, "starting evaluation portal");

    let client = api::PortalClient::new(
        &config.api_url,
        session.token.clone(),
        config.endpoints.clone(),
    )
    .context("Failed to build portal client")?;

    let store: Arc<dyn KeyValueStore> = Arc::new(
        FileStore::open(&config.storage_dir).context("Failed to open local storage")?,
    );
    let drafts = DraftStore::new(store.clone());
    let marks = CompletionMarks::new(store);

    #[cfg(feature = "cli")]
    let start = cli::start_request(args, session.role, &client).await?;
    #[cfg(not(feature = "cli"))]
    let start: Option<ui::StartRequest> = None;

    // Start TUI application
    let mut app = App::new(client, session, drafts, marks, config.export_dir);
    app.run(start).await?;

    Ok(())
}
