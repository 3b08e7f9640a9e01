use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

/// Backend paths, relative to the API base URL.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Endpoints {
    pub questions: String,
    pub questionnaires: String,
    pub launches: String,
    pub verify: String,
    pub groups: String,
    pub faculty_teachers: String,
    pub submit_self: String,
    pub submit_self_fallback: String,
    pub submit_dean: String,
    pub submit_dean_self: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            questions: "/evaluaciones/preguntas".to_string(),
            questionnaires: "/cuestionarios".to_string(),
            launches: "/lanzamientos/activos".to_string(),
            verify: "/evaluaciones/verificar".to_string(),
            groups: "/docentes/grupos".to_string(),
            faculty_teachers: "/decano/docentes".to_string(),
            submit_self: "/evaluaciones/autoevaluacion".to_string(),
            submit_self_fallback: "/evaluaciones/autoevaluacion/sesion".to_string(),
            submit_dean: "/evaluaciones/decano/docente".to_string(),
            submit_dean_self: "/evaluaciones/decano/autoevaluacion".to_string(),
        }
    }
}

/// Optional YAML file pointed to by `PORTAL_CONFIG`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    api_url: Option<String>,
    storage_dir: Option<PathBuf>,
    export_dir: Option<PathBuf>,
    log_file: Option<PathBuf>,
    log_level: Option<String>,
    endpoints: Endpoints,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub token: String,
    pub user_id: String,
    pub user_name: String,
    pub role: String,
    pub storage_dir: PathBuf,
    pub export_dir: PathBuf,
    pub log_file: PathBuf,
    pub log_level: String,
    pub endpoints: Endpoints,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        let file = match env::var("PORTAL_CONFIG") {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {}", path))?;
                parse_file_config(&raw)?
            }
            Err(_) => FileConfig::default(),
        };

        let api_url = env::var("PORTAL_API_URL")
            .ok()
            .or(file.api_url)
            .context("PORTAL_API_URL not found. Please set it in .env file or environment")?;

        let token = env::var("PORTAL_TOKEN")
            .context("PORTAL_TOKEN not found. Please set it in .env file or environment")?;
        if token.is_empty() {
            anyhow::bail!("PORTAL_TOKEN is empty");
        }

        let user_id = env::var("PORTAL_USER_ID")
            .context("PORTAL_USER_ID not found. Please set it in .env file or environment")?;
        if user_id.trim().is_empty() {
            anyhow::bail!("PORTAL_USER_ID is empty");
        }

        Ok(Config {
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
            user_id: user_id.trim().to_string(),
            user_name: env::var("PORTAL_USER_NAME").unwrap_or_default(),
            role: env::var("PORTAL_ROLE").unwrap_or_else(|_| "docente".to_string()),
            storage_dir: env::var("PORTAL_STORAGE_DIR")
                .map(PathBuf::from)
                .ok()
                .or(file.storage_dir)
                .unwrap_or_else(|| PathBuf::from(".portal_eval")),
            export_dir: env::var("PORTAL_EXPORT_DIR")
                .map(PathBuf::from)
                .ok()
                .or(file.export_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
            log_file: env::var("PORTAL_LOG_FILE")
                .map(PathBuf::from)
                .ok()
                .or(file.log_file)
                .unwrap_or_else(|| PathBuf::from("portal_eval.log")),
            log_level: env::var("PORTAL_LOG_LEVEL")
                .ok()
                .or(file.log_level)
                .unwrap_or_else(|| "info".to_string()),
            endpoints: file.endpoints,
        })
    }
}

fn parse_file_config(raw: &str) -> Result<FileConfig> {
    serde_yaml::from_str(raw).context("Failed to parse config YAML")
}
