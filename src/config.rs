use anyhow::{Result, anyhow, bail};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_ENVIRONMENT: &str = "local";
pub const DEFAULT_API_VERSION: &str = "v1";
pub const DEFAULT_INSTRUCTIONS_FILE: &str = "instructions/instructions_file_search.txt";
pub const DEFAULT_DATASHEET_FILE: &str = "datasheet/contoso-tents-datasheet.pdf";
pub const DEFAULT_DATABASE_FILE: &str = "database/contoso-sales.db";
pub const DEFAULT_FILES_DIR: &str = "files";

const CONFIG_DIR_NAME: &str = "sales_agent";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub project_endpoint: String,
    pub model_deployment_name: Option<String>,
    pub environment: String,
    pub access_token: Option<String>,
    pub api_version: String,
    pub instructions_file: PathBuf,
    pub datasheet_file: PathBuf,
    pub database_file: PathBuf,
    pub files_dir: PathBuf,
    pub http_debug: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFileConfig {
    instructions_file: Option<PathBuf>,
    datasheet_file: Option<PathBuf>,
    database_file: Option<PathBuf>,
    files_dir: Option<PathBuf>,
    api_version: Option<String>,
    http_debug: Option<bool>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config_path = discover_config_path()?;
        let file_config = load_file_config(&config_path)?.unwrap_or_default();

        let project_endpoint = env_non_empty("PROJECT_ENDPOINT").ok_or_else(|| {
            anyhow!("Failed to load config: PROJECT_ENDPOINT is not set")
        })?;

        let file_api_version = file_config
            .api_version
            .as_deref()
            .and_then(non_empty)
            .map(ToOwned::to_owned);

        Ok(Self {
            project_endpoint: project_endpoint.trim_end_matches('/').to_string(),
            model_deployment_name: env_non_empty("MODEL_DEPLOYMENT_NAME"),
            environment: env_non_empty("ENVIRONMENT")
                .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string()),
            access_token: env_non_empty("PROJECT_ACCESS_TOKEN"),
            api_version: env_non_empty("PROJECT_API_VERSION")
                .or(file_api_version)
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            instructions_file: file_config
                .instructions_file
                .unwrap_or_else(|| PathBuf::from(DEFAULT_INSTRUCTIONS_FILE)),
            datasheet_file: file_config
                .datasheet_file
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATASHEET_FILE)),
            database_file: file_config
                .database_file
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_FILE)),
            files_dir: file_config
                .files_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FILES_DIR)),
            http_debug: file_config.http_debug.unwrap_or(false),
        })
    }
}

fn discover_config_path() -> Result<PathBuf> {
    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let trimmed = xdg.trim();
        if trimmed.is_empty() {
            bail!("Failed to resolve config path: XDG_CONFIG_HOME is set but empty");
        }

        return Ok(PathBuf::from(trimmed)
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME));
    }

    let home = dirs::home_dir()
        .ok_or_else(|| anyhow!("Failed to resolve config path: HOME directory is unavailable"))?;

    Ok(home
        .join(".config")
        .join(CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME))
}

fn load_file_config(config_path: &Path) -> Result<Option<RawFileConfig>> {
    if !config_path.is_file() {
        return Ok(None);
    }

    let config_text = fs::read_to_string(config_path).map_err(|err| {
        anyhow!(
            "Failed to load config {}: unable to read file: {err}",
            config_path.display()
        )
    })?;

    toml::from_str(&config_text)
        .map(Some)
        .map_err(|err| anyhow!("Failed to load config {}: {err}", config_path.display()))
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .and_then(|value| non_empty(&value).map(ToOwned::to_owned))
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
