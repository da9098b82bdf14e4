use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ingest::ChunkingConfig;

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub project_root: PathBuf,
    pub user_data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub db_path: PathBuf,
    pub vectors_db_path: PathBuf,
    pub settings_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let project_root = discover_project_root();
        let user_data_dir = discover_user_data_dir(&project_root);
        let log_dir = user_data_dir.join("logs");
        let db_path = user_data_dir.join("studyhall_core.db");
        let vectors_db_path = user_data_dir.join("vectors.db");
        let settings_path = user_data_dir.join("settings.toml");

        for dir in [&user_data_dir, &log_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            project_root,
            user_data_dir,
            log_dir,
            db_path,
            vectors_db_path,
            settings_path,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_project_root() -> PathBuf {
    if let Ok(root) = env::var("STUDYHALL_ROOT") {
        return PathBuf::from(root);
    }

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    if manifest_dir.join("settings.toml").exists() {
        return manifest_dir;
    }

    env::current_dir().unwrap_or(manifest_dir)
}

fn discover_user_data_dir(project_root: &Path) -> PathBuf {
    if let Ok(dir) = env::var("STUDYHALL_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if cfg!(debug_assertions) {
        return project_root.to_path_buf();
    }

    if cfg!(target_os = "windows") {
        let base = env::var("LOCALAPPDATA")
            .unwrap_or_else(|_| env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string()));
        return PathBuf::from(base).join("Studyhall");
    }

    if cfg!(target_os = "macos") {
        return home_dir()
            .join("Library")
            .join("Application Support")
            .join("Studyhall");
    }

    let xdg = env::var("XDG_DATA_HOME").unwrap_or_else(|_| {
        home_dir()
            .join(".local/share")
            .to_string_lossy()
            .to_string()
    });
    PathBuf::from(xdg).join("studyhall")
}

fn home_dir() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 0,
            cors_allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Minimum cosine similarity for a chunk to count as relevant.
    pub similarity_threshold: f32,
    /// Nearest neighbors requested per query.
    pub top_k: usize,
    /// Cached store handles kept before the oldest are evicted.
    pub registry_capacity: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            top_k: 5,
            registry_capacity: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Base URL of an OpenAI-compatible server (LM Studio, Ollama, llama.cpp).
    pub base_url: String,
    pub chat_model: String,
    pub embed_model: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:1234".to_string(),
            chat_model: "default".to_string(),
            embed_model: "text-embedding".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub google_api_key: String,
    pub google_engine_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub retrieval: RetrievalSettings,
    pub chunking: ChunkingConfig,
    pub llm: LlmSettings,
    pub search: SearchSettings,
}

impl Settings {
    /// Load settings from `settings.toml`, falling back to defaults when the
    /// file is absent or malformed, then apply environment overrides.
    pub fn load(paths: &AppPaths) -> Self {
        let mut settings = match fs::read_to_string(&paths.settings_path) {
            Ok(raw) => match toml::from_str::<Settings>(&raw) {
                Ok(parsed) => parsed,
                Err(err) => {
                    tracing::warn!(
                        "Failed to parse {}: {}; using defaults",
                        paths.settings_path.display(),
                        err
                    );
                    Settings::default()
                }
            },
            Err(_) => Settings::default(),
        };

        if let Ok(url) = env::var("STUDYHALL_LLM_BASE_URL") {
            if !url.trim().is_empty() {
                settings.llm.base_url = url;
            }
        }
        if let Ok(key) = env::var("GOOGLE_SEARCH_API_KEY") {
            settings.search.google_api_key = key;
        }
        if let Ok(id) = env::var("GOOGLE_SEARCH_ENGINE_ID") {
            settings.search.google_engine_id = id;
        }
        if let Ok(port) = env::var("PORT") {
            if let Ok(port) = port.parse::<u16>() {
                settings.server.port = port;
            }
        }

        settings
    }
}
