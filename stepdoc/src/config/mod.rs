//! Application configuration loaded from environment variables.

use std::path::PathBuf;

/// Artifact store backend selection.
#[derive(Debug, Clone)]
pub enum StorageBackend {
    /// S3-compatible store (AWS S3 or MinIO via endpoint override).
    S3 {
        bucket: String,
        region: String,
        endpoint: Option<String>,
        allow_http: bool,
    },
    /// Local filesystem store, for development and tests.
    Local { root: PathBuf },
}

/// Vision model (analyzer) configuration.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Base URL of the generative language API.
    pub base_url: String,
    /// API key; empty key forces the offline fallback path.
    pub api_key: String,
    /// Model identifier, e.g. "gemini-1.5-pro".
    pub model: String,
    /// Return the deterministic fallback manual on quota/not-found/rate-limit
    /// errors instead of failing the pipeline.
    pub fallback_on_remote_error: bool,
    /// Poll interval while the remote file is in its transient processing
    /// state, in milliseconds.
    pub poll_interval_ms: u64,
    /// Upper bound on remote-state polling attempts.
    pub max_poll_attempts: u32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            api_key: String::new(),
            model: "gemini-1.5-pro".to_string(),
            fallback_on_remote_error: true,
            poll_interval_ms: 2000,
            max_poll_attempts: 150,
        }
    }
}

/// Speech synthesis configuration.
#[derive(Debug, Clone)]
pub struct SynthesizerConfig {
    /// Primary (neural) engine endpoint.
    pub primary_endpoint: String,
    /// Voice identifier for the primary engine.
    pub voice: String,
    /// Fallback engine endpoint.
    pub fallback_endpoint: String,
    /// Language code used by the fallback engine.
    pub language: String,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            primary_endpoint: "http://localhost:5500/api/tts".to_string(),
            voice: "pt-BR-FranciscaNeural".to_string(),
            fallback_endpoint: "https://translate.google.com/translate_tts".to_string(),
            language: "pt".to_string(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub storage: StorageBackend,
    pub analyzer: AnalyzerConfig,
    pub synthesizer: SynthesizerConfig,
    /// Directory for transient downloads and ffmpeg workspaces.
    pub work_dir: PathBuf,
    /// Optional directory for rotated log files.
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to
    /// development defaults (SQLite file database, local artifact store).
    pub fn from_env_or_default() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:stepdoc.db?mode=rwc".to_string());

        let storage = match std::env::var("STORAGE_BUCKET") {
            Ok(bucket) if !bucket.trim().is_empty() => StorageBackend::S3 {
                bucket,
                region: std::env::var("STORAGE_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                endpoint: std::env::var("STORAGE_ENDPOINT").ok().filter(|s| !s.is_empty()),
                allow_http: env_flag("STORAGE_ALLOW_HTTP", false),
            },
            _ => StorageBackend::Local {
                root: std::env::var("STORAGE_LOCAL_ROOT")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./artifacts")),
            },
        };

        let mut analyzer = AnalyzerConfig::default();
        if let Ok(key) = std::env::var("ANALYZER_API_KEY") {
            analyzer.api_key = key;
        }
        if let Ok(model) = std::env::var("ANALYZER_MODEL")
            && !model.trim().is_empty()
        {
            analyzer.model = model;
        }
        if let Ok(base) = std::env::var("ANALYZER_BASE_URL")
            && !base.trim().is_empty()
        {
            analyzer.base_url = base;
        }
        analyzer.fallback_on_remote_error = env_flag("ANALYZER_FALLBACK_ON_REMOTE_ERROR", true);

        let mut synthesizer = SynthesizerConfig::default();
        if let Ok(endpoint) = std::env::var("TTS_PRIMARY_ENDPOINT")
            && !endpoint.trim().is_empty()
        {
            synthesizer.primary_endpoint = endpoint;
        }
        if let Ok(voice) = std::env::var("TTS_VOICE")
            && !voice.trim().is_empty()
        {
            synthesizer.voice = voice;
        }

        Self {
            database_url,
            storage,
            analyzer,
            synthesizer,
            work_dir: std::env::var("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir().join("stepdoc")),
            log_dir: std::env::var("LOG_DIR").ok().map(PathBuf::from),
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}
