//! Vision-model analyzer: turns a screen recording into structured steps.
//!
//! The production implementation talks to the Google generative language API
//! over REST: upload the (frame-sampled) video to the file API, poll until the
//! remote side finishes ingesting it, then ask the model for strict-JSON
//! structured content. Quota and model-availability errors degrade to a
//! deterministic offline manual so the rest of the pipeline stays exercisable
//! without a working API key.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::AnalyzerConfig;
use crate::domain::{StepRecord, StructuredContent, parse_model_output};
use crate::storage::ArtifactStore;
use crate::{Error, Result};

/// Hierarchy context threaded into the analysis prompt.
#[derive(Debug, Clone, Default)]
pub struct AnalysisContext {
    pub system_context: String,
    pub module_context: String,
    pub user_goal: String,
}

/// Analyzer contract.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoAnalyzer: Send + Sync {
    /// Produce the structured manual for the video stored under `video_key`.
    async fn analyze(
        &self,
        video_key: &str,
        context: &AnalysisContext,
    ) -> Result<StructuredContent>;

    /// Model identifier recorded on processing jobs.
    fn model_name(&self) -> &str;
}

/// REST client for the Gemini video-understanding API.
pub struct GeminiAnalyzer {
    http: reqwest::Client,
    config: AnalyzerConfig,
    store: Arc<dyn ArtifactStore>,
    work_dir: PathBuf,
}

/// File-API resource state, as reported by the remote side.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteFile {
    name: String,
    uri: String,
    #[serde(default)]
    state: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: RemoteFile,
}

impl GeminiAnalyzer {
    pub fn new(
        config: AnalyzerConfig,
        store: Arc<dyn ArtifactStore>,
        work_dir: PathBuf,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(600))
            .build()?;
        Ok(Self {
            http,
            config,
            store,
            work_dir,
        })
    }

    async fn analyze_remote(
        &self,
        video_key: &str,
        context: &AnalysisContext,
    ) -> Result<StructuredContent> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let workspace = tempfile::tempdir_in(&self.work_dir)?;

        let filename = video_key.rsplit('/').next().unwrap_or(video_key);
        let local = workspace.path().join(filename);
        debug!(video_key, "Downloading video for analysis");
        self.store.download_to(video_key, &local).await?;

        // Downsample to one frame per second to bound upload size. The model
        // reads screen recordings fine at 1 fps; when ffmpeg fails we ship the
        // original file instead.
        let sampled = workspace.path().join("sampled.mp4");
        let upload_path = match media_utils::sample_frames(&local, &sampled, 1).await {
            Ok(()) => &sampled,
            Err(err) => {
                warn!(error = %err, "Frame sampling failed, uploading original video");
                &local
            }
        };

        let file = self.upload_file(upload_path).await?;
        info!(name = %file.name, "Video uploaded to file API");

        let result = self.generate(&file, context).await;
        // The remote copy is transient input; drop it regardless of outcome.
        self.delete_remote_file(&file.name).await;
        result
    }

    async fn upload_file(&self, path: &Path) -> Result<RemoteFile> {
        let data = tokio::fs::read(path).await?;
        let url = format!(
            "{}/upload/v1beta/files?key={}",
            self.config.base_url, self.config.api_key
        );
        let response = self
            .http
            .post(&url)
            .header("X-Goog-Upload-Protocol", "raw")
            .header("Content-Type", mime_for(path))
            .body(data)
            .send()
            .await?;
        let response = check_remote(response).await?;
        let upload: UploadResponse = response.json().await?;
        Ok(upload.file)
    }

    /// Poll until the remote file leaves its transient PROCESSING state.
    async fn wait_until_active(&self, file: RemoteFile) -> Result<RemoteFile> {
        let mut file = file;
        for _ in 0..self.config.max_poll_attempts {
            match file.state.as_str() {
                "ACTIVE" => return Ok(file),
                "FAILED" => {
                    return Err(Error::remote("remote video ingestion failed"));
                }
                _ => {
                    debug!(name = %file.name, state = %file.state, "Waiting for remote ingestion");
                    tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
                    let url = format!(
                        "{}/v1beta/{}?key={}",
                        self.config.base_url, file.name, self.config.api_key
                    );
                    let response = check_remote(self.http.get(&url).send().await?).await?;
                    file = response.json().await?;
                }
            }
        }
        Err(Error::remote("timed out waiting for remote video ingestion"))
    }

    async fn generate(
        &self,
        file: &RemoteFile,
        context: &AnalysisContext,
    ) -> Result<StructuredContent> {
        let file = self.wait_until_active(file.clone()).await?;

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.config.base_url, self.config.model, self.config.api_key
        );
        let body = serde_json::json!({
            "contents": [{
                "parts": [
                    {"file_data": {"file_uri": file.uri, "mime_type": "video/mp4"}},
                    {"text": build_prompt(context)},
                ]
            }],
            "generationConfig": {"response_mime_type": "application/json"}
        });

        info!(model = %self.config.model, "Requesting video analysis");
        let response = check_remote(self.http.post(&url).json(&body).send().await?).await?;
        let payload: serde_json::Value = response.json().await?;

        let text = payload["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| Error::remote("model response has no text part"))?;
        parse_model_output(text)
    }

    async fn delete_remote_file(&self, name: &str) {
        let url = format!(
            "{}/v1beta/{}?key={}",
            self.config.base_url, name, self.config.api_key
        );
        if let Err(err) = self.http.delete(&url).send().await {
            warn!(name, error = %err, "Failed to delete remote file");
        }
    }
}

#[async_trait]
impl VideoAnalyzer for GeminiAnalyzer {
    async fn analyze(
        &self,
        video_key: &str,
        context: &AnalysisContext,
    ) -> Result<StructuredContent> {
        if self.config.api_key.trim().is_empty() {
            warn!("No analyzer API key configured, using offline fallback manual");
            return Ok(fallback_manual());
        }

        match self.analyze_remote(video_key, context).await {
            Ok(content) => Ok(content),
            Err(err) if self.config.fallback_on_remote_error && is_quota_or_missing(&err) => {
                warn!(error = %err, "Vision API unavailable, using offline fallback manual");
                Ok(fallback_manual())
            }
            Err(err) => Err(err),
        }
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Surface non-2xx responses as remote-service errors carrying the status
/// code, so the fallback classifier can match on it.
async fn check_remote(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(300).collect();
    Err(Error::RemoteService(format!(
        "vision API returned {status}: {snippet}"
    )))
}

/// Quota exhaustion and unknown-model errors are expected in development;
/// everything else is a real failure.
fn is_quota_or_missing(err: &Error) -> bool {
    let Error::RemoteService(msg) = err else {
        return false;
    };
    let lower = msg.to_ascii_lowercase();
    msg.contains("429") || msg.contains("404") || lower.contains("quota") || lower.contains("not found")
}

fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("webm") => "video/webm",
        _ => "video/mp4",
    }
}

fn build_prompt(context: &AnalysisContext) -> String {
    let mut prompt = String::from(
        "Você é um redator técnico especialista em criar manuais de software.\n\
         Analise este vídeo de uma tela de computador.\n\
         Identifique cada ação realizada pelo usuário (cliques, digitação, navegação).\n",
    );
    if !context.system_context.is_empty() {
        prompt.push_str(&format!("\nContexto do sistema: {}\n", context.system_context));
    }
    if !context.module_context.is_empty() {
        prompt.push_str(&format!("Contexto do módulo: {}\n", context.module_context));
    }
    if !context.user_goal.is_empty() {
        prompt.push_str(&format!("Objetivo do usuário: {}\n", context.user_goal));
    }
    prompt.push_str(
        "\nRetorne APENAS um JSON estritamente válido com a seguinte estrutura:\n\
         {\n\
           \"title\": \"Título sugerido para o manual\",\n\
           \"steps\": [\n\
             {\"timestamp\": \"00:05\", \"description\": \"Descrição detalhada da ação. Ex: Clicou no botão 'Salvar'\"}\n\
           ]\n\
         }\n",
    );
    prompt
}

/// Deterministic manual returned when the remote model is unreachable.
pub fn fallback_manual() -> StructuredContent {
    let steps = [
        ("00:01", "O usuário abriu a tela inicial do sistema."),
        ("00:05", "Clicou no menu principal 'Cadastros'."),
        ("00:10", "Selecionou a opção 'Clientes' na lista suspensa."),
        ("00:15", "Clicou no botão 'Novo' para adicionar um registro."),
        ("00:20", "Preencheu o campo 'Nome' com 'Empresa Modelo LTDA'."),
        ("00:25", "Clicou em 'Salvar' e o sistema confirmou a operação."),
    ];
    StructuredContent {
        title: "Manual de Teste (Mock AI)".to_string(),
        steps: steps
            .into_iter()
            .map(|(timestamp, description)| StepRecord {
                timestamp: timestamp.to_string(),
                description: description.to_string(),
                audio_url: None,
                duration: None,
            })
            .collect(),
    }
}
