//! Speech synthesis for step narration.
//!
//! Two HTTP engines: a neural TTS endpoint (better quality) with a
//! translate-TTS fallback (robotic but dependable). Synthesis is strictly
//! best-effort: a step without audio is still a valid step, so both engines
//! failing yields `Ok(None)` rather than an error.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SynthesizerConfig;
use crate::storage::ArtifactStore;
use crate::Result;

/// A narrated clip stored in the artifact store.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    /// Artifact-store key, `audio/{uuid}.mp3`.
    pub key: String,
    /// Clip length in seconds; 0.0 when probing failed.
    pub duration: f64,
}

/// Synthesizer contract.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Narrate `text`. `None` means no audio could be produced; the caller
    /// keeps the step and leaves its audio fields empty.
    async fn synthesize(&self, text: &str) -> Result<Option<AudioClip>>;
}

/// HTTP-engine implementation with primary/fallback cascade.
pub struct SpeechService {
    http: reqwest::Client,
    config: SynthesizerConfig,
    store: Arc<dyn ArtifactStore>,
    work_dir: PathBuf,
}

impl SpeechService {
    pub fn new(
        config: SynthesizerConfig,
        store: Arc<dyn ArtifactStore>,
        work_dir: PathBuf,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            config,
            store,
            work_dir,
        })
    }

    async fn fetch_primary(&self, text: &str) -> Result<Bytes> {
        debug!(endpoint = %self.config.primary_endpoint, "Requesting neural TTS");
        let response = self
            .http
            .get(&self.config.primary_endpoint)
            .query(&[("text", text), ("voice", &self.config.voice)])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?)
    }

    async fn fetch_fallback(&self, text: &str) -> Result<Bytes> {
        debug!(endpoint = %self.config.fallback_endpoint, "Requesting fallback TTS");
        let response = self
            .http
            .get(&self.config.fallback_endpoint)
            .query(&[
                ("ie", "UTF-8"),
                ("client", "tw-ob"),
                ("tl", self.config.language.as_str()),
                ("q", text),
            ])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?)
    }

    async fn fetch_audio(&self, text: &str) -> Option<Bytes> {
        match self.fetch_primary(text).await {
            Ok(bytes) => Some(bytes),
            Err(primary_err) => {
                warn!(error = %primary_err, "Neural TTS failed, trying fallback engine");
                match self.fetch_fallback(text).await {
                    Ok(bytes) => Some(bytes),
                    Err(fallback_err) => {
                        warn!(error = %fallback_err, "Fallback TTS failed, step keeps no audio");
                        None
                    }
                }
            }
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for SpeechService {
    async fn synthesize(&self, text: &str) -> Result<Option<AudioClip>> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        let Some(bytes) = self.fetch_audio(text).await else {
            return Ok(None);
        };

        // Land the clip on disk once so ffprobe can measure it.
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let workspace = tempfile::tempdir_in(&self.work_dir)?;
        let filename = format!("{}.mp3", Uuid::new_v4());
        let temp_path = workspace.path().join(&filename);
        tokio::fs::write(&temp_path, &bytes).await?;

        let duration = match media_utils::probe_duration_secs(&temp_path).await {
            Ok(secs) => secs,
            Err(err) => {
                warn!(error = %err, "Could not probe audio duration, recording 0.0");
                0.0
            }
        };

        let key = format!("audio/{filename}");
        match self.store.put(&key, bytes, "audio/mpeg").await {
            Ok(key) => {
                info!(key, duration, "Narration clip stored");
                Ok(Some(AudioClip { key, duration }))
            }
            Err(err) => {
                warn!(error = %err, "Failed to store narration clip, step keeps no audio");
                Ok(None)
            }
        }
    }
}
