//! Video compositor: prepends/appends branded intro and outro cuts.
//!
//! Uses the ffmpeg concat demuxer with a zero-re-encode stream copy, so all
//! segments must share container and codec parameters. When they do not, the
//! copy fails and the original video is served unstitched rather than failing
//! the publish.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::storage::ArtifactStore;
use crate::Result;

/// Compositor contract.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoCompositor: Send + Sync {
    /// Stitch intro + main + outro and return the artifact-store key of the
    /// video to serve. With no bumpers configured, or when the stream copy
    /// fails, this is the main key unchanged.
    async fn stitch<'a>(
        &self,
        main_key: &str,
        intro_key: Option<&'a str>,
        outro_key: Option<&'a str>,
    ) -> Result<String>;
}

/// ffmpeg-backed implementation.
pub struct FfmpegCompositor {
    store: Arc<dyn ArtifactStore>,
    work_dir: PathBuf,
}

impl FfmpegCompositor {
    pub fn new(store: Arc<dyn ArtifactStore>, work_dir: PathBuf) -> Self {
        Self { store, work_dir }
    }

    /// Best-effort bumper download. A missing intro/outro is logged and
    /// omitted from the cut.
    async fn download_bumper(
        &self,
        key: &str,
        dest: PathBuf,
        segments: &mut Vec<PathBuf>,
    ) {
        match self.store.download_to(key, &dest).await {
            Ok(()) => segments.push(dest),
            Err(err) => {
                warn!(key, error = %err, "Failed to download bumper, omitting it from the cut");
            }
        }
    }
}

#[async_trait]
impl VideoCompositor for FfmpegCompositor {
    async fn stitch<'a>(
        &self,
        main_key: &str,
        intro_key: Option<&'a str>,
        outro_key: Option<&'a str>,
    ) -> Result<String> {
        // Nothing to stitch.
        if intro_key.is_none() && outro_key.is_none() {
            return Ok(main_key.to_string());
        }

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let workspace = tempfile::tempdir_in(&self.work_dir)?;
        let mut segments: Vec<PathBuf> = Vec::with_capacity(3);

        if let Some(key) = intro_key {
            self.download_bumper(key, workspace.path().join("intro.mp4"), &mut segments)
                .await;
        }

        // The main video is the one segment that must be present.
        let main_path = workspace.path().join("main.mp4");
        self.store.download_to(main_key, &main_path).await?;
        segments.push(main_path);

        if let Some(key) = outro_key {
            self.download_bumper(key, workspace.path().join("outro.mp4"), &mut segments)
                .await;
        }

        if segments.len() == 1 {
            // Both bumpers dropped out; nothing left to concatenate.
            return Ok(main_key.to_string());
        }

        let list_path = workspace.path().join("files.txt");
        let output_path = workspace.path().join("stitched.mp4");
        media_utils::write_concat_list(&list_path, &segments).await?;

        if let Err(err) = media_utils::concat_copy(&list_path, &output_path).await {
            // Mismatched codecs are an operator problem (standardize the
            // bumper formats); the publish still goes out with the original.
            warn!(main_key, error = %err, "Stream-copy concat failed, serving unstitched video");
            return Ok(main_key.to_string());
        }

        let basename = main_key.rsplit('/').next().unwrap_or(main_key);
        let stitched_key = format!("stitched/final_{basename}");
        self.store
            .put_file(&stitched_key, &output_path, "video/mp4")
            .await?;
        info!(main_key, stitched_key, "Stitched cut stored");
        Ok(stitched_key)
    }
}
