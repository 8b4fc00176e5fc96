//! End-to-end tests: HTTP surface plus the background pipeline.
//!
//! A real in-memory SQLite database and in-memory artifact store back the
//! full router; the remote media services are replaced with scripted doubles
//! so no network or ffmpeg is involved.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use bytes::Bytes;
use tower::util::ServiceExt;

use stepdoc::analyzer::{AnalysisContext, VideoAnalyzer};
use stepdoc::api::routes::create_router;
use stepdoc::api::server::AppState;
use stepdoc::compositor::VideoCompositor;
use stepdoc::database::models::{
    ChapterDbModel, ChapterStatus, CollectionDbModel, ModuleDbModel, SystemDbModel,
};
use stepdoc::database::repositories::{
    AssetKind, ChapterRepository, ConfigurationRepository, HierarchyRepository,
    SqlxChapterRepository, SqlxConfigurationRepository, SqlxHierarchyRepository,
    SqlxObservabilityRepository,
};
use stepdoc::database::{DbPool, init_pool, run_migrations};
use stepdoc::domain::{StepRecord, StructuredContent};
use stepdoc::pipeline::{JobQueue, PipelineOrchestrator, WorkerPool, WorkerPoolConfig};
use stepdoc::storage::{ArtifactStore, ObjectStoreArtifactStore};
use stepdoc::synthesizer::{AudioClip, SpeechSynthesizer};

struct ScriptedAnalyzer {
    content: StructuredContent,
}

#[async_trait]
impl VideoAnalyzer for ScriptedAnalyzer {
    async fn analyze(
        &self,
        _video_key: &str,
        _context: &AnalysisContext,
    ) -> stepdoc::Result<StructuredContent> {
        Ok(self.content.clone())
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

struct ScriptedSynthesizer {
    store: Arc<dyn ArtifactStore>,
    counter: AtomicUsize,
}

#[async_trait]
impl SpeechSynthesizer for ScriptedSynthesizer {
    async fn synthesize(&self, text: &str) -> stepdoc::Result<Option<AudioClip>> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let key = format!("audio/clip-{n}.mp3");
        self.store
            .put(&key, Bytes::from_static(b"mp3"), "audio/mpeg")
            .await?;
        Ok(Some(AudioClip { key, duration: 2.5 }))
    }
}

struct ScriptedCompositor {
    output_key: String,
}

#[async_trait]
impl VideoCompositor for ScriptedCompositor {
    async fn stitch<'a>(
        &self,
        main_key: &str,
        intro_key: Option<&'a str>,
        outro_key: Option<&'a str>,
    ) -> stepdoc::Result<String> {
        if intro_key.is_none() && outro_key.is_none() {
            return Ok(main_key.to_string());
        }
        Ok(self.output_key.clone())
    }
}

struct TestApp {
    router: Router,
    pool: DbPool,
    store: Arc<dyn ArtifactStore>,
    module_id: i64,
    // Dropping the pool aborts its drain task, so it must live as long as
    // the tests that wait on background jobs.
    _worker_pool: WorkerPool,
}

impl TestApp {
    fn chapters(&self) -> SqlxChapterRepository {
        SqlxChapterRepository::new(self.pool.clone())
    }

    async fn request(&self, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self.router.clone().oneshot(req).await.expect("router error");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body read");
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, value)
    }

    /// Poll the chapter until it reaches `status`.
    async fn wait_for_status(&self, chapter_id: i64, status: ChapterStatus) -> ChapterDbModel {
        let chapters = self.chapters();
        for _ in 0..200 {
            let chapter = chapters.get(chapter_id).await.expect("chapter vanished");
            if chapter.status == status.as_str() {
                return chapter;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("chapter {chapter_id} never reached {}", status.as_str());
    }

    /// Mark a chapter DRAFTED with the given content, bypassing the pipeline.
    async fn draft_chapter(&self, chapter_id: i64, content: &StructuredContent) {
        let applied = self
            .chapters()
            .commit_content_guarded(
                chapter_id,
                &content.to_json().unwrap(),
                ChapterStatus::Drafted,
                0,
            )
            .await
            .unwrap();
        assert!(applied);
    }

    async fn seed_chapter(&self, title: &str) -> i64 {
        let (_, chapter_id) = self
            .chapters()
            .create_with_collection(
                &CollectionDbModel::new(self.module_id, title, "auto"),
                &ChapterDbModel::new(0, title, "videos/seeded_rec.webm"),
            )
            .await
            .unwrap();
        chapter_id
    }
}

fn sample_content() -> StructuredContent {
    StructuredContent {
        title: "Emitir Boleto".to_string(),
        steps: vec![
            StepRecord {
                timestamp: "00:03".to_string(),
                description: "Acesse o menu Financeiro".to_string(),
                audio_url: None,
                duration: None,
            },
            StepRecord {
                timestamp: "00:12".to_string(),
                description: "Clique em 'Emitir Boleto'".to_string(),
                audio_url: None,
                duration: None,
            },
        ],
    }
}

async fn setup_app(compositor_output: &str) -> TestApp {
    let pool = init_pool("sqlite::memory:").await.expect("pool");
    run_migrations(&pool).await.expect("migrations");

    let chapters = Arc::new(SqlxChapterRepository::new(pool.clone()));
    let hierarchy = Arc::new(SqlxHierarchyRepository::new(pool.clone()));
    let configuration = Arc::new(SqlxConfigurationRepository::new(pool.clone()));
    let observability = Arc::new(SqlxObservabilityRepository::new(pool.clone()));
    let store: Arc<dyn ArtifactStore> = Arc::new(ObjectStoreArtifactStore::in_memory());

    let system_id = hierarchy
        .create_system(&SystemDbModel {
            id: 0,
            name: "ERP".to_string(),
            context_prompt: None,
        })
        .await
        .unwrap();
    let module_id = hierarchy
        .create_module(&ModuleDbModel {
            id: 0,
            system_id,
            name: "Financeiro".to_string(),
            context_prompt: None,
        })
        .await
        .unwrap();

    let (queue, rx) = JobQueue::bounded(16);
    let worker_pool = WorkerPool::new(WorkerPoolConfig {
        max_workers: 2,
        job_timeout_secs: 30,
    });
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        chapters.clone(),
        configuration.clone(),
        observability.clone(),
        Arc::new(ScriptedAnalyzer {
            content: sample_content(),
        }),
        Arc::new(ScriptedSynthesizer {
            store: store.clone(),
            counter: AtomicUsize::new(0),
        }),
        Arc::new(ScriptedCompositor {
            output_key: compositor_output.to_string(),
        }),
        queue.clone(),
        worker_pool.cancellation_token(),
    ));
    worker_pool.start(rx, orchestrator.clone(), queue.in_flight());

    let state = AppState {
        start_time: std::time::Instant::now(),
        chapters,
        hierarchy,
        configuration,
        observability,
        store: store.clone(),
        orchestrator,
        queue,
    };

    TestApp {
        router: create_router(state),
        pool,
        store,
        module_id,
        _worker_pool: worker_pool,
    }
}

fn multipart_upload_body(boundary: &str, filename: &str, module_id: i64) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: video/webm\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"webm-bytes");
    body.extend_from_slice(
        format!(
            "\r\n--{boundary}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nEmitir Boleto\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"module_id\"\r\n\r\n{module_id}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}

fn upload_request(boundary: &str, filename: &str, module_id: i64) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(multipart_upload_body(boundary, filename, module_id)))
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn upload_runs_pipeline_to_drafted() {
    let app = setup_app("stitched/final_rec.webm").await;

    let (status, body) = app.request(upload_request("XBOUNDARY", "rec.webm", app.module_id)).await;
    assert_eq!(status, StatusCode::OK, "upload failed: {body}");
    assert_eq!(body["status"], "success");
    let chapter_id = body["chapter_id"].as_i64().unwrap();

    let chapter = app.wait_for_status(chapter_id, ChapterStatus::Drafted).await;
    let content = StructuredContent::from_json(chapter.content.as_deref().unwrap()).unwrap();
    assert_eq!(content.steps.len(), 2);
    assert!(content.steps.iter().all(|s| s.audio_url.is_some()));
    assert_eq!(content.steps[0].duration, Some(2.5));

    // Detail view rewrites stored keys into browser-fetchable proxy paths.
    let (status, detail) = app.request(get_request(&format!("/api/v1/chapters/{chapter_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["system_name"], "ERP");
    let audio_url = detail["content"]["steps"][0]["audio_url"].as_str().unwrap();
    assert!(audio_url.starts_with("/api/v1/stream?path=audio/"), "got {audio_url}");
}

#[tokio::test]
async fn upload_validation_failures() {
    let app = setup_app("stitched/x.mp4").await;

    let (status, _) = app.request(upload_request("B1", "notes.txt", app.module_id)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = app.request(upload_request("B2", "rec.webm", 9999)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn publish_without_bumpers_completes_synchronously() {
    let app = setup_app("stitched/x.mp4").await;
    let chapter_id = app.seed_chapter("Cadastro").await;
    app.draft_chapter(chapter_id, &sample_content()).await;

    let (status, body) = app
        .request(json_request(
            "POST",
            &format!("/api/v1/chapters/{chapter_id}/publish"),
            serde_json::json!({}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "COMPLETED");
    assert_eq!(body["stitching"], false);

    let chapter = app.chapters().get(chapter_id).await.unwrap();
    assert!(chapter.stitched_video_key.is_none());
}

#[tokio::test]
async fn publish_with_intro_stitches_in_background() {
    let app = setup_app("stitched/final_seeded_rec.webm").await;
    let configuration = SqlxConfigurationRepository::new(app.pool.clone());
    configuration
        .set_asset_key(AssetKind::Intro, "assets/intro.mp4")
        .await
        .unwrap();

    let chapter_id = app.seed_chapter("Cadastro").await;
    app.draft_chapter(chapter_id, &sample_content()).await;

    let (status, body) = app
        .request(json_request(
            "POST",
            &format!("/api/v1/chapters/{chapter_id}/publish"),
            serde_json::json!({}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stitching"], true);

    let chapter = app.wait_for_status(chapter_id, ChapterStatus::Completed).await;
    assert_eq!(chapter.video_key, "stitched/final_seeded_rec.webm");
    assert_eq!(
        chapter.stitched_video_key.as_deref(),
        Some("stitched/final_seeded_rec.webm")
    );
}

#[tokio::test]
async fn publish_requires_drafted() {
    let app = setup_app("stitched/x.mp4").await;
    let chapter_id = app.seed_chapter("Cadastro").await;

    let (status, body) = app
        .request(json_request(
            "POST",
            &format!("/api/v1/chapters/{chapter_id}/publish"),
            serde_json::json!({}),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "got {body}");
}

#[tokio::test]
async fn edits_rejected_while_busy() {
    let app = setup_app("stitched/x.mp4").await;
    let chapter_id = app.seed_chapter("Cadastro").await;
    app.chapters()
        .set_status(chapter_id, ChapterStatus::Processing)
        .await
        .unwrap();

    let (status, _) = app
        .request(json_request(
            "PUT",
            &format!("/api/v1/chapters/{chapter_id}"),
            serde_json::json!({"title": "Novo título"}),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn content_edits_must_be_structured() {
    let app = setup_app("stitched/x.mp4").await;
    let chapter_id = app.seed_chapter("Cadastro").await;
    app.draft_chapter(chapter_id, &sample_content()).await;

    let (status, _) = app
        .request(json_request(
            "PUT",
            &format!("/api/v1/chapters/{chapter_id}"),
            serde_json::json!({"content": {"steps": "not-a-list"}}),
        ))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // A valid replacement goes through.
    let mut replacement = sample_content();
    replacement.steps.truncate(1);
    let (status, _) = app
        .request(json_request(
            "PUT",
            &format!("/api/v1/chapters/{chapter_id}"),
            serde_json::json!({"content": serde_json::to_value(&replacement).unwrap()}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn regenerate_audio_round_trip() {
    let app = setup_app("stitched/x.mp4").await;
    let chapter_id = app.seed_chapter("Cadastro").await;
    app.draft_chapter(chapter_id, &sample_content()).await;

    let (status, body) = app
        .request(json_request(
            "POST",
            &format!("/api/v1/chapters/{chapter_id}/regenerate_audio"),
            serde_json::json!({"step_index": 1, "text": "Confira os dados e salve"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "got {body}");
    assert!(body["audio_url"].as_str().unwrap().starts_with("/api/v1/stream?path=audio/"));
    assert_eq!(body["duration"], 2.5);

    let (status, _) = app
        .request(json_request(
            "POST",
            &format!("/api/v1/chapters/{chapter_id}/regenerate_audio"),
            serde_json::json!({"step_index": 7, "text": "fora do alcance"}),
        ))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn stream_proxy_serves_artifact_bytes() {
    let app = setup_app("stitched/x.mp4").await;
    app.store
        .put("audio/clip.mp3", Bytes::from_static(b"mp3-bytes"), "audio/mpeg")
        .await
        .unwrap();

    let response = app
        .router
        .clone()
        .oneshot(get_request("/api/v1/stream?path=audio/clip.mp3"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "audio/mpeg"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"mp3-bytes");

    let (status, _) = app.request(get_request("/api/v1/stream?path=audio/missing.mp3")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn hierarchy_crud_over_http() {
    let app = setup_app("stitched/x.mp4").await;

    let (status, system) = app
        .request(json_request(
            "POST",
            "/api/v1/systems",
            serde_json::json!({"name": "CRM", "context_prompt": "Sistema de vendas"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let system_id = system["id"].as_i64().unwrap();

    let (status, _) = app
        .request(json_request("POST", "/api/v1/systems", serde_json::json!({"name": "  "})))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, module) = app
        .request(json_request(
            "POST",
            &format!("/api/v1/systems/{system_id}/modules"),
            serde_json::json!({"name": "Propostas"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(module["system_id"].as_i64().unwrap(), system_id);

    let (status, modules) = app
        .request(get_request(&format!("/api/v1/systems/{system_id}/modules")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(modules.as_array().unwrap().len(), 1);

    let (status, _) = app.request(get_request("/api/v1/systems/9999/modules")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn configuration_and_observability_endpoints() {
    let app = setup_app("stitched/x.mp4").await;

    let (status, config) = app.request(get_request("/api/v1/configuration")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(config["primary_color"], "#0099ff");

    let (status, updated) = app
        .request(json_request(
            "PUT",
            "/api/v1/configuration",
            serde_json::json!({"primary_color": "#112233", "tooltips": {"upload": "Arraste o vídeo"}}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["primary_color"], "#112233");

    let (status, _) = app
        .request(json_request(
            "PUT",
            "/api/v1/configuration",
            serde_json::json!({"tooltips": "not-an-object"}),
        ))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // Feedback feeds the dashboard counters.
    let chapter_id = app.seed_chapter("Cadastro").await;
    let (status, _) = app
        .request(json_request(
            "POST",
            &format!("/api/v1/chapters/{chapter_id}/feedback"),
            serde_json::json!({"is_positive": true, "comment": "Ficou ótimo"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, stats) = app.request(get_request("/api/v1/analytics/stats")).await;
    assert_eq!(status, StatusCode::OK, "got {stats}");

    let (status, logs) = app.request(get_request("/api/v1/audit-logs?limit=10")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(logs.is_array());

    let (status, health) = app.request(get_request("/api/v1/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn cancel_then_reprocess_bumps_generation() {
    let app = setup_app("stitched/x.mp4").await;
    let chapter_id = app.seed_chapter("Cadastro").await;

    let (status, _) = app
        .request(json_request(
            "POST",
            &format!("/api/v1/chapters/{chapter_id}/cancel"),
            serde_json::json!({}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let chapter = app.chapters().get(chapter_id).await.unwrap();
    assert_eq!(chapter.status, "FAILED");
    assert_eq!(chapter.generation, 1);

    let (status, _) = app
        .request(json_request(
            "POST",
            &format!("/api/v1/chapters/{chapter_id}/reprocess"),
            serde_json::json!({"goal": "foque na emissão"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    // The fresh generation-2 run drafts the chapter again.
    let chapter = app.wait_for_status(chapter_id, ChapterStatus::Drafted).await;
    assert_eq!(chapter.generation, 2);
}
