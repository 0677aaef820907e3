use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::from_fn;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use clap::Parser;
use futures_util::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tracing::level_filters::LevelFilter;
use tracing::{Level, error, info, warn};
use uuid::Uuid;

mod metrics;

use mediagrab::catalogs::ytdlp::YtDlpCatalog;
use mediagrab::library;
use mediagrab::tool::Ffmpeg;
use mediagrab::worker::{Job, JobHandler, WorkerPool};
use mediagrab::{
    Config, DownloadRequest, DownloadResult, Error, ErrorKind, Pipeline, ProgressEvent,
    ProgressSink, QualityTarget,
};

/// Events buffered per SSE subscriber before it starts missing some.
const EVENT_BUFFER: usize = 256;

#[derive(Parser, Debug)]
#[command(name = "mediagrab-server")]
#[command(about = "HTTP server for media downloads with live progress")]
struct Params {
    /// Host interface to bind to.
    #[arg(long = "host", default_value = "127.0.0.1")]
    host: String,

    /// TCP port to listen on.
    #[arg(long = "port", default_value_t = 8080)]
    port: u16,

    /// Directory that receives finished downloads.
    #[arg(short = 'o', long = "out-dir", default_value = "downloads")]
    out_dir: PathBuf,

    /// Directory for intermediate files (defaults to the OS temp dir).
    #[arg(long = "scratch-dir")]
    scratch_dir: Option<PathBuf>,

    /// Number of download worker threads (defaults to min(CPUs, 4)).
    #[arg(long = "workers")]
    workers: Option<usize>,

    /// Maximum number of queued downloads before new ones are refused.
    #[arg(long = "queue-depth", default_value_t = 32)]
    queue_depth: usize,

    /// ffmpeg executable.
    #[arg(long = "ffmpeg", default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// yt-dlp executable.
    #[arg(long = "yt-dlp", default_value = "yt-dlp")]
    yt_dlp: PathBuf,

    /// Time budget for one merge or conversion, in seconds.
    #[arg(long = "timeout-secs", default_value_t = 300)]
    timeout_secs: u64,

    /// Do not save thumbnails next to finished files.
    #[arg(long = "no-thumbnail", default_value_t = false)]
    no_thumbnail: bool,
}

/// What we push to every `/api/events` subscriber.
#[derive(Debug, Clone)]
enum ServerEvent {
    Progress(ProgressEvent),
    Result { job_id: Uuid, result: DownloadResult },
}

#[derive(Debug, Serialize)]
struct ResultPayload<'a> {
    job_id: Uuid,
    result: &'a DownloadResult,
}

impl ServerEvent {
    fn to_sse(&self) -> Option<Event> {
        let event = match self {
            Self::Progress(progress) => Event::default()
                .event("download_progress")
                .json_data(progress),
            Self::Result { job_id, result } => Event::default()
                .event("download_result")
                .json_data(ResultPayload {
                    job_id: *job_id,
                    result,
                }),
        };

        match event {
            Ok(event) => Some(event),
            Err(err) => {
                warn!(error = %err, "failed to encode event");
                None
            }
        }
    }
}

/// Forwards pipeline progress to every connected listener.
struct BroadcastSink {
    events: broadcast::Sender<ServerEvent>,
}

impl ProgressSink for BroadcastSink {
    fn notify(&self, event: &ProgressEvent) {
        // No subscribers is fine; progress is best-effort.
        let _ = self.events.send(ServerEvent::Progress(event.clone()));
    }
}

/// Runs queued requests through the pipeline on worker threads.
struct Downloader {
    pipeline: Pipeline<YtDlpCatalog, Ffmpeg>,
    sink: BroadcastSink,
}

impl JobHandler for Downloader {
    fn handle(&self, job: &Job) -> DownloadResult {
        metrics::job_started();
        info!(job_id = %job.id, url = %job.request.url, "download started");
        self.pipeline.run(&job.request, &self.sink)
    }

    fn completed(&self, job: &Job, result: &DownloadResult) {
        metrics::job_finished(result);
        info!(job_id = %job.id, success = result.success, "download finished");
        let _ = self.sink.events.send(ServerEvent::Result {
            job_id: job.id,
            result: result.clone(),
        });
    }
}

#[derive(Clone)]
struct AppState {
    pool: Arc<WorkerPool>,
    events: broadcast::Sender<ServerEvent>,
    output_dir: Arc<PathBuf>,
    /// Cancelled on shutdown so open event streams end and graceful shutdown can finish.
    shutdown: CancellationToken,
}

#[derive(Debug, Deserialize)]
struct DownloadBody {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    quality: Option<String>,
    #[serde(default)]
    audio_only: Option<bool>,
}

#[derive(Debug, Serialize)]
struct DownloadStarted {
    success: bool,
    message: &'static str,
    job_id: Uuid,
}

#[derive(Debug, Serialize)]
struct FileEntry {
    filename: String,
    size: u64,
    modified: u64,
    thumbnail: Option<String>,
}

#[derive(Debug, Serialize)]
struct FilesResponse {
    success: bool,
    files: Vec<FileEntry>,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    success: bool,
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let status = if library::is_not_found(&err) {
            StatusCode::NOT_FOUND
        } else {
            match err.kind() {
                ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                ErrorKind::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            success: false,
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[tokio::main]
async fn main() {
    mediagrab::logging::init(LevelFilter::INFO);

    if let Err(err) = run().await {
        error!(error = ?err, "mediagrab-server failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let params = Params::parse();
    metrics::init();

    let addr: SocketAddr = format!("{}:{}", params.host, params.port)
        .parse()
        .context("invalid host/port bind address")?;

    let mut config = Config::new(&params.out_dir)
        .with_conversion_timeout(Duration::from_secs(params.timeout_secs))
        .with_thumbnails(!params.no_thumbnail);
    if let Some(dir) = &params.scratch_dir {
        config = config.with_scratch_dir(dir);
    }
    config
        .ensure_dirs()
        .context("failed to create output directories")?;
    let output_dir = Arc::new(config.output_dir.clone());

    let (events, _) = broadcast::channel(EVENT_BUFFER);
    let pipeline = Pipeline::new(
        YtDlpCatalog::with_program(&params.yt_dlp),
        Ffmpeg::with_program(&params.ffmpeg),
        config,
    );
    let downloader = Downloader {
        pipeline,
        sink: BroadcastSink {
            events: events.clone(),
        },
    };

    let workers = params
        .workers
        .unwrap_or_else(|| num_cpus::get().min(4))
        .max(1);
    let pool = Arc::new(
        WorkerPool::new(workers, params.queue_depth, downloader)
            .context("failed to start worker pool")?,
    );

    let shutdown = CancellationToken::new();
    let state = AppState {
        pool: Arc::clone(&pool),
        events,
        output_dir,
        shutdown: shutdown.clone(),
    };

    let app = router(state).layer(
        TraceLayer::new_for_http()
            .make_span_with(
                DefaultMakeSpan::new()
                    .level(Level::INFO)
                    .include_headers(false),
            )
            .on_response(DefaultOnResponse::new().level(Level::INFO))
            .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
    );

    let listener = TcpListener::bind(addr).await.context("bind failed")?;
    info!(%addr, workers, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("server error")?;

    // Let queued downloads finish before exiting.
    if let Ok(pool) = Arc::try_unwrap(pool) {
        info!("draining download queue");
        tokio::task::spawn_blocking(move || pool.shutdown())
            .await
            .context("worker pool shutdown failed")?;
    }

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics::prometheus_metrics))
        .route("/api/download", post(start_download))
        .route("/api/events", get(events))
        .route("/api/downloads", get(list_downloads))
        .route("/api/downloads/{filename}", delete(delete_download))
        .route("/api/download-file/{filename}", get(download_file))
        .route("/api/thumbnails/{filename}", get(thumbnail))
        .route_layer(from_fn(metrics::track_http_metrics))
        .with_state(state)
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
    shutdown.cancel();
}

async fn root() -> &'static str {
    "mediagrab-server: POST /api/download {\"url\": ...}, progress on GET /api/events"
}

async fn healthz() -> &'static str {
    "ok"
}

async fn start_download(
    State(state): State<AppState>,
    Json(body): Json<DownloadBody>,
) -> std::result::Result<Json<DownloadStarted>, AppError> {
    let request = parse_download_body(body)?;
    let handle = state.pool.try_submit(request)?;

    Ok(Json(DownloadStarted {
        success: true,
        message: "Download started",
        job_id: handle.id,
    }))
}

fn parse_download_body(body: DownloadBody) -> std::result::Result<DownloadRequest, AppError> {
    let url = body.url.unwrap_or_default();
    let url = url.trim();
    if url.is_empty() {
        return Err(AppError::bad_request("URL is required"));
    }

    let audio_only = body.audio_only.unwrap_or(false);
    let target = QualityTarget::from_parts(body.quality.as_deref(), audio_only)?;
    Ok(DownloadRequest::new(url, target))
}

async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let stream = event_stream(state.events.subscribe(), state.shutdown.clone());
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// `connected`, then every broadcast event until the channel closes or `shutdown` fires.
fn event_stream(
    rx: broadcast::Receiver<ServerEvent>,
    shutdown: CancellationToken,
) -> impl Stream<Item = std::result::Result<Event, Infallible>> {
    let connected = stream::once(async {
        Ok::<_, Infallible>(Event::default().event("connected").data("{}"))
    });
    let updates = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(event) = event.to_sse() {
                        return Some((Ok::<_, Infallible>(event), rx));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "event listener lagged, dropping events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    connected
        .chain(updates)
        .take_until(shutdown.cancelled_owned())
}

async fn list_downloads(
    State(state): State<AppState>,
) -> std::result::Result<Json<FilesResponse>, AppError> {
    let dir = Arc::clone(&state.output_dir);
    let outputs = tokio::task::spawn_blocking(move || library::list_outputs(&dir))
        .await
        .map_err(|err| AppError::internal(err.to_string()))??;

    let files = outputs
        .into_iter()
        .map(|out| FileEntry {
            thumbnail: out.thumbnail.map(|name| format!("/api/thumbnails/{name}")),
            filename: out.filename,
            size: out.size,
            modified: out.modified,
        })
        .collect();

    Ok(Json(FilesResponse {
        success: true,
        files,
    }))
}

async fn delete_download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> std::result::Result<Json<MessageResponse>, AppError> {
    let dir = Arc::clone(&state.output_dir);
    tokio::task::spawn_blocking(move || library::delete(&dir, &filename))
        .await
        .map_err(|err| AppError::internal(err.to_string()))??;

    Ok(Json(MessageResponse {
        success: true,
        message: "File deleted",
    }))
}

async fn download_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> std::result::Result<Response, AppError> {
    let disposition = attachment_disposition(&filename);
    serve_file(
        &state.output_dir,
        &filename,
        HeaderValue::from_static("application/octet-stream"),
        Some(disposition),
    )
    .await
}

async fn thumbnail(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> std::result::Result<Response, AppError> {
    serve_file(
        &state.output_dir,
        &filename,
        HeaderValue::from_static("image/jpeg"),
        None,
    )
    .await
}

/// `attachment` with an ASCII `filename` fallback and the exact name as RFC 5987 `filename*`.
fn attachment_disposition(filename: &str) -> HeaderValue {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut encoded = String::with_capacity(filename.len());
    for byte in filename.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }

    HeaderValue::from_str(&format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}"
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// Stream `filename` out of `dir` without buffering it.
async fn serve_file(
    dir: &std::path::Path,
    filename: &str,
    content_type: HeaderValue,
    disposition: Option<HeaderValue>,
) -> std::result::Result<Response, AppError> {
    let path = library::locate(dir, filename)?;
    let file = tokio::fs::File::open(&path).await.map_err(Error::from)?;
    let len = file.metadata().await.map_err(Error::from)?.len();

    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    if let Some(disposition) = disposition {
        headers.insert(header::CONTENT_DISPOSITION, disposition);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediagrab::ResultKind;

    fn test_state(dir: &std::path::Path, queue_depth: usize) -> anyhow::Result<AppState> {
        let (events, _) = broadcast::channel(16);
        let pool = WorkerPool::new(1, queue_depth, |job: &Job| {
            DownloadResult::completed(ResultKind::Video, job.request.url.clone())
        })?;
        Ok(AppState {
            pool: Arc::new(pool),
            events,
            output_dir: Arc::new(dir.to_path_buf()),
            shutdown: CancellationToken::new(),
        })
    }

    fn body(url: Option<&str>, quality: Option<&str>, audio_only: Option<bool>) -> DownloadBody {
        DownloadBody {
            url: url.map(str::to_owned),
            quality: quality.map(str::to_owned),
            audio_only,
        }
    }

    #[test]
    fn empty_url_is_bad_request() {
        for url in [None, Some(""), Some("   ")] {
            let err = parse_download_body(body(url, None, None)).unwrap_err();
            assert_eq!(err.status, StatusCode::BAD_REQUEST);
            assert_eq!(err.message, "URL is required");
        }
    }

    #[test]
    fn body_maps_onto_quality_target() -> anyhow::Result<()> {
        let req = parse_download_body(body(Some(" https://youtu.be/abc "), Some("1080"), None))
            .map_err(|e| anyhow::anyhow!(e.message))?;
        assert_eq!(req.url, "https://youtu.be/abc");
        assert_eq!(req.target, QualityTarget::Ceiling(1080));

        let req = parse_download_body(body(Some("u"), Some("480"), Some(true)))
            .map_err(|e| anyhow::anyhow!(e.message))?;
        assert_eq!(req.target, QualityTarget::AudioOnly);

        let err = parse_download_body(body(Some("u"), Some("best"), None)).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[test]
    fn library_errors_map_to_http_status() {
        let not_found = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(AppError::from(not_found).status, StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::from(Error::QueueFull).status,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::from(Error::InvalidInput("../x".into())).status,
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn start_download_returns_job_id() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let state = test_state(dir.path(), 4)?;

        let Json(started) = start_download(
            State(state),
            Json(body(Some("https://youtu.be/abc"), None, None)),
        )
        .await
        .map_err(|e| anyhow::anyhow!(e.message))?;

        assert!(started.success);
        assert_eq!(started.message, "Download started");
        assert!(!started.job_id.is_nil());
        Ok(())
    }

    #[tokio::test]
    async fn list_downloads_links_thumbnails() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("clip (720p).mp4"), b"video")?;
        std::fs::write(dir.path().join("clip (720p).jpg"), b"thumb")?;
        let state = test_state(dir.path(), 1)?;

        let Json(listing) = list_downloads(State(state))
            .await
            .map_err(|e| anyhow::anyhow!(e.message))?;

        assert!(listing.success);
        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.files[0].filename, "clip (720p).mp4");
        assert_eq!(
            listing.files[0].thumbnail.as_deref(),
            Some("/api/thumbnails/clip (720p).jpg")
        );
        Ok(())
    }

    #[tokio::test]
    async fn traversal_names_are_rejected() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let state = test_state(dir.path(), 1)?;

        let err = download_file(State(state.clone()), Path("../secret".to_owned()))
            .await
            .err()
            .ok_or_else(|| anyhow::anyhow!("expected an error"))?;
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err = delete_download(State(state), Path("ghost.mp4".to_owned()))
            .await
            .err()
            .ok_or_else(|| anyhow::anyhow!("expected an error"))?;
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        Ok(())
    }

    #[tokio::test]
    async fn event_stream_ends_on_shutdown_while_sender_lives() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let state = test_state(dir.path(), 1)?;
        let stream = event_stream(state.events.subscribe(), state.shutdown.clone());

        state.shutdown.cancel();

        // `state.events` is still alive, so only the shutdown token can end this.
        let items: Vec<_> = stream.collect().await;
        assert!(items.len() <= 1);
        drop(state);
        Ok(())
    }

    #[tokio::test]
    async fn event_stream_forwards_progress_until_shutdown() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let state = test_state(dir.path(), 1)?;
        let mut stream = Box::pin(event_stream(
            state.events.subscribe(),
            state.shutdown.clone(),
        ));

        assert!(stream.next().await.is_some(), "connected event");
        state
            .events
            .send(ServerEvent::Progress(ProgressEvent::new("Downloading", 40)))?;
        assert!(stream.next().await.is_some(), "progress event");

        state.shutdown.cancel();
        assert!(stream.next().await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn names_with_an_ellipsis_are_served() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("Wait... what (720p).mp4"), b"video")?;
        let state = test_state(dir.path(), 1)?;

        let response = download_file(State(state), Path("Wait... what (720p).mp4".to_owned()))
            .await
            .map_err(|e| anyhow::anyhow!(e.message))?;
        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }

    #[test]
    fn disposition_carries_utf8_name_and_ascii_fallback() -> anyhow::Result<()> {
        let header = attachment_disposition("Café \"live\" (720p).mp4");
        let value = header.to_str()?;
        assert_eq!(
            value,
            "attachment; filename=\"Caf_ _live_ (720p).mp4\"; \
             filename*=UTF-8''Caf%C3%A9%20%22live%22%20%28720p%29.mp4"
        );

        let plain = attachment_disposition("clip.mp3");
        assert_eq!(
            plain.to_str()?,
            "attachment; filename=\"clip.mp3\"; filename*=UTF-8''clip.mp3"
        );
        Ok(())
    }

    #[test]
    fn result_event_encodes() {
        let event = ServerEvent::Result {
            job_id: Uuid::new_v4(),
            result: DownloadResult::completed(ResultKind::Audio, "song.mp3"),
        };
        assert!(event.to_sse().is_some());
    }
}
