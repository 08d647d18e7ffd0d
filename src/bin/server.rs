#![forbid(unsafe_code)]

//! Axum proxy in front of the Vimeo API for the admin UI.
//!
//! Browsers never see the Vimeo token: every `/api/*` route checks one of the
//! pre-shared editor tokens and then calls Vimeo with the server's own
//! credential. Everything outside `/api` is the static admin UI.

use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    path::{Component, Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use anyhow::{Context, Result, anyhow};
use axum::{
    Json, Router,
    body::Body,
    extract::{Path as AxumPath, Query, Request, State, rejection::JsonRejection},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use mime_guess::MimeGuess;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::{fs::File, signal};
use tokio_util::{io::ReaderStream, sync::CancellationToken};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use vimeo_editor_tools::{
    EditorError,
    auth::AccessGate,
    batch::{BatchCoordinator, BatchSummary},
    config::{RuntimeOverrides, resolve_server_settings},
    library::{FolderGroup, organize_by_folder, sort_folders},
    model::{CaptionTrack, FolderRecord, PendingEdit, VideoFields, VideoRecord},
    paginate::{PageCursor, Paginator},
    remote::{self, Listing, VideoApi, VimeoClient},
};

#[derive(Debug, Clone, Default)]
struct ServerArgs {
    overrides: RuntimeOverrides,
}

impl ServerArgs {
    fn parse() -> Result<Self> {
        Self::from_iter(std::env::args().skip(1))
    }

    fn from_iter<I>(iter: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut overrides = RuntimeOverrides::default();
        let mut args = iter.into_iter();
        while let Some(arg) = args.next() {
            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) if flag.starts_with("--") => {
                    (flag.to_string(), Some(value.to_string()))
                }
                _ => (arg.clone(), None),
            };
            let mut value = || {
                inline
                    .clone()
                    .or_else(|| args.next())
                    .ok_or_else(|| anyhow!("{flag} requires a value"))
            };
            match flag.as_str() {
                "--port" => overrides.port = Some(parse_port_arg(&value()?)?),
                "--host" => overrides.host = Some(parse_host_arg(&value()?)?),
                "--www-root" => overrides.www_root = Some(PathBuf::from(value()?)),
                "--env-file" => overrides.env_path = Some(PathBuf::from(value()?)),
                _ => return Err(anyhow!("unknown argument: {arg}")),
            }
        }
        Ok(Self { overrides })
    }
}

fn parse_port_arg(value: &str) -> Result<u16> {
    value
        .parse::<u16>()
        .context("expected a numeric port between 0 and 65535")
}

fn parse_host_arg(value: &str) -> Result<IpAddr> {
    value
        .parse::<IpAddr>()
        .context("expected a valid IPv4 or IPv6 address for --host/EDITOR_HOST")
}

/// Shared state injected into every handler.
#[derive(Clone)]
struct AppState {
    api: VimeoClient,
    paginator: Paginator,
    gate: Arc<AccessGate>,
    www_root: Arc<PathBuf>,
    jobs: BulkJobManager,
}

impl AppState {
    fn new(api: VimeoClient, paginator: Paginator, gate: AccessGate, www_root: PathBuf) -> Self {
        Self {
            jobs: BulkJobManager::new(api.clone()),
            api,
            paginator,
            gate: Arc::new(gate),
            www_root: Arc::new(www_root),
        }
    }
}

/// How long a finished job stays pollable before it is dropped.
const FINISHED_JOB_RETENTION: Duration = Duration::from_secs(60 * 60);

/// Background batch runs, polled by the UI for progress.
#[derive(Clone)]
struct BulkJobManager {
    inner: Arc<BulkJobManagerInner>,
}

struct BulkJobManagerInner {
    jobs: Mutex<HashMap<String, BulkJob>>,
    counter: AtomicUsize,
    api: VimeoClient,
    retention: Duration,
}

#[derive(Clone)]
struct BulkJob {
    id: String,
    status: BulkJobState,
    summary: BatchSummary,
    message: String,
    cancel: CancellationToken,
    finished_at: Option<Instant>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BulkJobState {
    Queued,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl BulkJobState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BulkJobResponse {
    id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkJobStatus {
    id: String,
    status: String,
    total: usize,
    attempted: usize,
    succeeded: usize,
    failed_ids: Vec<String>,
    message: String,
}

impl From<&BulkJob> for BulkJobStatus {
    fn from(job: &BulkJob) -> Self {
        Self {
            id: job.id.clone(),
            status: job.status.as_str().to_string(),
            total: job.summary.total,
            attempted: job.summary.attempted,
            succeeded: job.summary.succeeded,
            failed_ids: job.summary.failed_ids.clone(),
            message: job.message.clone(),
        }
    }
}

impl BulkJobManager {
    fn new(api: VimeoClient) -> Self {
        Self::with_retention(api, FINISHED_JOB_RETENTION)
    }

    fn with_retention(api: VimeoClient, retention: Duration) -> Self {
        Self {
            inner: Arc::new(BulkJobManagerInner {
                jobs: Mutex::new(HashMap::new()),
                counter: AtomicUsize::new(1),
                api,
                retention,
            }),
        }
    }

    fn start(&self, edits: Vec<PendingEdit>) -> Result<String, EditorError> {
        self.prune_finished();
        if !self.inner.api.has_credential() {
            return Err(EditorError::Unauthorized(
                "no Vimeo API token configured".into(),
            ));
        }
        let job_id = self.next_job_id();
        let cancel = CancellationToken::new();
        let total = edits.iter().filter(|edit| !edit.fields.is_empty()).count();

        self.inner.jobs.lock().insert(
            job_id.clone(),
            BulkJob {
                id: job_id.clone(),
                status: BulkJobState::Queued,
                summary: BatchSummary {
                    total,
                    ..BatchSummary::default()
                },
                message: "Queued".to_string(),
                cancel: cancel.clone(),
                finished_at: None,
            },
        );

        let inner = self.inner.clone();
        let job_id_clone = job_id.clone();
        tokio::spawn(async move {
            update_job(&inner, &job_id_clone, |job| {
                job.status = BulkJobState::Running;
                job.message = "Running".to_string();
            });
            let coordinator = BatchCoordinator::with_cancellation(inner.api.clone(), cancel);
            let progress_inner = inner.clone();
            let progress_id = job_id_clone.clone();
            let result = coordinator
                .apply(&edits, move |summary| {
                    update_job(&progress_inner, &progress_id, |job| {
                        job.summary = summary.clone();
                        job.message = format!("Updated {} of {}", summary.attempted, summary.total);
                    });
                })
                .await;

            match result {
                Ok(summary) => {
                    let status = if summary.cancelled {
                        BulkJobState::Cancelled
                    } else {
                        BulkJobState::Completed
                    };
                    let message = format!(
                        "{} of {} updated, {} failed",
                        summary.succeeded,
                        summary.total,
                        summary.failed()
                    );
                    info!(job = %job_id_clone, %message, "bulk job finished");
                    update_job(&inner, &job_id_clone, |job| {
                        job.status = status;
                        job.summary = summary;
                        job.message = message;
                        job.finished_at = Some(Instant::now());
                    });
                }
                Err(err) => {
                    error!(job = %job_id_clone, error = %err, "bulk job aborted");
                    update_job(&inner, &job_id_clone, |job| {
                        job.status = BulkJobState::Failed;
                        job.message = format!("Failed: {err}");
                        job.finished_at = Some(Instant::now());
                    });
                }
            }
        });

        Ok(job_id)
    }

    fn get_status(&self, job_id: &str) -> Option<BulkJobStatus> {
        self.prune_finished();
        self.inner.jobs.lock().get(job_id).map(BulkJobStatus::from)
    }

    /// Stops the job before its next item. Finished jobs are left untouched.
    fn cancel(&self, job_id: &str) -> Option<BulkJobStatus> {
        self.prune_finished();
        let jobs = self.inner.jobs.lock();
        let job = jobs.get(job_id)?;
        job.cancel.cancel();
        Some(BulkJobStatus::from(job))
    }

    fn prune_finished(&self) {
        let retention = self.inner.retention;
        self.inner.jobs.lock().retain(|_, job| {
            job.finished_at
                .is_none_or(|finished| finished.elapsed() < retention)
        });
    }

    fn next_job_id(&self) -> String {
        let id = self.inner.counter.fetch_add(1, Ordering::Relaxed);
        format!("bulk-{id}")
    }
}

fn update_job(inner: &BulkJobManagerInner, job_id: &str, change: impl FnOnce(&mut BulkJob)) {
    if let Some(job) = inner.jobs.lock().get_mut(job_id) {
        change(job);
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }
}

impl From<EditorError> for ApiError {
    fn from(err: EditorError) -> Self {
        let status = match &err {
            EditorError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            EditorError::BadRequest(_) => StatusCode::BAD_REQUEST,
            EditorError::NotFound(_) => StatusCode::NOT_FOUND,
            EditorError::RemoteFetchFailed { status, .. } => status
                .filter(|code| (400..=599).contains(code))
                .and_then(|code| StatusCode::from_u16(code).ok())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            EditorError::PaginationExhausted { .. } | EditorError::Decode(_) => {
                StatusCode::BAD_GATEWAY
            }
            EditorError::SnapshotMissing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %err, "request failed");
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let ServerArgs { overrides } = ServerArgs::parse()?;
    let settings = resolve_server_settings(overrides).context("loading server settings")?;

    let state = AppState::new(
        VimeoClient::from_settings(&settings.api),
        Paginator::new(settings.api.page_ceiling),
        AccessGate::new(&settings.access_tokens),
        settings.www_root.clone(),
    );
    let app = build_router(state);

    let addr = SocketAddr::new(settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    info!(%addr, www_root = %settings.www_root.display(), "editor proxy listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running editor proxy")?;

    Ok(())
}

fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/videos", get(list_video_page))
        .route("/api/videos/all", get(list_all_videos))
        .route("/api/folders", get(list_folder_page))
        .route("/api/folders/all", get(list_all_folders))
        .route("/api/library", get(library))
        .route("/api/update-video", patch(update_video))
        .route("/api/captions", get(captions))
        .route("/api/bulk-jobs", post(start_bulk_job))
        .route(
            "/api/bulk-jobs/{id}",
            get(get_bulk_job).delete(cancel_bulk_job),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_access,
        ));

    Router::new()
        .merge(api)
        .fallback(static_fallback)
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        error!("failed to install Ctrl+C handler: {err}");
    }
}

async fn require_access(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.gate.is_authorized(request.headers()) {
        warn!(path = %request.uri().path(), "rejected request without a valid editor token");
        return ApiError::unauthorized("You must be logged in.").into_response();
    }
    next.run(request).await
}

async fn static_fallback(State(state): State<AppState>, req: Request<Body>) -> Response {
    let path = req.uri().path();
    if path == "/api" || path.starts_with("/api/") {
        return ApiError::not_found("endpoint not found").into_response();
    }

    match serve_www_path(&state.www_root, path).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoPageQuery {
    folder_uri: Option<String>,
    page: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FolderPageQuery {
    page: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptionQuery {
    video_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoPage {
    data: Vec<VideoRecord>,
    next_page_path: Option<PageCursor>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FolderPage {
    folders: Vec<FolderRecord>,
    next_page_path: Option<PageCursor>,
}

#[derive(Serialize)]
struct AllVideos {
    data: Vec<VideoRecord>,
}

#[derive(Serialize)]
struct AllFolders {
    folders: Vec<FolderRecord>,
}

#[derive(Serialize)]
struct Library {
    groups: Vec<FolderGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateVideoRequest {
    video_id: Option<String>,
    updates: Option<VideoFields>,
}

#[derive(Serialize)]
struct UpdateVideoResponse {
    success: bool,
    message: &'static str,
}

#[derive(Debug, Deserialize)]
struct BulkJobRequest {
    edits: Vec<PendingEdit>,
}

/// The `page` cursor sent back by a client, restricted to `listing`.
fn explicit_cursor(page: Option<String>, listing: Listing) -> Result<Option<PageCursor>, EditorError> {
    page.as_deref()
        .map(str::trim)
        .filter(|page| !page.is_empty())
        .map(|page| remote::resume_cursor(page, listing))
        .transpose()
}

/// One page of videos. Clients pass `nextPagePath` back as `page`.
async fn list_video_page(
    State(state): State<AppState>,
    Query(query): Query<VideoPageQuery>,
) -> ApiResult<Json<VideoPage>> {
    let cursor = match explicit_cursor(query.page, Listing::Videos)? {
        Some(cursor) => cursor,
        None => state.api.videos_cursor(query.folder_uri.as_deref())?,
    };
    let page = state.api.fetch_videos_page(cursor).await?;
    Ok(Json(VideoPage {
        data: page.items,
        next_page_path: page.next,
    }))
}

async fn list_folder_page(
    State(state): State<AppState>,
    Query(query): Query<FolderPageQuery>,
) -> ApiResult<Json<FolderPage>> {
    let cursor = match explicit_cursor(query.page, Listing::Folders)? {
        Some(cursor) => cursor,
        None => state.api.folders_cursor(),
    };
    let page = state.api.fetch_folders_page(cursor).await?;
    Ok(Json(FolderPage {
        folders: page.items,
        next_page_path: page.next,
    }))
}

async fn list_all_videos(
    State(state): State<AppState>,
    Query(query): Query<VideoPageQuery>,
) -> ApiResult<Json<AllVideos>> {
    let data = remote::list_videos(&state.api, &state.paginator, query.folder_uri.as_deref()).await?;
    Ok(Json(AllVideos { data }))
}

async fn list_all_folders(State(state): State<AppState>) -> ApiResult<Json<AllFolders>> {
    let mut folders = remote::list_folders(&state.api, &state.paginator).await?;
    sort_folders(&mut folders);
    Ok(Json(AllFolders { folders }))
}

async fn library(State(state): State<AppState>) -> ApiResult<Json<Library>> {
    let folders = remote::list_folders(&state.api, &state.paginator).await?;
    let videos = remote::list_videos(&state.api, &state.paginator, None).await?;
    Ok(Json(Library {
        groups: organize_by_folder(&folders, videos),
    }))
}

async fn update_video(
    State(state): State<AppState>,
    payload: Result<Json<UpdateVideoRequest>, JsonRejection>,
) -> ApiResult<Json<UpdateVideoResponse>> {
    let Json(payload) = payload?;
    let video_id = payload
        .video_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing video ID or update data."))?;
    let updates = payload
        .updates
        .filter(|updates| !updates.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing video ID or update data."))?;

    let edit = PendingEdit::new(video_id, updates);
    BatchCoordinator::new(state.api.clone())
        .apply_one(&edit)
        .await?;
    info!(video_id = %edit.video_id, "video updated");
    Ok(Json(UpdateVideoResponse {
        success: true,
        message: "Video updated successfully.",
    }))
}

async fn captions(
    State(state): State<AppState>,
    Query(query): Query<CaptionQuery>,
) -> ApiResult<Json<Vec<CaptionTrack>>> {
    let video_id = query
        .video_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("A video ID must be provided."))?;
    let tracks = state.api.caption_tracks(&video_id).await?;
    Ok(Json(tracks))
}

async fn start_bulk_job(
    State(state): State<AppState>,
    payload: Result<Json<BulkJobRequest>, JsonRejection>,
) -> ApiResult<Json<BulkJobResponse>> {
    let Json(payload) = payload?;
    let id = state.jobs.start(payload.edits)?;
    Ok(Json(BulkJobResponse { id }))
}

async fn get_bulk_job(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<BulkJobStatus>> {
    let status = state
        .jobs
        .get_status(&id)
        .ok_or_else(|| ApiError::not_found("bulk job not found"))?;
    Ok(Json(status))
}

async fn cancel_bulk_job(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<BulkJobStatus>> {
    let status = state
        .jobs
        .cancel(&id)
        .ok_or_else(|| ApiError::not_found("bulk job not found"))?;
    Ok(Json(status))
}

async fn serve_www_path(root: &Path, request_path: &str) -> ApiResult<Response> {
    let target = resolve_www_path(root, request_path)?;
    let metadata = tokio::fs::metadata(&target).await;

    match metadata {
        Ok(meta) if meta.is_dir() => stream_file(root.join("index.html")).await,
        Ok(_) => stream_file(target).await,
        Err(_) => {
            if should_fallback_to_index(request_path) {
                stream_file(root.join("index.html")).await
            } else {
                Err(ApiError::not_found("file not found"))
            }
        }
    }
}

fn resolve_www_path(root: &Path, request_path: &str) -> ApiResult<PathBuf> {
    let trimmed = request_path.trim_start_matches('/');
    if trimmed.is_empty() {
        return Ok(root.join("index.html"));
    }
    let candidate = Path::new(trimmed);
    if candidate
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        return Err(ApiError::not_found("file not found"));
    }
    Ok(root.join(candidate))
}

fn should_fallback_to_index(request_path: &str) -> bool {
    let trimmed = request_path.trim_start_matches('/');
    trimmed.is_empty() || Path::new(trimmed).extension().is_none()
}

async fn stream_file(path: PathBuf) -> ApiResult<Response> {
    let file = File::open(&path)
        .await
        .map_err(|_| ApiError::not_found("file not found"))?;
    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    if let Some(mime) = MimeGuess::from_path(&path).first()
        && let Ok(value) = mime.to_string().parse()
    {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    Ok(response)
}
