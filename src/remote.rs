//! HTTP client for the Vimeo REST API.
//!
//! `ureq` is blocking, so every request runs on the runtime's blocking pool
//! and the async callers only see futures. [`VideoApi`] is the seam the
//! paginator, the batch coordinator and the tests program against.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::config::ApiSettings;
use crate::error::{EditorError, Result};
use crate::model::{
    CaptionTrack, FolderRecord, MetadataPatch, RemoteFolder, RemoteTag, RemoteVideo, VideoRecord,
};
use crate::paginate::{Envelope, Page, PageCursor, Paginator};

pub const DEFAULT_API_BASE: &str = "https://api.vimeo.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const ACCEPT_HEADER: &str = "application/vnd.vimeo.*+json;version=3.4";
const VIDEO_FIELDS: &str = "uri,name,description,tags,privacy,status,duration,parent_folder";
const FOLDER_FIELDS: &str = "uri,name,link";
const PER_PAGE: u32 = 100;

/// Operations the editor needs from the video service.
///
/// Listing calls return a single page; combine them with a [`Paginator`] (see
/// [`list_videos`] and [`list_folders`]) to get complete listings.
pub trait VideoApi: Send + Sync {
    /// Whether a credential is available at all. Without one every call
    /// would fail, so batch runs refuse to start.
    fn has_credential(&self) -> bool;

    /// Cursor of the first video page, optionally restricted to a folder.
    fn videos_cursor(&self, folder: Option<&str>) -> Result<PageCursor>;

    fn folders_cursor(&self) -> PageCursor;

    fn fetch_videos_page(
        &self,
        cursor: PageCursor,
    ) -> impl Future<Output = Result<Page<VideoRecord>>> + Send;

    fn fetch_folders_page(
        &self,
        cursor: PageCursor,
    ) -> impl Future<Output = Result<Page<FolderRecord>>> + Send;

    /// Merges `patch` into the video's metadata (PATCH semantics).
    fn patch_video_metadata(
        &self,
        video_id: &str,
        patch: &MetadataPatch,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Replaces the complete tag list of a video (PUT semantics).
    fn replace_video_tags(
        &self,
        video_id: &str,
        tags: &[String],
    ) -> impl Future<Output = Result<()>> + Send;

    fn caption_tracks(
        &self,
        video_id: &str,
    ) -> impl Future<Output = Result<Vec<CaptionTrack>>> + Send;
}

/// Every video (optionally of one folder), in server order.
pub async fn list_videos<A: VideoApi>(
    api: &A,
    paginator: &Paginator,
    folder: Option<&str>,
) -> Result<Vec<VideoRecord>> {
    let first = api.videos_cursor(folder)?;
    paginator
        .collect(first, move |cursor| api.fetch_videos_page(cursor))
        .await
}

/// Every folder, in server order.
pub async fn list_folders<A: VideoApi>(api: &A, paginator: &Paginator) -> Result<Vec<FolderRecord>> {
    paginator
        .collect(api.folders_cursor(), move |cursor| {
            api.fetch_folders_page(cursor)
        })
        .await
}

/// Rejects ids that would escape the `/videos/{id}` path.
pub fn validate_video_id(video_id: &str) -> Result<&str> {
    let trimmed = video_id.trim();
    if trimmed.is_empty()
        || !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(EditorError::BadRequest(format!(
            "invalid video id '{video_id}'"
        )));
    }
    Ok(trimmed)
}

/// Which listing a client-supplied cursor is allowed to resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listing {
    Videos,
    Folders,
}

/// Accepts a cursor handed back by a client only when it continues a video
/// or folder listing: `/me/videos`, `/me/projects`, `/users/{id}/...` and
/// `.../projects/{id}/videos`. The server's token is never used for any other
/// client-chosen path.
pub fn resume_cursor(raw: &str, listing: Listing) -> Result<PageCursor> {
    let raw = raw.trim();
    let path_and_query = match raw.split_once("://") {
        Some((_, rest)) => rest.find('/').map_or("", |slash| &rest[slash..]),
        None => raw,
    };
    let path = path_and_query
        .split_once('?')
        .map_or(path_and_query, |(path, _)| path);
    let segments: Vec<&str> = path.trim_end_matches('/').split('/').collect();

    let allowed = !raw.contains('#')
        && match segments.split_first() {
            Some((&"", rest)) => match (owned(rest).as_deref(), listing) {
                (Some(["projects"]), Listing::Folders) => true,
                (Some(["videos"]), Listing::Videos) => true,
                (Some(["projects", id, "videos"]), Listing::Videos) => numeric(id),
                _ => false,
            },
            _ => false,
        };

    if allowed {
        Ok(PageCursor::new(raw))
    } else {
        Err(EditorError::BadRequest(format!(
            "cursor '{raw}' does not continue this listing"
        )))
    }
}

fn numeric(segment: &str) -> bool {
    !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit())
}

/// Segments after a `/me` or `/users/{id}` owner prefix.
fn owned<'a>(segments: &[&'a str]) -> Option<Vec<&'a str>> {
    match segments {
        ["me", rest @ ..] => Some(rest.to_vec()),
        ["users", id, rest @ ..] if numeric(id) => Some(rest.to_vec()),
        _ => None,
    }
}

#[derive(Clone)]
pub struct VimeoClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    agent: ureq::Agent,
    base_url: String,
    token: Option<String>,
}

impl VimeoClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let token = token.filter(|token| !token.trim().is_empty());
        Self {
            inner: Arc::new(ClientInner {
                agent,
                base_url,
                token,
            }),
        }
    }

    pub fn from_settings(settings: &ApiSettings) -> Self {
        Self::new(
            settings.base_url.clone(),
            settings.token.clone(),
            settings.timeout,
        )
    }

    async fn execute(&self, method: &'static str, target: String, body: Option<Value>) -> Result<String> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.execute(method, &target, body.as_ref()))
            .await
            .map_err(|err| EditorError::remote(None, format!("request task failed: {err}")))?
    }

    async fn get_json<T: DeserializeOwned>(&self, target: String) -> Result<T> {
        let body = self.execute("GET", target, None).await?;
        serde_json::from_str(&body).map_err(|err| EditorError::Decode(err.to_string()))
    }
}

impl ClientInner {
    /// Resolves a path or cursor against the API root. Absolute URLs are only
    /// followed when they point back at the same root, so the bearer token
    /// never leaves for another host.
    fn url_for(&self, target: &str) -> Result<String> {
        if target.starts_with("http://") || target.starts_with("https://") {
            if target.starts_with(&format!("{}/", self.base_url)) {
                return Ok(target.to_string());
            }
            return Err(EditorError::BadRequest(format!(
                "refusing to follow cursor outside {}",
                self.base_url
            )));
        }
        if target.starts_with('/') {
            Ok(format!("{}{}", self.base_url, target))
        } else {
            Ok(format!("{}/{}", self.base_url, target))
        }
    }

    fn execute(&self, method: &str, target: &str, body: Option<&Value>) -> Result<String> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| EditorError::Unauthorized("no Vimeo API token configured".into()))?;
        let url = self.url_for(target)?;
        debug!(%method, %url, "calling Vimeo");

        let request = self
            .agent
            .request(method, &url)
            .set("Authorization", &format!("Bearer {token}"))
            .set("Accept", ACCEPT_HEADER);
        let result = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        };

        match result {
            Ok(response) => {
                let status = response.status();
                response
                    .into_string()
                    .map_err(|err| EditorError::remote(Some(status), err.to_string()))
            }
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                Err(EditorError::from_status(status, body))
            }
            Err(ureq::Error::Transport(transport)) => {
                Err(EditorError::remote(None, transport.to_string()))
            }
        }
    }
}

impl VideoApi for VimeoClient {
    fn has_credential(&self) -> bool {
        self.inner.token.is_some()
    }

    fn videos_cursor(&self, folder: Option<&str>) -> Result<PageCursor> {
        let query = format!("fields={VIDEO_FIELDS}&per_page={PER_PAGE}");
        let folder = folder.map(str::trim).filter(|folder| !folder.is_empty());
        let path = match folder {
            None => format!("/me/videos?{query}"),
            Some(uri) if uri.starts_with('/') && !uri.contains(['?', '#']) => {
                format!("{}/videos?{query}", uri.trim_end_matches('/'))
            }
            Some(id) if id.chars().all(|c| c.is_ascii_digit()) => {
                format!("/me/projects/{id}/videos?{query}")
            }
            Some(other) => {
                return Err(EditorError::BadRequest(format!(
                    "invalid folder filter '{other}'"
                )));
            }
        };
        Ok(PageCursor::new(path))
    }

    fn folders_cursor(&self) -> PageCursor {
        PageCursor::new(format!(
            "/me/projects?fields={FOLDER_FIELDS}&per_page={PER_PAGE}"
        ))
    }

    async fn fetch_videos_page(&self, cursor: PageCursor) -> Result<Page<VideoRecord>> {
        let envelope: Envelope<RemoteVideo> = self.get_json(cursor.into_inner()).await?;
        Ok(Page::from(envelope).map(VideoRecord::from))
    }

    async fn fetch_folders_page(&self, cursor: PageCursor) -> Result<Page<FolderRecord>> {
        let envelope: Envelope<RemoteFolder> = self.get_json(cursor.into_inner()).await?;
        Ok(Page::from(envelope).map(FolderRecord::from))
    }

    async fn patch_video_metadata(&self, video_id: &str, patch: &MetadataPatch) -> Result<()> {
        let video_id = validate_video_id(video_id)?;
        let body =
            serde_json::to_value(patch).map_err(|err| EditorError::Decode(err.to_string()))?;
        self.execute("PATCH", format!("/videos/{video_id}"), Some(body))
            .await
            .map(|_| ())
    }

    async fn replace_video_tags(&self, video_id: &str, tags: &[String]) -> Result<()> {
        let video_id = validate_video_id(video_id)?;
        let payload: Vec<RemoteTag> = tags
            .iter()
            .map(|name| RemoteTag { name: name.clone() })
            .collect();
        let body =
            serde_json::to_value(payload).map_err(|err| EditorError::Decode(err.to_string()))?;
        self.execute("PUT", format!("/videos/{video_id}/tags"), Some(body))
            .await
            .map(|_| ())
    }

    async fn caption_tracks(&self, video_id: &str) -> Result<Vec<CaptionTrack>> {
        let video_id = validate_video_id(video_id)?;
        let envelope: Envelope<CaptionTrack> = self
            .get_json(format!("/videos/{video_id}/texttracks"))
            .await?;
        Ok(envelope.data)
    }
}
