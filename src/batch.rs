//! Sequential application of pending edits.
//!
//! Each edit is split in two: the tag list goes to the replace call first,
//! everything else to the metadata patch. Items never run concurrently, and
//! one failing item does not stop the rest of the batch.

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{EditorError, Result};
use crate::model::PendingEdit;
use crate::remote::VideoApi;

/// Outcome of a batch run. `succeeded + failed_ids.len() == attempted` always
/// holds, and `attempted < total` only when the run was cancelled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed_ids: Vec<String>,
    pub cancelled: bool,
}

impl BatchSummary {
    pub fn failed(&self) -> usize {
        self.failed_ids.len()
    }
}

pub struct BatchCoordinator<A> {
    api: A,
    cancel: CancellationToken,
}

impl<A: VideoApi> BatchCoordinator<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(api: A, cancel: CancellationToken) -> Self {
        Self { api, cancel }
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Applies `edits` in order and reports progress after every item.
    ///
    /// Item failures, including a 403 on a single video, end up in the
    /// summary. A missing credential, or one the service rejects with 401,
    /// aborts the whole run.
    pub async fn apply<F>(&self, edits: &[PendingEdit], mut on_progress: F) -> Result<BatchSummary>
    where
        F: FnMut(&BatchSummary),
    {
        if !self.api.has_credential() {
            return Err(EditorError::Unauthorized(
                "no Vimeo API token configured".into(),
            ));
        }

        let edits: Vec<&PendingEdit> = edits.iter().filter(|edit| !edit.fields.is_empty()).collect();
        let mut summary = BatchSummary {
            total: edits.len(),
            ..BatchSummary::default()
        };

        for edit in edits {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            summary.attempted += 1;
            match self.apply_one(edit).await {
                Ok(()) => summary.succeeded += 1,
                Err(err @ EditorError::Unauthorized(_)) => return Err(err),
                Err(err) => {
                    warn!(video_id = %edit.video_id, error = %err, "update failed");
                    summary.failed_ids.push(edit.video_id.clone());
                }
            }
            on_progress(&summary);
        }

        info!(
            total = summary.total,
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed(),
            cancelled = summary.cancelled,
            "batch finished"
        );
        Ok(summary)
    }

    /// Runs both phases for a single edit.
    pub async fn apply_one(&self, edit: &PendingEdit) -> Result<()> {
        if let Some(privacy) = edit.fields.privacy
            && !privacy.is_settable()
        {
            return Err(EditorError::BadRequest(format!(
                "privacy '{privacy}' cannot be set on video {}",
                edit.video_id
            )));
        }

        let (tags, patch) = edit.fields.clone().split_tags();
        if let Some(tags) = tags {
            match self.api.replace_video_tags(&edit.video_id, &tags).await {
                Ok(()) => {}
                Err(err @ EditorError::Unauthorized(_)) => return Err(err),
                Err(err) if patch.is_empty() => return Err(err),
                Err(err) => {
                    warn!(video_id = %edit.video_id, error = %err, "tag update failed");
                }
            }
        }
        if !patch.is_empty() {
            self.api.patch_video_metadata(&edit.video_id, &patch).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        CaptionTrack, FolderRecord, MetadataPatch, Privacy, VideoFields, VideoRecord,
    };
    use crate::paginate::{Page, PageCursor};
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct FakeApi {
        calls: Arc<Mutex<Vec<String>>>,
        failing_patches: HashSet<String>,
        failing_tags: HashSet<String>,
        rejected: HashSet<String>,
        forbidden: HashSet<String>,
        no_credential: bool,
    }

    impl FakeApi {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    impl VideoApi for FakeApi {
        fn has_credential(&self) -> bool {
            !self.no_credential
        }

        fn videos_cursor(&self, _folder: Option<&str>) -> Result<PageCursor> {
            Ok(PageCursor::new("videos"))
        }

        fn folders_cursor(&self) -> PageCursor {
            PageCursor::new("folders")
        }

        async fn fetch_videos_page(&self, _cursor: PageCursor) -> Result<Page<VideoRecord>> {
            Ok(Page::last(Vec::new()))
        }

        async fn fetch_folders_page(&self, _cursor: PageCursor) -> Result<Page<FolderRecord>> {
            Ok(Page::last(Vec::new()))
        }

        async fn patch_video_metadata(&self, video_id: &str, _patch: &MetadataPatch) -> Result<()> {
            self.calls.lock().push(format!("PATCH {video_id}"));
            if self.rejected.contains(video_id) {
                return Err(EditorError::from_status(401, "token revoked"));
            }
            if self.forbidden.contains(video_id) {
                return Err(EditorError::from_status(
                    403,
                    "You don't have permission to edit this video",
                ));
            }
            if self.failing_patches.contains(video_id) {
                return Err(EditorError::from_status(500, "boom"));
            }
            Ok(())
        }

        async fn replace_video_tags(&self, video_id: &str, tags: &[String]) -> Result<()> {
            self.calls
                .lock()
                .push(format!("PUT {video_id} {}", tags.join("|")));
            if self.failing_tags.contains(video_id) {
                return Err(EditorError::from_status(500, "tags down"));
            }
            Ok(())
        }

        async fn caption_tracks(&self, _video_id: &str) -> Result<Vec<CaptionTrack>> {
            Ok(Vec::new())
        }
    }

    fn rename(id: &str) -> PendingEdit {
        PendingEdit::new(
            id,
            VideoFields {
                name: Some(format!("Video {id}")),
                ..VideoFields::default()
            },
        )
    }

    fn retag(id: &str, tags: &[&str]) -> PendingEdit {
        PendingEdit::new(
            id,
            VideoFields {
                tags: Some(tags.iter().map(|tag| tag.to_string()).collect()),
                ..VideoFields::default()
            },
        )
    }

    fn ids(list: &[&str]) -> HashSet<String> {
        list.iter().map(|id| id.to_string()).collect()
    }

    #[tokio::test]
    async fn failing_item_does_not_stop_the_batch() {
        let api = FakeApi {
            failing_patches: ids(&["2"]),
            ..FakeApi::default()
        };
        let coordinator = BatchCoordinator::new(api.clone());
        let edits = vec![rename("1"), rename("2"), rename("3")];

        let summary = coordinator.apply(&edits, |_| {}).await.unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed_ids, vec!["2"]);
        assert!(!summary.cancelled);
        assert_eq!(api.calls(), vec!["PATCH 1", "PATCH 2", "PATCH 3"]);
    }

    #[tokio::test]
    async fn tags_only_edit_makes_a_single_call() {
        let api = FakeApi::default();
        let summary = BatchCoordinator::new(api.clone())
            .apply(&[retag("5", &["x", "y"])], |_| {})
            .await
            .unwrap();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(api.calls(), vec!["PUT 5 x|y"]);
    }

    #[tokio::test]
    async fn tags_go_before_metadata() {
        let api = FakeApi::default();
        let edit = PendingEdit::new(
            "9",
            VideoFields {
                name: Some("New".into()),
                tags: Some(vec!["a".into()]),
                privacy: Some(Privacy::Unlisted),
                ..VideoFields::default()
            },
        );
        BatchCoordinator::new(api.clone())
            .apply_one(&edit)
            .await
            .unwrap();
        assert_eq!(api.calls(), vec!["PUT 9 a", "PATCH 9"]);
    }

    #[tokio::test]
    async fn tag_failure_is_tolerated_when_metadata_succeeds() {
        let api = FakeApi {
            failing_tags: ids(&["1"]),
            ..FakeApi::default()
        };
        let mut edit = retag("1", &["x"]);
        edit.fields.description = Some("text".into());
        let summary = BatchCoordinator::new(api.clone())
            .apply(&[edit], |_| {})
            .await
            .unwrap();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(api.calls(), vec!["PUT 1 x", "PATCH 1"]);
    }

    #[tokio::test]
    async fn tags_only_edit_fails_with_its_tag_call() {
        let api = FakeApi {
            failing_tags: ids(&["1"]),
            ..FakeApi::default()
        };
        let summary = BatchCoordinator::new(api)
            .apply(&[retag("1", &["x"]), rename("2")], |_| {})
            .await
            .unwrap();
        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed_ids, vec!["1"]);
    }

    #[tokio::test]
    async fn empty_edits_are_skipped_and_not_counted() {
        let api = FakeApi::default();
        let edits = vec![
            PendingEdit::new("1", VideoFields::default()),
            rename("2"),
        ];
        let summary = BatchCoordinator::new(api.clone())
            .apply(&edits, |_| {})
            .await
            .unwrap();
        assert_eq!(summary.total, 1);
        assert_eq!(summary.attempted, 1);
        assert_eq!(api.calls(), vec!["PATCH 2"]);
    }

    #[tokio::test]
    async fn unsettable_privacy_fails_the_item_without_calls() {
        let api = FakeApi::default();
        let edit = PendingEdit::new(
            "3",
            VideoFields {
                privacy: Some(Privacy::Other),
                ..VideoFields::default()
            },
        );
        let summary = BatchCoordinator::new(api.clone())
            .apply(&[edit], |_| {})
            .await
            .unwrap();
        assert_eq!(summary.failed_ids, vec!["3"]);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn progress_is_reported_after_every_item() {
        let api = FakeApi {
            failing_patches: ids(&["b"]),
            ..FakeApi::default()
        };
        let mut seen = Vec::new();
        let summary = BatchCoordinator::new(api)
            .apply(&[rename("a"), rename("b"), rename("c")], |progress| {
                assert_eq!(progress.succeeded + progress.failed(), progress.attempted);
                seen.push(progress.attempted);
            })
            .await
            .unwrap();
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(summary.succeeded + summary.failed(), summary.attempted);
    }

    #[tokio::test]
    async fn cancellation_stops_before_the_next_item() {
        let api = FakeApi::default();
        let cancel = CancellationToken::new();
        let coordinator = BatchCoordinator::with_cancellation(api.clone(), cancel.clone());
        let summary = coordinator
            .apply(&[rename("1"), rename("2"), rename("3")], |progress| {
                if progress.attempted == 1 {
                    cancel.cancel();
                }
            })
            .await
            .unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.attempted, 1);
        assert_eq!(api.calls(), vec!["PATCH 1"]);
    }

    #[tokio::test]
    async fn missing_credential_aborts_before_any_call() {
        let api = FakeApi {
            no_credential: true,
            ..FakeApi::default()
        };
        let err = BatchCoordinator::new(api.clone())
            .apply(&[rename("1")], |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, EditorError::Unauthorized(_)));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn forbidden_video_fails_only_that_item() {
        let api = FakeApi {
            forbidden: ids(&["2"]),
            ..FakeApi::default()
        };
        let summary = BatchCoordinator::new(api.clone())
            .apply(&[rename("1"), rename("2"), rename("3")], |_| {})
            .await
            .unwrap();
        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed_ids, vec!["2"]);
        assert_eq!(api.calls(), vec!["PATCH 1", "PATCH 2", "PATCH 3"]);
    }

    #[tokio::test]
    async fn rejected_credential_aborts_the_rest_of_the_batch() {
        let api = FakeApi {
            rejected: ids(&["2"]),
            ..FakeApi::default()
        };
        let err = BatchCoordinator::new(api.clone())
            .apply(&[rename("1"), rename("2"), rename("3")], |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, EditorError::Unauthorized(_)));
        assert_eq!(api.calls(), vec!["PATCH 1", "PATCH 2"]);
    }
}
