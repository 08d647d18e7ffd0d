//! Folder-grouped view of a library and bulk edits over a selection.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{EditorError, Result};
use crate::model::{FolderRecord, PendingEdit, Privacy, VideoFields, VideoRecord};
use crate::tags;

pub const UNASSIGNED_NAME: &str = "Videos Not in a Folder";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderGroup {
    /// `None` for the bucket of videos without a known folder.
    pub uri: Option<String>,
    pub name: String,
    pub videos: Vec<VideoRecord>,
}

/// Groups `videos` under their folders.
///
/// Folders come out sorted by name (case-insensitive) and empty ones are
/// dropped. The unassigned bucket is always last and always present.
pub fn organize_by_folder(folders: &[FolderRecord], videos: Vec<VideoRecord>) -> Vec<FolderGroup> {
    let mut sorted = folders.to_vec();
    sort_folders(&mut sorted);

    let mut groups: Vec<FolderGroup> = sorted
        .iter()
        .map(|folder| FolderGroup {
            uri: Some(folder.uri.clone()),
            name: folder.name.clone(),
            videos: Vec::new(),
        })
        .collect();
    let index: HashMap<&str, usize> = sorted
        .iter()
        .enumerate()
        .map(|(position, folder)| (folder.uri.trim_end_matches('/'), position))
        .collect();

    let mut unassigned = Vec::new();
    for video in videos {
        let slot = video
            .folder_uri
            .as_deref()
            .and_then(|uri| index.get(uri.trim_end_matches('/')).copied());
        match slot {
            Some(position) => groups[position].videos.push(video),
            None => unassigned.push(video),
        }
    }

    groups.retain(|group| !group.videos.is_empty());
    groups.push(FolderGroup {
        uri: None,
        name: UNASSIGNED_NAME.to_string(),
        videos: unassigned,
    });
    groups
}

/// Sorts by lowercase name, falling back to the uri for equal names.
pub fn sort_folders(folders: &mut [FolderRecord]) {
    folders.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.uri.cmp(&b.uri))
    });
}

/// Options applied uniformly to a selection of videos.
#[derive(Debug, Clone, Default)]
pub struct BulkEdit {
    pub privacy: Option<Privacy>,
    pub add_tags: Vec<String>,
}

impl BulkEdit {
    pub fn is_empty(&self) -> bool {
        self.privacy.is_none() && self.add_tags.is_empty()
    }
}

/// One edit per selected video that is known in `videos`, in selection
/// order. Added tags are appended after the existing ones without
/// duplicates; a video whose tags would not change gets no tag field, and a
/// video with nothing to change gets no edit.
pub fn bulk_edits<S: AsRef<str>>(
    videos: &[VideoRecord],
    selection: &[S],
    edit: &BulkEdit,
) -> Result<Vec<PendingEdit>> {
    if edit.is_empty() {
        return Err(EditorError::BadRequest(
            "choose a privacy setting or tags to add".into(),
        ));
    }
    if let Some(privacy) = edit.privacy
        && !privacy.is_settable()
    {
        return Err(EditorError::BadRequest(format!(
            "privacy '{privacy}' cannot be set"
        )));
    }

    let by_id: HashMap<&str, &VideoRecord> = videos
        .iter()
        .map(|video| (video.id.as_str(), video))
        .collect();
    let additions: Vec<String> = edit
        .add_tags
        .iter()
        .flat_map(|raw| tags::normalize(raw))
        .collect();

    let mut edits = Vec::new();
    let mut seen = Vec::new();
    for id in selection {
        let id = id.as_ref().trim();
        if seen.contains(&id) {
            continue;
        }
        seen.push(id);
        let Some(video) = by_id.get(id) else {
            continue;
        };

        let mut fields = VideoFields {
            privacy: edit.privacy,
            ..VideoFields::default()
        };
        if !additions.is_empty() {
            let merged = tags::merge_unique(&video.tags, &additions);
            if merged != video.tags {
                fields.tags = Some(merged);
            }
        }
        if !fields.is_empty() {
            edits.push(PendingEdit::new(video.id.clone(), fields));
        }
    }
    Ok(edits)
}
