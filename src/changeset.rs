//! Change detection between the snapshot captured when videos were listed and
//! whatever the editor has typed since.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{EditorError, Result};
use crate::model::{PendingEdit, Privacy, VideoFields, VideoRecord};
use crate::tags;

/// Editable state of one row. Tags stay raw text until compared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: String,
    pub privacy: Privacy,
}

impl VideoDraft {
    pub fn from_record(record: &VideoRecord) -> Self {
        Self {
            name: record.name.clone(),
            description: record.description.clone(),
            tags: tags::join(&record.tags),
            privacy: record.privacy,
        }
    }
}

/// Returns only the fields of `draft` that differ from `original`, or `None`
/// when nothing changed.
pub fn detect_changes(original: &VideoRecord, draft: &VideoDraft) -> Option<PendingEdit> {
    let mut fields = VideoFields::default();

    if draft.name != original.name {
        fields.name = Some(draft.name.clone());
    }
    if draft.description != original.description {
        fields.description = Some(draft.description.clone());
    }
    let edited_tags = tags::normalize(&draft.tags);
    if edited_tags != tags::normalize(&tags::join(&original.tags)) {
        fields.tags = Some(edited_tags);
    }
    if draft.privacy != original.privacy {
        fields.privacy = Some(draft.privacy);
    }

    if fields.is_empty() {
        None
    } else {
        Some(PendingEdit::new(original.id.clone(), fields))
    }
}

/// Original snapshots plus the current drafts, keyed by video id.
#[derive(Debug, Default)]
pub struct EditSession {
    order: Vec<String>,
    originals: HashMap<String, VideoRecord>,
    drafts: HashMap<String, VideoDraft>,
}

impl EditSession {
    /// Captures a snapshot of every record and seeds an identical draft.
    pub fn new(records: Vec<VideoRecord>) -> Self {
        let mut session = Self::default();
        for record in records {
            session.drafts.insert(record.id.clone(), VideoDraft::from_record(&record));
            if !session.originals.contains_key(&record.id) {
                session.order.push(record.id.clone());
            }
            session.originals.insert(record.id.clone(), record);
        }
        session
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn original(&self, id: &str) -> Option<&VideoRecord> {
        self.originals.get(id)
    }

    pub fn draft_mut(&mut self, id: &str) -> Option<&mut VideoDraft> {
        self.drafts.get_mut(id)
    }

    /// Replaces the draft for `id`. Ids without a snapshot are accepted here
    /// and reported by [`EditSession::pending_edits`].
    pub fn set_draft(&mut self, id: impl Into<String>, draft: VideoDraft) {
        let id = id.into();
        if !self.drafts.contains_key(&id) && !self.originals.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.drafts.insert(id, draft);
    }

    /// Diffs every draft against its snapshot, in listing order.
    pub fn pending_edits(&self) -> Result<Vec<PendingEdit>> {
        let mut edits = Vec::new();
        for id in &self.order {
            let Some(draft) = self.drafts.get(id) else {
                continue;
            };
            let original = self
                .originals
                .get(id)
                .ok_or_else(|| EditorError::SnapshotMissing(id.clone()))?;
            if let Some(edit) = detect_changes(original, draft) {
                edits.push(edit);
            }
        }
        Ok(edits)
    }
}
