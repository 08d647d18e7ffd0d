//! Records exchanged with the video service and with our own API.
//!
//! The `Remote*` structs mirror the JSON the service returns; everything else
//! is the flattened shape the editor works with and serves to clients.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::tags;

/// Who can view a video.
///
/// The service knows more settings than the four an editor may choose from;
/// those are kept as `Other` so listings never fail on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    Anybody,
    Unlisted,
    Password,
    Nobody,
    #[serde(other)]
    Other,
}

impl Privacy {
    pub const SETTABLE: [Privacy; 4] = [
        Privacy::Anybody,
        Privacy::Unlisted,
        Privacy::Password,
        Privacy::Nobody,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anybody => "anybody",
            Self::Unlisted => "unlisted",
            Self::Password => "password",
            Self::Nobody => "nobody",
            Self::Other => "other",
        }
    }

    /// `Other` can be displayed but never written back.
    pub fn is_settable(self) -> bool {
        !matches!(self, Self::Other)
    }
}

impl fmt::Display for Privacy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Privacy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "anybody" | "public" => Ok(Self::Anybody),
            "unlisted" => Ok(Self::Unlisted),
            "password" => Ok(Self::Password),
            "nobody" | "private" => Ok(Self::Nobody),
            other => Err(format!(
                "unknown privacy setting '{other}' (expected anybody, unlisted, password or nobody)"
            )),
        }
    }
}

/// A single video as shown in the editor table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub privacy: Privacy,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub duration_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderRecord {
    pub uri: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manage_link: Option<String>,
}

/// Caption (text track) attached to a video. `link` points at the raw
/// caption file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionTrack {
    pub language: String,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub active: bool,
}

/// Subset of editable fields. `None` means "leave untouched".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_tags",
        skip_serializing_if = "Option::is_none"
    )]
    pub tags: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "deserialize_privacy",
        skip_serializing_if = "Option::is_none"
    )]
    pub privacy: Option<Privacy>,
}

impl VideoFields {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.tags.is_none()
            && self.privacy.is_none()
    }

    /// Splits the tag list off the remaining metadata fields. The service
    /// replaces tags through a dedicated endpoint.
    pub fn split_tags(self) -> (Option<Vec<String>>, MetadataPatch) {
        let patch = MetadataPatch {
            name: self.name,
            description: self.description,
            privacy: self.privacy.map(|view| PrivacyPatch { view }),
        };
        (self.tags, patch)
    }
}

/// Minimal diff of a record's fields awaiting persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingEdit {
    pub video_id: String,
    pub fields: VideoFields,
}

impl PendingEdit {
    pub fn new(video_id: impl Into<String>, fields: VideoFields) -> Self {
        Self {
            video_id: video_id.into(),
            fields,
        }
    }
}

/// Body of the metadata PATCH call (everything except tags).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetadataPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub privacy: Option<PrivacyPatch>,
}

impl MetadataPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.privacy.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PrivacyPatch {
    pub view: Privacy,
}

/// Clients send tags either as the raw comma separated text of the editor
/// cell or as a ready list.
#[derive(Deserialize)]
#[serde(untagged)]
enum TagsInput {
    Text(String),
    List(Vec<String>),
}

fn deserialize_tags<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let input = Option::<TagsInput>::deserialize(deserializer)?;
    Ok(input.map(|input| match input {
        TagsInput::Text(text) => tags::normalize(&text),
        TagsInput::List(list) => list
            .iter()
            .flat_map(|tag| tags::normalize(tag))
            .collect(),
    }))
}

/// Accepts both `"unlisted"` and the service's own `{"view": "unlisted"}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum PrivacyInput {
    View { view: Privacy },
    Plain(Privacy),
}

fn deserialize_privacy<'de, D>(deserializer: D) -> Result<Option<Privacy>, D::Error>
where
    D: Deserializer<'de>,
{
    let input = Option::<PrivacyInput>::deserialize(deserializer)?;
    Ok(input.map(|input| match input {
        PrivacyInput::View { view: privacy } | PrivacyInput::Plain(privacy) => privacy,
    }))
}

/// Last path segment of a resource URI, e.g. `/videos/123` -> `123`.
pub fn id_from_uri(uri: &str) -> &str {
    uri.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(uri)
}

/// Video object as returned by the service for the fields we request.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteVideo {
    pub uri: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<RemoteTag>>,
    #[serde(default)]
    pub privacy: Option<RemotePrivacy>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub parent_folder: Option<RemoteFolderRef>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteTag {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemotePrivacy {
    pub view: Privacy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteFolderRef {
    pub uri: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteFolder {
    pub uri: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
}

impl From<RemoteVideo> for VideoRecord {
    fn from(remote: RemoteVideo) -> Self {
        Self {
            id: id_from_uri(&remote.uri).to_string(),
            name: remote.name.unwrap_or_default(),
            description: remote.description.unwrap_or_default(),
            tags: remote
                .tags
                .unwrap_or_default()
                .into_iter()
                .map(|tag| tag.name)
                .collect(),
            privacy: remote
                .privacy
                .map(|privacy| privacy.view)
                .unwrap_or(Privacy::Other),
            status: remote.status.unwrap_or_default(),
            duration_seconds: remote.duration.unwrap_or_default(),
            folder_uri: remote.parent_folder.map(|folder| folder.uri),
        }
    }
}

impl From<RemoteFolder> for FolderRecord {
    fn from(remote: RemoteFolder) -> Self {
        Self {
            uri: remote.uri,
            name: remote.name.unwrap_or_default(),
            manage_link: remote.link,
        }
    }
}
