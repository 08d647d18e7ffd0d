#![forbid(unsafe_code)]

//! Command-line editor for a Vimeo library.
//!
//! `export` writes the current metadata to a TOML sheet, `sync` diffs an
//! edited sheet against a fresh listing and pushes only what changed.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vimeo_editor_tools::{
    batch::{BatchCoordinator, BatchSummary},
    changeset::{EditSession, VideoDraft},
    config::{RuntimeOverrides, resolve_api_settings},
    library::{BulkEdit, bulk_edits, sort_folders},
    model::{PendingEdit, Privacy, VideoRecord},
    paginate::Paginator,
    remote::{self, VideoApi, VimeoClient},
    tags,
};

#[derive(Debug, Parser)]
#[command(name = "editor", about = "Bulk metadata editor for a Vimeo library")]
struct Cli {
    /// Alternative .env file with VIMEO_* settings.
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Maximum number of pages fetched per listing.
    #[arg(long, global = true)]
    page_ceiling: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List every folder, sorted by name.
    Folders,
    /// List every video, optionally of one folder.
    Videos {
        #[arg(long)]
        folder: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List the caption tracks of a video.
    Captions { video_id: String },
    /// Write an editable sheet of the current videos.
    Export {
        #[arg(long)]
        folder: Option<String>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Apply the changes made to an exported sheet.
    Sync {
        file: PathBuf,
        #[arg(long)]
        dry_run: bool,
    },
    /// Set privacy and/or add tags on many videos of a folder at once.
    Bulk {
        #[arg(long)]
        folder: String,
        /// Restrict to these video ids (default: every video of the folder).
        #[arg(long = "video")]
        videos: Vec<String>,
        #[arg(long)]
        privacy: Option<Privacy>,
        #[arg(long = "add-tags")]
        add_tags: Vec<String>,
    },
}

/// On-disk format of `export`/`sync`.
#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
struct EditSheet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    folder: Option<String>,
    #[serde(default)]
    videos: Vec<SheetRow>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct SheetRow {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tags: String,
    #[serde(deserialize_with = "deserialize_sheet_privacy")]
    privacy: Privacy,
}

/// Sheet privacy is parsed with `Privacy`'s `FromStr` so a typo fails the
/// parse. `other` is what `export` writes for settings that cannot be
/// chosen and is read back unchanged.
fn deserialize_sheet_privacy<'de, D>(deserializer: D) -> std::result::Result<Privacy, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    if value.trim().eq_ignore_ascii_case(Privacy::Other.as_str()) {
        return Ok(Privacy::Other);
    }
    value.parse().map_err(serde::de::Error::custom)
}

impl SheetRow {
    fn from_record(record: &VideoRecord) -> Self {
        let draft = VideoDraft::from_record(record);
        Self {
            id: record.id.clone(),
            name: draft.name,
            description: draft.description,
            tags: draft.tags,
            privacy: draft.privacy,
        }
    }

    fn into_draft(self) -> (String, VideoDraft) {
        (
            self.id,
            VideoDraft {
                name: self.name,
                description: self.description,
                tags: self.tags,
                privacy: self.privacy,
            },
        )
    }
}

fn sheet_from_records(folder: Option<String>, records: &[VideoRecord]) -> EditSheet {
    EditSheet {
        folder,
        videos: records.iter().map(SheetRow::from_record).collect(),
    }
}

/// Snapshots `originals` and overlays every row of the sheet as a draft.
fn session_from_sheet(originals: Vec<VideoRecord>, sheet: EditSheet) -> EditSession {
    let mut session = EditSession::new(originals);
    for row in sheet.videos {
        let (id, draft) = row.into_draft();
        session.set_draft(id, draft);
    }
    session
}

fn describe_edit(edit: &PendingEdit) -> String {
    let fields = &edit.fields;
    let mut changed = Vec::new();
    if let Some(name) = &fields.name {
        changed.push(format!("name={name:?}"));
    }
    if fields.description.is_some() {
        changed.push("description".to_string());
    }
    if let Some(list) = &fields.tags {
        changed.push(format!("tags=[{}]", tags::join(list)));
    }
    if let Some(privacy) = fields.privacy {
        changed.push(format!("privacy={privacy}"));
    }
    format!("{}: {}", edit.video_id, changed.join(" "))
}

fn video_line(video: &VideoRecord) -> String {
    format!(
        "{}\t{}\t{}\t{}",
        video.id,
        video.privacy,
        video.name,
        tags::join(&video.tags)
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = resolve_api_settings(RuntimeOverrides {
        env_path: cli.env_file,
        page_ceiling: cli.page_ceiling,
        ..RuntimeOverrides::default()
    })
    .context("loading Vimeo settings")?;
    let api = VimeoClient::from_settings(&settings);
    let paginator = Paginator::new(settings.page_ceiling);

    match cli.command {
        Command::Folders => {
            let mut folders = remote::list_folders(&api, &paginator)
                .await
                .context("listing folders")?;
            sort_folders(&mut folders);
            for folder in folders {
                println!("{}\t{}", folder.uri, folder.name);
            }
        }
        Command::Videos { folder, json } => {
            let videos = remote::list_videos(&api, &paginator, folder.as_deref())
                .await
                .context("listing videos")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&videos)?);
            } else {
                for video in &videos {
                    println!("{}", video_line(video));
                }
            }
        }
        Command::Captions { video_id } => {
            let tracks = api
                .caption_tracks(&video_id)
                .await
                .with_context(|| format!("listing captions of {video_id}"))?;
            if tracks.is_empty() {
                println!("No caption tracks for {video_id}");
            }
            for track in tracks {
                let state = if track.active { "active" } else { "inactive" };
                println!("{}\t{}\t{}", track.language, state, track.link);
            }
        }
        Command::Export { folder, out } => {
            let videos = remote::list_videos(&api, &paginator, folder.as_deref())
                .await
                .context("listing videos")?;
            write_sheet(&out, &sheet_from_records(folder, &videos))?;
            println!("Wrote {} videos to {}", videos.len(), out.display());
        }
        Command::Sync { file, dry_run } => {
            let sheet = read_sheet(&file)?;
            let originals = remote::list_videos(&api, &paginator, sheet.folder.as_deref())
                .await
                .context("listing videos")?;
            let session = session_from_sheet(originals, sheet);
            let edits = session
                .pending_edits()
                .with_context(|| format!("comparing {} against Vimeo", file.display()))?;
            if edits.is_empty() {
                println!("No changes.");
                return Ok(());
            }
            for edit in &edits {
                println!("{}", describe_edit(edit));
            }
            if dry_run {
                println!("{} videos would be updated (dry run).", edits.len());
                return Ok(());
            }
            apply_edits(api, &edits).await?;
        }
        Command::Bulk {
            folder,
            videos,
            privacy,
            add_tags,
        } => {
            let listed = remote::list_videos(&api, &paginator, Some(folder.as_str()))
                .await
                .context("listing videos")?;
            let selection: Vec<String> = if videos.is_empty() {
                listed.iter().map(|video| video.id.clone()).collect()
            } else {
                videos
            };
            let edits = bulk_edits(&listed, &selection, &BulkEdit { privacy, add_tags })?;
            if edits.is_empty() {
                println!("Nothing to change.");
                return Ok(());
            }
            apply_edits(api, &edits).await?;
        }
    }

    Ok(())
}

fn read_sheet(path: &Path) -> Result<EditSheet> {
    let text = fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("Parsing {}", path.display()))
}

fn write_sheet(path: &Path, sheet: &EditSheet) -> Result<()> {
    let text = toml::to_string_pretty(sheet).context("serializing sheet")?;
    fs::write(path, text).with_context(|| format!("Writing {}", path.display()))
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            eprintln!("\nStopping after the current video...");
            trigger.cancel();
        }
    });
    cancel
}

async fn apply_edits(api: VimeoClient, edits: &[PendingEdit]) -> Result<()> {
    let coordinator = BatchCoordinator::with_cancellation(api, cancel_on_ctrl_c());
    let summary = coordinator
        .apply(edits, |progress| {
            eprint!("\rUpdated {} of {}", progress.attempted, progress.total);
            let _ = io::stderr().flush();
        })
        .await
        .context("applying updates")?;
    eprintln!();
    report(&summary)
}

fn report(summary: &BatchSummary) -> Result<()> {
    info!(?summary, "batch summary");
    println!(
        "{} of {} videos updated.",
        summary.succeeded, summary.total
    );
    if summary.cancelled {
        println!(
            "Cancelled: {} videos were not attempted.",
            summary.total - summary.attempted
        );
    }
    if !summary.failed_ids.is_empty() {
        warn!(failed = ?summary.failed_ids, "some updates failed");
        bail!("failed to update: {}", summary.failed_ids.join(", "));
    }
    Ok(())
}
