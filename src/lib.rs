#![forbid(unsafe_code)]

//! Shared building blocks for the Vimeo editor binaries: the remote client,
//! the paginator, change detection and the batch update coordinator.

pub mod auth;
pub mod batch;
pub mod changeset;
pub mod config;
pub mod error;
pub mod library;
pub mod model;
pub mod paginate;
pub mod remote;
pub mod tags;

pub use error::{EditorError, Result};
