//! `mediagrab` fetches remote media, picks the best streams under a quality ceiling, and merges
//! them into one playable file.
//!
//! This crate provides:
//! - URL normalization and collection detection
//! - Representation selection as an ordered list of strategies
//! - Streaming acquisition with mapped progress
//! - Merge / audio conversion through an external encoder, bounded by a timeout
//! - Collision-free output naming
//! - A bounded worker pool and output-directory helpers for long-running front ends
//!
//! The library is designed to be used by both CLI tools and long-running services: one
//! [`Pipeline`] is shared by every front end, and each front end supplies its own
//! [`ProgressSink`].

// High-level API (most consumers should start here).
pub mod pipeline;
pub mod progress;

// Configuration and errors.
pub mod config;
pub mod error;

// Data model.
pub mod media;

// Pipeline stages.
pub mod acquire;
pub mod filename;
pub mod merge;
pub mod normalize;
pub mod selector;

// External collaborators and their shipped implementations.
pub mod catalog;
pub mod catalogs;
pub mod tool;

// Background execution and persisted outputs.
pub mod library;
pub mod worker;

// Logging configuration and control.
#[cfg(feature = "logging")]
pub mod logging;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use media::{DownloadRequest, DownloadResult, QualityTarget, ResultKind};
pub use pipeline::Pipeline;
pub use progress::{ProgressEvent, ProgressSink};
