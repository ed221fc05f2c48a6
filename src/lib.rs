//! devsync - bidirectional folder sync for the DEVS agent database
//!
//! This crate mirrors agents, conversations, memories, knowledge items,
//! tasks and studio entries to a local directory as Markdown files with
//! YAML front matter, and merges edits made to those files back into the
//! database.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Entity records (Agent, Conversation, Memory, ...)
//! - [`storage`] - Entity and key-value store traits, SQLite and in-memory stores
//! - [`serializers`] - Entity ⇄ file conversion, one serializer per category
//! - [`sync`] - The sync engine, hash cache and filesystem capability
//! - [`config`] - Database location and engine settings
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod serializers;
pub mod storage;
pub mod sync;

pub use error::{Error, Result};
