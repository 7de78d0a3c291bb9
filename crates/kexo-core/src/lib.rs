//! Core domain + application logic for the Kexodrop download bot.
//!
//! Framework-agnostic: Telegram, HTTP and yt-dlp live behind ports (traits)
//! implemented in adapter crates.

pub mod admission;
pub mod ads;
pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod media;
pub mod messaging;
pub mod pipeline;
pub mod ports;
pub mod security;
pub mod urls;
pub mod workspace;

pub use errors::{Error, Result};
