//! Error types shared by the playlist, storage, geolocation and player code

use thiserror::Error;

/// Every recoverable failure the player can run into.
///
/// Malformed playlist entries are not errors: the parser drops them.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Request failed: {0}")]
    Http(#[from] ureq::Error),

    #[error("HTTP error: {0}")]
    Status(u16),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to launch player '{player}': {source}")]
    PlayerLaunch {
        player: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
