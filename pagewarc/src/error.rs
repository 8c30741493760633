// Copyright 2025 Janek Bevendorff
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types for pagewarc.

use std::time::Duration;

use thiserror::Error;

/// Error reported by a browser session.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct BrowserError {
    message: String,
}

impl BrowserError {
    pub fn new(message: impl Into<String>) -> Self {
        BrowserError { message: message.into() }
    }
}

/// Capture and read errors.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A WARC record could not be written or the archive could not be read.
    #[error("WARC error: {0}")]
    Warc(#[from] fastwarc::WarcError),

    /// The browser session failed.
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),

    /// The page did not settle in time. Whatever was captured until then has been archived.
    #[error("navigation did not finish within {0:?}")]
    NavigationTimeout(Duration),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unknown output format.
    #[error("invalid format {0:?}, expected \"json\" or \"text\"")]
    InvalidFormat(String),

    /// A background task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    /// Short, stable label for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Warc(_) => "warc",
            Error::Browser(_) => "browser",
            Error::NavigationTimeout(_) => "timeout",
            Error::Json(_) => "json",
            Error::InvalidFormat(_) => "usage",
            Error::Task(_) => "task",
        }
    }
}

/// Result type for pagewarc operations.
pub type Result<T> = std::result::Result<T, Error>;
