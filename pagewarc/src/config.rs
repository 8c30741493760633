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

//! Capture session settings and output naming.

use std::path::PathBuf;
use std::time::Duration;

/// Settings for one capture session.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Directory receiving the archive and the screenshot.
    pub output_dir: PathBuf,
    /// Save a PNG screenshot next to the archive.
    pub screenshot: bool,
    /// Upper bound for navigation plus the network-idle wait.
    pub navigation_timeout: Duration,
    /// Quiet period without in-flight requests after which the network counts as idle.
    pub network_idle: Duration,
    /// Value of the `software` field in the warcinfo record.
    pub software: String,
    /// Write one gzip member per record.
    pub compress: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            output_dir: PathBuf::from("."),
            screenshot: true,
            navigation_timeout: Duration::from_secs(30),
            network_idle: Duration::from_millis(500),
            software: concat!("pagewarc/", env!("CARGO_PKG_VERSION")).to_string(),
            compress: true,
        }
    }
}

impl CaptureConfig {
    /// Archive path for capturing `url`.
    pub fn archive_path(&self, url: &str) -> PathBuf {
        let extension = if self.compress { "warc.gz" } else { "warc" };
        self.output_dir.join(format!("{}.{extension}", archive_stem(url)))
    }

    /// Screenshot path for capturing `url`.
    pub fn screenshot_path(&self, url: &str) -> PathBuf {
        self.output_dir.join(format!("{}.png", archive_stem(url)))
    }
}

/// File name stem for `url`: scheme removed, only ASCII letters kept.
pub fn archive_stem(url: &str) -> String {
    let rest = ["https://", "http://"]
        .iter()
        .find_map(|scheme| url.strip_prefix(scheme))
        .unwrap_or(url);
    let stem: String = rest.chars().filter(char::is_ascii_alphabetic).collect();
    if stem.is_empty() {
        "capture".to_string()
    } else {
        stem
    }
}
