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

//! Capture sessions: drive a browser, correlate its traffic and archive it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use fastwarc::WarcError;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::CaptureConfig;
use crate::correlate::{Correlator, ExchangeObserver, ResourceTable};
use crate::encode::ContainerEncoder;
use crate::error::{BrowserError, Error, Result};
use crate::model::{rendered_page_url, RequestRecord, ResourceEntry};

/// A remote-controlled browser with a single page.
#[async_trait]
pub trait BrowserSession: Send {
    /// Report every network exchange of the page to `observer` from now on.
    async fn observe(&mut self, observer: Arc<dyn ExchangeObserver>) -> std::result::Result<(), BrowserError>;

    /// Load `url` and return once the network has gone idle.
    async fn navigate(&mut self, url: &str) -> std::result::Result<(), BrowserError>;

    /// PNG screenshot of the page.
    async fn screenshot(&mut self) -> std::result::Result<Vec<u8>, BrowserError>;

    /// Serialized markup of the current DOM.
    async fn content(&mut self) -> std::result::Result<String, BrowserError>;

    /// Shut the browser down.
    async fn close(self) -> std::result::Result<(), BrowserError>;
}

/// Outcome of a finished capture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureSummary {
    pub archive: PathBuf,
    pub screenshot: Option<PathBuf>,
    /// WARC records in the archive, including the warcinfo record.
    pub records: usize,
    /// Entries written as request/response pairs, including the rendered page.
    pub written: usize,
    pub skipped_without_body: usize,
    pub skipped_invalid: usize,
}

/// Capture `target` with `browser` into an archive below `config.output_dir`.
///
/// The browser is closed on every path. If the page does not settle within
/// `config.navigation_timeout`, everything observed until then is still archived
/// and [`Error::NavigationTimeout`] is returned afterwards.
pub async fn capture<B: BrowserSession>(mut browser: B, target: &str, config: &CaptureConfig) -> Result<CaptureSummary> {
    let outcome = run_session(&mut browser, target, config).await;
    let closed = browser.close().await;
    match (outcome, closed) {
        (Ok(summary), Ok(())) => Ok(summary),
        (Ok(_), Err(err)) => Err(err.into()),
        (Err(err), Err(close_err)) => {
            warn!(error = %close_err, "closing the browser failed");
            Err(err)
        }
        (Err(err), Ok(())) => Err(err),
    }
}

async fn run_session<B: BrowserSession>(browser: &mut B, target: &str, config: &CaptureConfig) -> Result<CaptureSummary> {
    tokio::fs::create_dir_all(&config.output_dir).await?;

    let correlator = Arc::new(Correlator::new());
    browser.observe(Arc::clone(&correlator) as Arc<dyn ExchangeObserver>).await?;

    info!(url = target, "navigating");
    let timed_out = match tokio::time::timeout(config.navigation_timeout, browser.navigate(target)).await {
        Ok(navigated) => {
            navigated?;
            false
        }
        Err(_) => {
            warn!(url = target, timeout = ?config.navigation_timeout, "navigation timed out, archiving partial capture");
            true
        }
    };

    let mut screenshot = None;
    if config.screenshot && !timed_out {
        let path = config.screenshot_path(target);
        let png = browser.screenshot().await?;
        tokio::fs::write(&path, png).await?;
        info!(path = %path.display(), "saved screenshot");
        screenshot = Some(path);
    }

    let rendered = match browser.content().await {
        Ok(html) => Some(html),
        Err(err) if timed_out => {
            warn!(error = %err, "rendered markup unavailable");
            None
        }
        Err(err) => return Err(err.into()),
    };

    let table = correlator.drain();
    let archive = config.archive_path(target);
    let (target_owned, software, compress) = (target.to_string(), config.software.clone(), config.compress);
    let mut summary = tokio::task::spawn_blocking(move || {
        write_archive(&archive, &target_owned, rendered, &table, &software, compress)
    })
    .await??;
    summary.screenshot = screenshot;

    info!(
        archive = %summary.archive.display(),
        records = summary.records,
        skipped_without_body = summary.skipped_without_body,
        skipped_invalid = summary.skipped_invalid,
        "capture archived"
    );
    if timed_out {
        return Err(Error::NavigationTimeout(config.navigation_timeout));
    }
    Ok(summary)
}

/// Write the warcinfo record, the rendered page and every entry of `table` to `path`.
///
/// Entries whose headers cannot be framed are skipped. I/O errors abort.
pub fn write_archive(
    path: &Path,
    target: &str,
    rendered: Option<String>,
    table: &ResourceTable,
    software: &str,
    compress: bool,
) -> Result<CaptureSummary> {
    let mut encoder = ContainerEncoder::create(path, compress)?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    encoder.write_container_info(&filename, software)?;

    let page_url = rendered_page_url(target);
    let page = rendered.map(|html| ResourceEntry::rendered_page(html, main_request(table, target)));
    let entries = page.iter().map(|entry| (page_url.as_str(), entry)).chain(table.iter());

    let mut summary = CaptureSummary {
        archive: path.to_path_buf(),
        ..Default::default()
    };
    for (url, entry) in entries {
        match encoder.write_resource_entry(url, entry) {
            Ok(true) => summary.written += 1,
            Ok(false) => {
                debug!(url, id = %entry.id, "no response body, not archived");
                summary.skipped_without_body += 1;
            }
            Err(WarcError::InvalidHeader { name, reason }) => {
                warn!(url, id = %entry.id, header = %name, reason, "skipping exchange with invalid header");
                summary.skipped_invalid += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }

    summary.records = encoder.records_written();
    encoder.close()?;
    Ok(summary)
}

/// Main document request, looked up under the target as given and as normalized by the browser.
fn main_request<'t>(table: &'t ResourceTable, target: &str) -> Option<&'t RequestRecord> {
    table.main_request(target).or_else(|| {
        let normalized = Url::parse(target).ok()?;
        table.main_request(normalized.as_str())
    })
}
