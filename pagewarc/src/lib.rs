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

//! Capture a rendered web page together with every resource it loaded into a
//! WARC archive, and read such archives back.
//!
//! A capture runs in three stages:
//!
//! 1. a [`BrowserSession`] loads the page and reports each network exchange to a
//!    [`Correlator`], which joins requests and responses by URL and request ID,
//! 2. the rendered DOM is added as a synthetic entry under `<url>#rendered-html`,
//! 3. a [`ContainerEncoder`] writes every entry with a body as a WARC
//!    request/response pair, one gzip member per record.
//!
//! [`read_container`] decodes an archive into labelled records, rendered as JSON
//! or as a text report.

pub mod capture;
#[cfg(feature = "chromium")]
pub mod chromium;
pub mod config;
pub mod correlate;
pub mod decode;
pub mod encode;
pub mod error;
pub mod model;
mod report;

pub use capture::{capture, write_archive, BrowserSession, CaptureSummary};
#[cfg(feature = "chromium")]
pub use chromium::ChromiumSession;
pub use config::{archive_stem, CaptureConfig};
pub use correlate::{Correlator, ExchangeObserver, ResourceTable};
pub use decode::{
    read_container, read_container_from, ContainerReadout, Content, ParsedRecord, ReadFormat, ReadOptions,
};
pub use encode::ContainerEncoder;
pub use error::{BrowserError, Error, Result};
pub use model::{RemoteEndpoint, RequestRecord, ResourceEntry, ResponseRecord};
