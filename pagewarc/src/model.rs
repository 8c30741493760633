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

//! Captured request, response and resource entry types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// Identifier of the synthetic rendered-page entry.
pub const RENDERED_PAGE_ID: &str = "rendered-html";

/// Header mapping as captured from the browser. Keys keep their original case.
pub type Headers = BTreeMap<String, String>;

/// Opaque timing breakdown, passed through to the archive unmodified.
pub type Timing = BTreeMap<String, serde_json::Value>;

/// A request as it left the browser.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestRecord {
    pub id: String,
    pub method: String,
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
    pub timestamp: DateTime<Utc>,
}

/// Remote endpoint a response was received from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEndpoint {
    pub ip: Option<String>,
    pub port: Option<u16>,
}

/// A response as received by the browser.
///
/// `body` is `None` when the browser could not hand out the response body
/// (redirects, aborted or streamed responses).
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseRecord {
    pub id: String,
    pub status: u16,
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
    pub remote: Option<RemoteEndpoint>,
    pub timing: Option<Timing>,
    pub timestamp: DateTime<Utc>,
}

/// Request and response of one network exchange.
///
/// Either side may be missing: a request whose response never arrived, or a
/// response whose request event was never observed under the same URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceEntry {
    pub id: String,
    pub request: Option<RequestRecord>,
    pub response: Option<ResponseRecord>,
}

impl ResourceEntry {
    pub fn new(id: impl Into<String>) -> Self {
        ResourceEntry {
            id: id.into(),
            request: None,
            response: None,
        }
    }

    /// Whether the entry has a response body and thus belongs in an archive.
    pub fn is_archivable(&self) -> bool {
        self.response.as_ref().is_some_and(|r| r.body.is_some())
    }

    /// Synthetic entry holding the fully rendered page markup.
    ///
    /// Request headers are taken from the main document request when it was observed.
    pub fn rendered_page(html: impl Into<String>, main_request: Option<&RequestRecord>) -> Self {
        let now = Utc::now();
        let request = RequestRecord {
            id: RENDERED_PAGE_ID.to_string(),
            method: "GET".to_string(),
            headers: main_request.map(|r| r.headers.clone()).unwrap_or_default(),
            body: None,
            timestamp: main_request.map_or(now, |r| r.timestamp),
        };
        let response = ResponseRecord {
            id: RENDERED_PAGE_ID.to_string(),
            status: 200,
            headers: Headers::from([("content-type".to_string(), "text/html".to_string())]),
            body: Some(html.into().into_bytes()),
            remote: None,
            timing: None,
            timestamp: now,
        };
        ResourceEntry {
            id: RENDERED_PAGE_ID.to_string(),
            request: Some(request),
            response: Some(response),
        }
    }
}

/// URL of the rendered-page record for a capture target.
pub fn rendered_page_url(target: &str) -> String {
    format!("{target}#{RENDERED_PAGE_ID}")
}
