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

//! Serialization of resource entries into WARC request/response record pairs.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use fastwarc::{
    format_warc_date, HeaderEncoding, HeaderMap, WarcError, WarcRecord, WarcRecordType, WarcWriter,
};
use http::StatusCode;
use tracing::debug;
use url::Url;

use crate::model::{Headers, RequestRecord, ResourceEntry, ResponseRecord};

/// HTTP header carrying the browser's request ID on both halves of a pair.
pub const REQUEST_ID_HEADER: &str = "x-pagewarc-request-id";
/// WARC header carrying the remote port of a response.
pub const REMOTE_PORT_HEADER: &str = "X-Remote-Port";
/// WARC header carrying the browser's timing breakdown as JSON.
pub const TIMING_HEADER: &str = "X-Resource-Timing";

/// Writes a WARC archive one resource entry at a time.
///
/// The output stays open between calls; [`ContainerEncoder::close`] flushes it.
pub struct ContainerEncoder<W: Write> {
    writer: WarcWriter<W>,
    warcinfo_id: Option<String>,
}

impl ContainerEncoder<BufWriter<File>> {
    /// Create (or truncate) the archive file at `path`.
    pub fn create(path: &Path, compress: bool) -> Result<Self, WarcError> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file), compress))
    }
}

impl<W: Write> ContainerEncoder<W> {
    pub fn new(inner: W, compress: bool) -> Self {
        ContainerEncoder {
            writer: WarcWriter::new(inner, compress),
            warcinfo_id: None,
        }
    }

    /// Number of WARC records written so far.
    pub fn records_written(&self) -> usize {
        self.writer.records_written()
    }

    /// Write the `warcinfo` record. Call once, before any resource entry.
    ///
    /// # Arguments
    ///
    /// * `filename` - Archive file name recorded in `WARC-Filename`
    /// * `software` - Software name and version
    pub fn write_container_info(&mut self, filename: &str, software: &str) -> Result<(), WarcError> {
        let mut record = WarcRecord::new();
        record.init_headers(0, WarcRecordType::WarcInfo, None);
        record.headers_mut().append("WARC-Filename", filename);
        record.headers_mut().append("Content-Type", "application/warc-fields");
        let fields = format!(
            "software: {software}\r\ndatetime: {}\r\nformat: WARC File Format 1.1\r\n",
            format_warc_date(&Utc::now())
        );
        record.set_content(fields.into_bytes());

        self.writer.write_record(&record)?;
        self.warcinfo_id = record.record_id();
        Ok(())
    }

    /// Write the request and response records of `entry`.
    ///
    /// Entries without a response body are skipped and `Ok(false)` is returned.
    /// Response-only entries get a request record with no headers other than the
    /// request ID. Both records are serialized before either is written, so on
    /// error nothing reaches the output.
    pub fn write_resource_entry(&mut self, url: &str, entry: &ResourceEntry) -> Result<bool, WarcError> {
        let Some(response) = entry.response.as_ref() else {
            return Ok(false);
        };
        let Some(body) = response.body.as_deref() else {
            return Ok(false);
        };

        let request = self.request_record(url, &entry.id, entry.request.as_ref(), response)?;
        let response = self.response_record(url, &entry.id, response, body, request.record_id())?;
        self.writer.write_records(&[&request, &response])?;
        debug!(url, id = %entry.id, "wrote request/response pair");
        Ok(true)
    }

    /// Flush the archive and return the underlying writer.
    pub fn close(self) -> Result<W, WarcError> {
        self.writer.finish()
    }

    fn http_record(&self, record_type: WarcRecordType, url: &str, date: &DateTime<Utc>) -> WarcRecord {
        let mut record = WarcRecord::new();
        record.init_headers(0, record_type, None);
        record.set_date(date);
        record.headers_mut().append("WARC-Target-URI", url);
        if let Some(warcinfo_id) = &self.warcinfo_id {
            record.headers_mut().append("WARC-Warcinfo-ID", warcinfo_id);
        }
        record
    }

    fn request_record(
        &self,
        url: &str,
        id: &str,
        request: Option<&RequestRecord>,
        response: &ResponseRecord,
    ) -> Result<WarcRecord, WarcError> {
        let no_headers = Headers::new();
        let (method, headers, body, date) = match request {
            Some(r) => (r.method.as_str(), &r.headers, r.body.as_deref().unwrap_or_default(), r.timestamp),
            None => ("GET", &no_headers, &[][..], response.timestamp),
        };

        let mut http = HeaderMap::new(HeaderEncoding::Latin1);
        http.set_status_line(format!("{method} {} HTTP/1.1", request_target(url)));
        append_headers(&mut http, headers);
        http.append(REQUEST_ID_HEADER, id);

        let mut record = self.http_record(WarcRecordType::Request, url, &date);
        record.set_http_content(http, body)?;
        Ok(record)
    }

    fn response_record(
        &self,
        url: &str,
        id: &str,
        response: &ResponseRecord,
        body: &[u8],
        request_record_id: Option<String>,
    ) -> Result<WarcRecord, WarcError> {
        let mut http = HeaderMap::new(HeaderEncoding::Latin1);
        let status_line = format!("HTTP/1.1 {} {}", response.status, reason_phrase(response.status));
        http.set_status_line(status_line.trim_end());
        append_headers(&mut http, &response.headers);
        http.append(REQUEST_ID_HEADER, id);

        let mut record = self.http_record(WarcRecordType::Response, url, &response.timestamp);
        let headers = record.headers_mut();
        if let Some(request_record_id) = request_record_id {
            headers.append("WARC-Concurrent-To", request_record_id);
        }
        if let Some(remote) = &response.remote {
            if let Some(ip) = &remote.ip {
                headers.append("WARC-IP-Address", ip);
            }
            if let Some(port) = remote.port {
                headers.append(REMOTE_PORT_HEADER, port.to_string());
            }
        }
        if let Some(timing) = &response.timing {
            let timing = serde_json::to_string(timing).map_err(|_| WarcError::InvalidHeader {
                name: TIMING_HEADER.to_string(),
                reason: "timing is not serializable",
            })?;
            headers.append(TIMING_HEADER, timing);
        }

        record.set_http_content(http, body)?;
        Ok(record)
    }
}

/// Browsers join repeated headers (e.g. `set-cookie`) with `\n`; write them as repeated lines.
fn append_headers(target: &mut HeaderMap, headers: &Headers) {
    for (key, value) in headers {
        for line in value.split('\n') {
            target.append(key, line);
        }
    }
}

/// Origin-form request target (`/path?query`) for an absolute URL.
fn request_target(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) if parsed.has_host() => match parsed.query() {
            Some(query) => format!("{}?{query}", parsed.path()),
            None => parsed.path().to_string(),
        },
        _ => url.to_string(),
    }
}

fn reason_phrase(status: u16) -> &'static str {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|status| status.canonical_reason())
        .unwrap_or("")
}
