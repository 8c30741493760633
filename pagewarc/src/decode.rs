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

//! Reading WARC archives back into structured records.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use fastwarc::{ArchiveIterator, ArchiveIteratorConfig, HeaderMap, WarcError, WarcRecord};
use flate2::read::{GzDecoder, ZlibDecoder};
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use tracing::warn;

use crate::error::{Error, Result};
use crate::report;

/// Media types whose payload is decoded as UTF-8 text.
///
/// A content type counts as text if it *contains* one of these entries, so
/// `text/html; charset=utf-8` matches `text/html`. This is a substring
/// heuristic, not an exact MIME comparison.
pub const TEXT_MEDIA_TYPES: &[&str] = &[
    "application/javascript",
    "application/ecmascript",
    "application/json",
    "application/json-patch+json",
    "application/json-seq",
    "application/ld+json",
    "text/html",
    "application/xhtml+xml",
    "application/xml",
    "text/xml",
    "text/css",
    "text/plain",
    "text/csv",
    "text/tab-separated-values",
    "text/markdown",
    "text/yaml",
    "application/x-yaml",
    "application/x-httpd-php",
    "application/x-perl",
    "application/x-python-code",
    "application/x-shellscript",
    "text/event-stream",
    "application/x-ndjson",
];

/// Whether `content_type` is treated as text.
pub fn is_text_media_type(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    TEXT_MEDIA_TYPES.iter().any(|t| content_type.contains(t))
}

/// Header fields in block order, with duplicate keys folded into one `,`-joined value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderFields(Vec<(String, String)>);

impl HeaderFields {
    fn from_header_map(headers: &HeaderMap) -> Self {
        let mut fields: Vec<(String, String)> = Vec::with_capacity(headers.len());
        for (key, value) in headers.items() {
            match fields.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&key)) {
                Some((_, existing)) => {
                    existing.push(',');
                    existing.push_str(&value);
                }
                None => fields.push((key, value)),
            }
        }
        HeaderFields(fields)
    }

    /// Case-insensitive lookup.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for HeaderFields {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Record payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Binary(Vec<u8>),
}

impl Default for Content {
    fn default() -> Self {
        Content::Text(String::new())
    }
}

/// One decoded WARC record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRecord {
    pub warc_headers: HeaderFields,
    pub http_headers: Option<HeaderFields>,
    pub content_type: String,
    pub content_size: usize,
    pub content: Content,
    pub content_error: Option<String>,
}

impl ParsedRecord {
    fn from_record(record: WarcRecord) -> Self {
        let mut parsed = Self::headers_only(&record);
        let payload = decode_content_encoding(parsed.http_headers.as_ref(), record.into_content());
        parsed.content_size = payload.len();
        parsed.content = if is_text_media_type(&parsed.content_type) {
            Content::Text(String::from_utf8_lossy(&payload).into_owned())
        } else {
            Content::Binary(payload)
        };
        parsed
    }

    fn headers_only(record: &WarcRecord) -> Self {
        let warc_headers = HeaderFields::from_header_map(record.headers());
        let http_headers = record.http_headers().map(HeaderFields::from_header_map);
        let content_type = http_headers
            .as_ref()
            .and_then(|h| h.get("Content-Type"))
            .filter(|ct| !ct.is_empty())
            .or_else(|| warc_headers.get("Content-Type"))
            .unwrap_or_default()
            .to_string();
        ParsedRecord {
            warc_headers,
            http_headers,
            content_type,
            ..Default::default()
        }
    }

    fn failed(partial: Option<&WarcRecord>, error: impl Into<String>) -> Self {
        let mut parsed = partial.map(Self::headers_only).unwrap_or_default();
        parsed.content_error = Some(error.into());
        parsed
    }

    /// Whether the payload was decoded as text.
    pub fn is_text(&self) -> bool {
        matches!(self.content, Content::Text(_))
    }
}

impl Serialize for ParsedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ParsedRecord", 7)?;
        state.serialize_field("warcHeaders", &self.warc_headers)?;
        if let Some(http_headers) = &self.http_headers {
            state.serialize_field("httpHeaders", http_headers)?;
        } else {
            state.skip_field("httpHeaders")?;
        }
        state.serialize_field("contentType", &self.content_type)?;
        state.serialize_field("contentSize", &self.content_size)?;
        match &self.content {
            Content::Text(text) => {
                state.serialize_field("content", text)?;
                state.skip_field("contentEncoding")?;
            }
            Content::Binary(bytes) => {
                state.serialize_field("content", &BASE64.encode(bytes))?;
                state.serialize_field("contentEncoding", "base64")?;
            }
        }
        if let Some(error) = &self.content_error {
            state.serialize_field("contentError", error)?;
        } else {
            state.skip_field("contentError")?;
        }
        state.end()
    }
}

/// All records of an archive, labelled `Record #1`, `Record #2`, ... in stream order.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerReadout {
    pub record_count: usize,
    #[serde(serialize_with = "serialize_labelled")]
    pub records: Vec<(String, ParsedRecord)>,
}

#[allow(clippy::ptr_arg)]
fn serialize_labelled<S: Serializer>(
    records: &Vec<(String, ParsedRecord)>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_map(records.iter().map(|(label, record)| (label, record)))
}

impl ContainerReadout {
    fn push(&mut self, record: ParsedRecord) {
        self.record_count += 1;
        self.records.push((format!("Record #{}", self.record_count), record));
    }

    pub fn get(&self, label: &str) -> Option<&ParsedRecord> {
        self.records.iter().find(|(l, _)| l == label).map(|(_, r)| r)
    }

    /// Records in stream order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParsedRecord)> {
        self.records.iter().map(|(label, record)| (label.as_str(), record))
    }

    /// Pretty-printed JSON document.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Plain-text report.
    pub fn to_text_report(&self) -> String {
        report::text_report(self)
    }

    /// Render in the requested output format.
    pub fn render(&self, format: ReadFormat) -> Result<String> {
        match format {
            ReadFormat::Json => self.to_json(),
            ReadFormat::Text => Ok(self.to_text_report()),
        }
    }
}

/// Output format of the read command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadFormat {
    #[default]
    Json,
    Text,
}

impl FromStr for ReadFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(ReadFormat::Json),
            "text" => Ok(ReadFormat::Text),
            other => Err(Error::InvalidFormat(other.to_string())),
        }
    }
}

/// Reader options.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Treat records with a mismatching `WARC-Block-Digest` as corrupt.
    pub verify_digests: bool,
}

/// Read the archive at `path`.
///
/// Fails only if the file cannot be opened. Problems with individual records are
/// reported in their `content_error` field.
pub fn read_container(path: &Path, options: &ReadOptions) -> Result<ContainerReadout> {
    let file = File::open(path)?;
    Ok(read_container_from(BufReader::new(file), options))
}

/// Read an archive from any buffered reader. See [`read_container`].
pub fn read_container_from<R: BufRead>(reader: R, options: &ReadOptions) -> ContainerReadout {
    let config = ArchiveIteratorConfig {
        parse_http: true,
        verify_digests: options.verify_digests,
    };
    let mut readout = ContainerReadout::default();
    for item in ArchiveIterator::new(reader, config) {
        let parsed = match item {
            Ok(record) => ParsedRecord::from_record(record),
            Err(WarcError::CorruptRecord { offset, reason, partial }) => {
                warn!(offset, %reason, "unreadable record");
                ParsedRecord::failed(partial.as_deref(), reason)
            }
            Err(err) => {
                warn!(error = %err, "archive read aborted");
                ParsedRecord::failed(None, err.to_string())
            }
        };
        readout.push(parsed);
    }
    readout
}

/// Undo `Content-Encoding: gzip|deflate` if the payload really is compressed.
fn decode_content_encoding(http_headers: Option<&HeaderFields>, payload: Vec<u8>) -> Vec<u8> {
    let Some(encoding) = http_headers.and_then(|h| h.get("Content-Encoding")) else {
        return payload;
    };
    let mut decoded = Vec::new();
    let inflated = match encoding.trim().to_ascii_lowercase().as_str() {
        "gzip" | "x-gzip" if payload.starts_with(&[0x1f, 0x8b]) => {
            GzDecoder::new(payload.as_slice()).read_to_end(&mut decoded)
        }
        "deflate" => ZlibDecoder::new(payload.as_slice()).read_to_end(&mut decoded),
        _ => return payload,
    };
    match inflated {
        Ok(_) => decoded,
        Err(_) => payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn text_classification_is_a_substring_match() {
        assert!(is_text_media_type("text/html; charset=utf-8"));
        assert!(is_text_media_type("Application/JSON"));
        assert!(is_text_media_type("application/vnd.api+json; profile=application/json"));
        assert!(!is_text_media_type("image/png"));
        assert!(!is_text_media_type("application/octet-stream"));
        assert!(!is_text_media_type(""));
    }

    #[test]
    fn read_format_parses_known_names_only() {
        assert_eq!("json".parse::<ReadFormat>().unwrap(), ReadFormat::Json);
        assert_eq!("text".parse::<ReadFormat>().unwrap(), ReadFormat::Text);
        assert!(matches!("xml".parse::<ReadFormat>(), Err(Error::InvalidFormat(f)) if f == "xml"));
    }

    #[test]
    fn binary_content_is_base64_in_json() {
        let record = ParsedRecord {
            content_type: "application/octet-stream".to_string(),
            content_size: 4,
            content: Content::Binary(vec![0, 1, 2, 3]),
            ..Default::default()
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["content"], "AAECAw==");
        assert_eq!(value["contentEncoding"], "base64");
        assert!(value.get("httpHeaders").is_none());
        assert!(value.get("contentError").is_none());
    }

    #[test]
    fn json_keeps_stream_order() {
        let mut readout = ContainerReadout::default();
        for _ in 0..11 {
            readout.push(ParsedRecord::default());
        }
        let json = readout.to_json().unwrap();
        let first = json.find("\"Record #1\"").unwrap();
        let second = json.find("\"Record #2\"").unwrap();
        let tenth = json.find("\"Record #10\"").unwrap();
        assert!(first < second && second < tenth);
        assert!(json.contains("\"recordCount\": 11"));
    }

    #[test]
    fn duplicate_headers_are_folded() {
        let mut headers = HeaderMap::new(fastwarc::HeaderEncoding::Unicode);
        headers.append("Link", "<a>");
        headers.append("Accept", "*/*");
        headers.append("link", "<b>");
        let fields = HeaderFields::from_header_map(&headers);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get("LINK"), Some("<a>,<b>"));
    }

    #[test]
    fn gzip_content_encoding_is_undone_when_payload_is_compressed() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"hello").unwrap();
        let compressed = encoder.finish().unwrap();

        let mut map = HeaderMap::new(fastwarc::HeaderEncoding::Latin1);
        map.append("Content-Encoding", "gzip");
        let headers = HeaderFields::from_header_map(&map);

        assert_eq!(decode_content_encoding(Some(&headers), compressed), b"hello");
        // Browsers hand out already-decoded bodies while keeping the header.
        assert_eq!(decode_content_encoding(Some(&headers), b"hello".to_vec()), b"hello");
    }

    #[test]
    fn unreadable_input_becomes_a_single_error_record() {
        let readout = read_container_from(&b"this is not a warc file"[..], &ReadOptions::default());
        assert_eq!(readout.record_count, 1);
        let (label, record) = readout.iter().next().unwrap();
        assert_eq!(label, "Record #1");
        assert!(record.content_error.is_some());
        assert!(record.warc_headers.is_empty());
    }
}
