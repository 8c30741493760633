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

//! Reading and writing of WARC/1.1 archives.
//!
//! Records are framed as `version line`, `header block`, blank line, block,
//! `\r\n\r\n`. [`WarcWriter`] compresses every record into its own gzip member,
//! so archives can be read back member by member with [`ArchiveIterator`].

use std::fmt;
use std::io;

use chrono::{DateTime, SecondsFormat, Utc};
use encoding::all::WINDOWS_1252;
use encoding::{DecoderTrap, Encoding};
use sha1::{Digest, Sha1};
use uuid::Uuid;

mod error;
mod reader;
mod writer;

pub use error::WarcError;
pub use reader::{parse_header_block, ArchiveIterator, ArchiveIteratorConfig};
pub use writer::WarcWriter;

/// WARC version written by this library.
pub const WARC_VERSION: &str = "WARC/1.1";

/// WARC record type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarcRecordType {
    WarcInfo,
    Response,
    Resource,
    Request,
    Metadata,
    Revisit,
    Conversion,
    Continuation,
    Unknown,
}

impl WarcRecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarcRecordType::WarcInfo => "warcinfo",
            WarcRecordType::Response => "response",
            WarcRecordType::Resource => "resource",
            WarcRecordType::Request => "request",
            WarcRecordType::Metadata => "metadata",
            WarcRecordType::Revisit => "revisit",
            WarcRecordType::Conversion => "conversion",
            WarcRecordType::Continuation => "continuation",
            WarcRecordType::Unknown => "unknown",
        }
    }
}

impl TryFrom<&str> for WarcRecordType {
    type Error = &'static str;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "warcinfo" => Ok(WarcRecordType::WarcInfo),
            "response" => Ok(WarcRecordType::Response),
            "resource" => Ok(WarcRecordType::Resource),
            "request" => Ok(WarcRecordType::Request),
            "metadata" => Ok(WarcRecordType::Metadata),
            "revisit" => Ok(WarcRecordType::Revisit),
            "conversion" => Ok(WarcRecordType::Conversion),
            "continuation" => Ok(WarcRecordType::Continuation),
            "unknown" => Ok(WarcRecordType::Unknown),
            _ => Err("Invalid record type."),
        }
    }
}

impl From<WarcRecordType> for &'static str {
    fn from(value: WarcRecordType) -> Self {
        value.as_str()
    }
}

impl fmt::Display for WarcRecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum HeaderEncoding {
    Unicode,
    Latin1,
}

/// Dict-like type representing a WARC or HTTP header block.
#[derive(Debug, Clone)]
pub struct HeaderMap {
    encoding: HeaderEncoding,
    status_line: Vec<u8>,
    headers: Vec<(Vec<u8>, Vec<u8>)>,
}

impl HeaderMap {
    /// Create a new header map with the specified encoding.
    ///
    /// # Arguments
    ///
    /// * `encoding` - Header source encoding
    pub fn new(encoding: HeaderEncoding) -> Self {
        HeaderMap {
            encoding,
            status_line: Vec::new(),
            headers: Vec::new(),
        }
    }

    /// Get the header encoding.
    pub fn encoding(&self) -> HeaderEncoding {
        self.encoding
    }

    /// Get the header status line.
    pub fn status_line(&self) -> String {
        self.decode(&self.status_line)
    }

    /// Get the raw status line as bytes.
    pub fn status_line_bytes(&self) -> &[u8] {
        &self.status_line
    }

    /// Set status line contents.
    ///
    /// # Arguments
    ///
    /// * `status_line` - New status line
    pub fn set_status_line(&mut self, status_line: impl AsRef<[u8]>) {
        self.status_line = status_line.as_ref().to_vec();
    }

    /// HTTP status code (unset if header block is not an HTTP response header block).
    pub fn status_code(&self) -> Option<u16> {
        if !self.status_line.starts_with(b"HTTP/") {
            return None;
        }
        let mut parts = self.status_line.splitn(3, |&b| b == b' ');
        // Skip HTTP/
        parts.next()?;
        String::from_utf8_lossy(parts.next()?).parse::<u16>().ok()
    }

    fn decode(&self, byte_str: &[u8]) -> String {
        match &self.encoding {
            HeaderEncoding::Unicode => String::from_utf8_lossy(byte_str).to_string(),
            // Values that are valid UTF-8 are taken as such, anything else is windows-1252.
            HeaderEncoding::Latin1 => match std::str::from_utf8(byte_str) {
                Ok(text) => text.to_string(),
                Err(_) => WINDOWS_1252
                    .decode(byte_str, DecoderTrap::Replace)
                    .unwrap_or_else(|_| String::from_utf8_lossy(byte_str).to_string()),
            },
        }
    }

    /// HTTP reason phrase.
    /// Returns None if the header block is not an HTTP header block or no reason phrase was given.
    pub fn reason_phrase(&self) -> Option<String> {
        if !self.status_line.starts_with(b"HTTP/") {
            return None;
        }
        let mut parts = self.status_line.splitn(3, |&b| b == b' ');
        // Skip HTTP/ and status code
        parts.next()?;
        parts.next()?;
        Some(self.decode(parts.next()?))
    }

    /// Get value for (case-insensitive) header key a string.
    /// Duplicate headers are returned as a single value joined with `","`.
    ///
    /// # Arguments
    ///
    /// * `key` - Header key
    pub fn get(&self, key: &str) -> Option<String> {
        Some(self.decode(&self.get_bytes(key.as_bytes())?))
    }

    /// Get value for (case-insensitive) header key as bytes.
    /// Duplicate headers are returned as a single value joined with `","`.
    ///
    /// # Arguments
    ///
    /// * `key` - Header key
    pub fn get_bytes(&self, key: &[u8]) -> Option<Vec<u8>> {
        let values: Vec<&[u8]> = self
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_slice())
            .collect();
        if !values.is_empty() {
            Some(values.as_slice().join(b",".as_slice()))
        } else {
            None
        }
    }

    /// Check if a (case-insensitive) header key exists.
    ///
    /// # Arguments
    ///
    /// * `key` - Header key
    pub fn contains_key(&self, key: &str) -> bool {
        let key_bytes = key.as_bytes();
        self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(key_bytes))
    }

    /// Insert new header and overwrite existing header(s) if the key already exists.
    ///
    /// If a header already exists, its first occurrence will be updated and
    /// all following occurrences will be dropped.
    ///
    /// # Arguments
    ///
    /// * `key` - Header key
    /// * `value` - Header value
    pub fn set(&mut self, key: impl AsRef<str>, value: impl AsRef<str>) {
        self.set_bytes(key.as_ref().as_bytes(), value.as_ref().as_bytes());
    }

    fn set_bytes(&mut self, key: &[u8], value: &[u8]) {
        let mut found = false;
        self.headers.retain_mut(|h| {
            if !h.0.eq_ignore_ascii_case(key) {
                true
            } else if !found {
                *h = (key.trim_ascii().to_vec(), value.trim_ascii().to_vec());
                found = true;
                true
            } else {
                false
            }
        });
        if !found {
            self.headers.push((key.trim_ascii().to_vec(), value.trim_ascii().to_vec()));
        }
    }

    /// Append header.
    ///
    /// Appending a new header is efficient and does not check for
    /// existing headers with the same name.
    ///
    /// # Arguments
    ///
    /// * `key` - Header key
    /// * `value` - Header value
    pub fn append(&mut self, key: impl AsRef<str>, value: impl AsRef<str>) {
        self.append_bytes(key.as_ref().as_bytes(), value.as_ref().as_bytes());
    }

    /// Append header given as raw bytes.
    pub fn append_bytes(&mut self, key: &[u8], value: &[u8]) {
        self.headers.push((key.trim_ascii().to_vec(), value.trim_ascii().to_vec()));
    }

    /// Iterator of keys and values.
    ///
    /// Duplicate headers are yielded once per occurrence, in block order.
    pub fn items(&self) -> impl Iterator<Item = (String, String)> + use<'_> {
        self.headers
            .iter()
            .map(|(k, v)| (self.decode(k), self.decode(v)))
    }

    /// Get the number of headers.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Check if the header map is empty.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Clear all headers.
    pub fn clear(&mut self) {
        self.headers.clear();
        self.status_line.clear();
    }

    /// Check that the header block can be framed without ambiguity.
    ///
    /// Header names must be non-empty and free of `:`, and neither names,
    /// values nor the status line may contain line breaks.
    pub fn validate(&self) -> Result<(), WarcError> {
        if has_line_break(&self.status_line) {
            return Err(WarcError::invalid_header(self.status_line(), "line break in status line"));
        }
        for (key, value) in &self.headers {
            if key.is_empty() {
                return Err(WarcError::invalid_header("", "empty header name"));
            }
            if key.contains(&b':') {
                return Err(WarcError::invalid_header(self.decode(key), "colon in header name"));
            }
            if has_line_break(key) || has_line_break(value) {
                return Err(WarcError::invalid_header(self.decode(key), "line break in header"));
            }
        }
        Ok(())
    }

    /// Write header block into stream.
    ///
    /// The terminating blank line is not written.
    pub fn write<W: io::Write>(&self, writer: &mut W) -> io::Result<usize> {
        let mut bytes_written = 0usize;
        if !self.status_line.is_empty() {
            writer.write_all(&self.status_line)?;
            writer.write_all(b"\r\n")?;
            bytes_written += self.status_line.len() + 2;
        }
        for (key, value) in &self.headers {
            if !key.is_empty() {
                writer.write_all(key)?;
                writer.write_all(b": ")?;
                bytes_written += key.len() + 2;
            }
            writer.write_all(value)?;
            writer.write_all(b"\r\n")?;
            bytes_written += value.len() + 2;
        }
        Ok(bytes_written)
    }

    fn add_continuation(&mut self, value: &[u8]) {
        if let Some(last) = self.headers.last_mut() {
            last.1.push(b' ');
            last.1.extend_from_slice(value);
        } else {
            self.headers.push((Vec::new(), value.to_vec()));
        }
    }
}

fn has_line_break(bytes: &[u8]) -> bool {
    bytes.iter().any(|&b| b == b'\r' || b == b'\n')
}

/// A WARC record.
#[derive(Debug, Clone)]
pub struct WarcRecord {
    record_type: WarcRecordType,
    headers: HeaderMap,
    is_http: bool,
    http_parsed: bool,
    http_charset: Option<String>,
    http_headers: Option<HeaderMap>,
    content: Vec<u8>,
    stream_pos: u64,
}

impl Default for WarcRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl WarcRecord {
    /// Create a new empty WARC record.
    pub fn new() -> Self {
        WarcRecord {
            record_type: WarcRecordType::Unknown,
            headers: HeaderMap::new(HeaderEncoding::Unicode),
            is_http: false,
            http_parsed: false,
            http_charset: None,
            http_headers: None,
            content: Vec::new(),
            stream_pos: 0,
        }
    }

    /// Record type (same as `headers['WARC-Type']`).
    pub fn record_type(&self) -> WarcRecordType {
        self.record_type
    }

    /// Set record type.
    pub fn set_record_type(&mut self, record_type: WarcRecordType) {
        self.record_type = record_type;
        self.headers.set_bytes(b"WARC-Type", record_type.as_str().as_bytes());
    }

    /// Record ID (same as `headers['WARC-Record-ID']`).
    pub fn record_id(&self) -> Option<String> {
        self.headers.get("WARC-Record-ID")
    }

    /// WARC record headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// WARC record headers (mutable).
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Whether record is an HTTP record.
    pub fn is_http(&self) -> bool {
        self.is_http
    }

    /// Set whether this record is an HTTP record.
    /// Modifying this property will also affect the `Content-Type` of this record.
    pub fn set_is_http(&mut self, is_http: bool) {
        self.is_http = is_http;
        if self.is_http {
            self.headers.set_bytes(b"Content-Type", match self.record_type {
                WarcRecordType::Request => b"application/http; msgtype=request",
                WarcRecordType::Response => b"application/http; msgtype=response",
                _ => b"application/http",
            });
        }
    }

    /// Whether HTTP headers have been parsed.
    pub fn is_http_parsed(&self) -> bool {
        self.http_parsed
    }

    /// HTTP headers if record is an HTTP record and HTTP headers have been parsed yet.
    pub fn http_headers(&self) -> Option<&HeaderMap> {
        if self.http_parsed {
            self.http_headers.as_ref()
        } else {
            None
        }
    }

    /// Plain HTTP Content-Type without additional fields such as `charset=`.
    pub fn http_content_type(&self) -> Option<String> {
        self.http_headers()?
            .get("Content-Type")?
            .split(';')
            .next()
            .map(|s| s.trim().to_string())
    }

    /// HTTP charset/encoding as returned by the server or `None` if no valid charset is set.
    ///
    /// A returned string is guaranteed to be a valid encoding name.
    pub fn http_charset(&self) -> Option<&str> {
        self.http_charset.as_deref()
    }

    /// Length of the record content in bytes.
    ///
    /// Before HTTP parsing this is the full block, afterwards only the payload.
    pub fn content_length(&self) -> usize {
        self.content.len()
    }

    /// Get the record content as a byte slice.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Consume the record and return its content.
    pub fn into_content(self) -> Vec<u8> {
        self.content
    }

    /// WARC record start offset in the original (compressed) stream.
    pub fn stream_pos(&self) -> u64 {
        self.stream_pos
    }

    /// Initialize mandatory headers in a fresh WARC record instance.
    ///
    /// # Arguments
    ///
    /// * `content_length` - WARC record body length in bytes
    /// * `record_type` - WARC-Type
    /// * `record_urn` - WARC-Record-ID as URN without `'<'`, `'>'` (if unset, a random URN will be generated)
    pub fn init_headers(
        &mut self,
        content_length: usize,
        record_type: WarcRecordType,
        record_urn: Option<&str>,
    ) {
        let urn = match record_urn {
            Some(urn) => urn.to_string(),
            None => new_record_urn(),
        };

        self.record_type = record_type;
        self.is_http = false;
        self.http_parsed = false;
        self.http_headers = None;
        self.http_charset = None;

        self.headers.clear();
        self.headers.set_status_line(WARC_VERSION);
        self.headers.append_bytes(b"WARC-Type", self.record_type.as_str().as_bytes());
        self.headers.append("WARC-Date", format_warc_date(&Utc::now()));
        self.headers.append("WARC-Record-ID", format!("<{urn}>"));
        self.headers.append("Content-Length", content_length.to_string());
    }

    /// Set the `WARC-Date` header.
    pub fn set_date(&mut self, date: &DateTime<Utc>) {
        self.headers.set("WARC-Date", format_warc_date(date));
    }

    /// Set WARC body.
    ///
    /// Updates `Content-Length` and `WARC-Block-Digest`.
    ///
    /// # Arguments
    ///
    /// * `content` - Body as bytes
    pub fn set_content(&mut self, content: Vec<u8>) {
        self.headers.set("Content-Length", content.len().to_string());
        self.headers.set("WARC-Block-Digest", sha1_digest(&content));
        self.content = content;
    }

    /// Set an HTTP message as WARC body.
    ///
    /// The block is framed as the HTTP header block, a blank line and `payload`.
    /// Sets `Content-Type` according to the record type and adds a `WARC-Payload-Digest`.
    ///
    /// # Arguments
    ///
    /// * `http_headers` - HTTP header block including the request or status line
    /// * `payload` - HTTP body
    pub fn set_http_content(&mut self, http_headers: HeaderMap, payload: &[u8]) -> Result<(), WarcError> {
        http_headers.validate()?;
        let mut block = Vec::with_capacity(payload.len() + 64 * (http_headers.len() + 1));
        http_headers.write(&mut block)?;
        block.extend_from_slice(b"\r\n");
        block.extend_from_slice(payload);

        self.set_is_http(true);
        self.set_content(block);
        self.headers.set("WARC-Payload-Digest", sha1_digest(payload));
        self.http_headers = Some(http_headers);
        self.http_parsed = false;
        Ok(())
    }

    /// Check the `WARC-Block-Digest` header against the record block.
    ///
    /// Returns `None` if there is no (supported) digest or the block has already been
    /// split by [`WarcRecord::parse_http`].
    pub fn verify_block_digest(&self) -> Option<bool> {
        if self.http_parsed {
            return None;
        }
        let expected = self.headers.get("WARC-Block-Digest")?;
        let (algorithm, _) = expected.split_once(':')?;
        if !algorithm.eq_ignore_ascii_case("sha1") {
            return None;
        }
        Some(sha1_digest(&self.content).eq_ignore_ascii_case(expected.trim()))
    }

    /// Parse HTTP headers and strip them from the record content.
    ///
    /// It is safe to call this method multiple times, even if the record is not an HTTP record.
    /// Bare `LF` line endings are accepted.
    pub fn parse_http(&mut self) -> Result<(), WarcError> {
        if self.http_parsed || !self.is_http {
            return Ok(());
        }

        let mut http_headers = HeaderMap::new(HeaderEncoding::Latin1);
        let mut cursor = self.content.as_slice();
        let consumed = parse_header_block(&mut cursor, &mut http_headers, true)?;
        if http_headers.status_line_bytes().is_empty() {
            return Err(WarcError::corrupt(self.stream_pos, "missing HTTP status line", None));
        }

        self.content.drain(..consumed);
        self.http_charset = http_headers
            .get("Content-Type")
            .as_deref()
            .and_then(charset_from_content_type);
        self.http_headers = Some(http_headers);
        self.http_parsed = true;
        Ok(())
    }

    /// Write WARC record onto a stream.
    ///
    /// Parsed HTTP headers are written back in front of the payload.
    ///
    /// # Returns
    ///
    /// Number of bytes written
    pub fn write<W: io::Write>(&self, writer: &mut W) -> Result<usize, WarcError> {
        self.headers.validate()?;
        let mut bytes_written = self.headers.write(writer)?;
        writer.write_all(b"\r\n")?;
        bytes_written += 2;

        if let Some(http_headers) = self.http_headers() {
            bytes_written += http_headers.write(writer)?;
            writer.write_all(b"\r\n")?;
            bytes_written += 2;
        }

        writer.write_all(&self.content)?;
        bytes_written += self.content.len();

        writer.write_all(b"\r\n\r\n")?;
        bytes_written += 4;

        Ok(bytes_written)
    }
}

fn charset_from_content_type(content_type: &str) -> Option<String> {
    let charset = content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("charset"))?
        .1
        .trim()
        .trim_matches('"');
    let encoding = encoding::label::encoding_from_whatwg_label(charset)?;
    Some(encoding.whatwg_name().unwrap_or(encoding.name()).to_string())
}

/// Generate a fresh `urn:uuid:` record URN.
pub fn new_record_urn() -> String {
    format!("urn:uuid:{}", Uuid::new_v4())
}

/// Format a timestamp the way `WARC-Date` expects it (UTC, millisecond precision).
pub fn format_warc_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// SHA-1 digest in the `sha1:<BASE32>` notation used by WARC digest headers.
pub fn sha1_digest(data: &[u8]) -> String {
    format!("sha1:{}", base32_encode(&Sha1::digest(data)))
}

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

fn base32_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(5) * 8);
    for chunk in bytes.chunks(5) {
        let mut buf = [0u8; 5];
        buf[..chunk.len()].copy_from_slice(chunk);
        let bits = buf.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
        let symbols = (chunk.len() * 8).div_ceil(5);
        for i in 0..8 {
            if i < symbols {
                let index = ((bits >> (35 - i * 5)) & 0x1f) as usize;
                out.push(BASE32_ALPHABET[index] as char);
            } else {
                out.push('=');
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn header_lookup_is_case_insensitive_and_joins_duplicates() {
        let mut headers = HeaderMap::new(HeaderEncoding::Unicode);
        headers.append("Set-Cookie", "a=1");
        headers.append("set-cookie", "b=2");
        headers.append("Content-Type", "text/html");

        assert_eq!(headers.get("SET-COOKIE").as_deref(), Some("a=1,b=2"));
        assert!(headers.contains_key("content-type"));
        assert_eq!(headers.len(), 3);
    }

    #[test]
    fn set_replaces_first_occurrence_and_drops_the_rest() {
        let mut headers = HeaderMap::new(HeaderEncoding::Unicode);
        headers.append("X-A", "1");
        headers.append("X-B", "2");
        headers.append("x-a", "3");
        headers.set("X-A", "4");

        let items: Vec<_> = headers.items().collect();
        assert_eq!(
            items,
            vec![("X-A".to_string(), "4".to_string()), ("X-B".to_string(), "2".to_string())]
        );
    }

    #[test]
    fn status_line_accessors() {
        let mut headers = HeaderMap::new(HeaderEncoding::Latin1);
        headers.set_status_line("HTTP/1.1 404 Not Found");
        assert_eq!(headers.status_code(), Some(404));
        assert_eq!(headers.reason_phrase().as_deref(), Some("Not Found"));

        headers.set_status_line("GET /index.html HTTP/1.1");
        assert_eq!(headers.status_code(), None);
    }

    #[test]
    fn validate_rejects_unframeable_headers() {
        let mut headers = HeaderMap::new(HeaderEncoding::Unicode);
        headers.append("X-Ok", "fine");
        assert!(headers.validate().is_ok());

        headers.append("X-Bad", "one\r\ntwo");
        assert!(matches!(headers.validate(), Err(WarcError::InvalidHeader { .. })));

        let mut headers = HeaderMap::new(HeaderEncoding::Unicode);
        headers.append(":authority", "example.com");
        assert!(headers.validate().is_err());
    }

    #[test]
    fn latin1_headers_are_decoded() {
        let mut headers = HeaderMap::new(HeaderEncoding::Latin1);
        headers.append_bytes(b"X-Name", b"caf\xe9");
        assert_eq!(headers.get("x-name").as_deref(), Some("café"));
        assert_eq!(headers.encoding(), HeaderEncoding::Latin1);
    }

    #[test]
    fn utf8_header_values_survive_a_latin1_map() {
        let mut headers = HeaderMap::new(HeaderEncoding::Latin1);
        headers.append("X-Name", "café ✓");
        headers.append_bytes(b"X-Legacy", b"na\xefve");

        let mut block = Vec::new();
        headers.write(&mut block).unwrap();
        let mut parsed = HeaderMap::new(HeaderEncoding::Latin1);
        parse_header_block(&mut block.as_slice(), &mut parsed, false).unwrap();
        assert_eq!(parsed.get("X-Name").as_deref(), Some("café ✓"));
        assert_eq!(parsed.get("X-Legacy").as_deref(), Some("naïve"));
    }

    #[test]
    fn base32_matches_rfc4648_vectors() {
        assert_eq!(base32_encode(b""), "");
        assert_eq!(base32_encode(b"f"), "MY======");
        assert_eq!(base32_encode(b"fo"), "MZXQ====");
        assert_eq!(base32_encode(b"foobar"), "MZXW6YTBOI======");
    }

    #[test]
    fn sha1_digest_of_empty_block() {
        assert_eq!(sha1_digest(b""), "sha1:3I42H3S6NNFQ2MSVX7XZKYAYSCX5QBYJ");
    }

    #[test]
    fn http_record_round_trips_through_parse_http() {
        let mut http = HeaderMap::new(HeaderEncoding::Latin1);
        http.set_status_line("HTTP/1.1 200 OK");
        http.append("Content-Type", "text/html; charset=ISO-8859-1");

        let mut record = WarcRecord::new();
        record.init_headers(0, WarcRecordType::Response, None);
        record.set_http_content(http, b"<p>hi</p>").unwrap();
        assert_eq!(record.verify_block_digest(), Some(true));
        assert_eq!(
            record.headers().get("Content-Type").as_deref(),
            Some("application/http; msgtype=response")
        );
        assert!(record.http_headers().is_none());
        assert!(!record.is_http_parsed());

        record.parse_http().unwrap();
        assert!(record.is_http_parsed());
        assert_eq!(record.content(), b"<p>hi</p>");
        assert_eq!(record.http_content_type().as_deref(), Some("text/html"));
        assert_eq!(record.http_charset(), Some("windows-1252"));
        assert_eq!(record.http_headers().and_then(HeaderMap::status_code), Some(200));
    }

    #[test]
    fn set_record_type_updates_the_header() {
        let mut record = WarcRecord::new();
        record.init_headers(0, WarcRecordType::Resource, None);
        record.set_record_type(WarcRecordType::Metadata);
        assert_eq!(record.record_type(), WarcRecordType::Metadata);
        assert_eq!(record.headers().get("WARC-Type").as_deref(), Some("metadata"));
        assert_eq!(record.headers().items().filter(|(k, _)| k == "WARC-Type").count(), 1);
    }

    #[test]
    fn write_frames_record() {
        let mut record = WarcRecord::new();
        record.init_headers(0, WarcRecordType::Resource, Some("urn:uuid:test"));
        record.set_content(b"abc".to_vec());

        let mut out = Vec::new();
        let written = record.write(&mut out).unwrap();
        assert_eq!(written, out.len());
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("WARC/1.1\r\nWARC-Type: resource\r\n"));
        assert!(text.contains("WARC-Record-ID: <urn:uuid:test>\r\n"));
        assert!(text.contains("Content-Length: 3\r\n"));
        assert!(text.ends_with("\r\n\r\nabc\r\n\r\n"));
    }
}
