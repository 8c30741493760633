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

use std::io::{self, BufRead, Read};

use flate2::bufread::GzDecoder;

use crate::{HeaderMap, WarcError, WarcRecord, WarcRecordType};

const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];
const WARC_MAGIC: &[u8] = b"WARC/";
const RECORD_MARKERS: [&[u8]; 2] = [&GZIP_MAGIC, WARC_MAGIC];

/// Parse a header block from a buffered reader.
///
/// Helper function for parsing WARC or HTTP header blocks. Reading stops after the
/// first empty line or at the end of the input. Both `CRLF` and plain `LF` line
/// endings are accepted.
///
/// # Arguments
///
/// * `reader` - Input reader
/// * `target` - Header map to fill
/// * `has_status_line` - Whether first line is a status line or already a header
///
/// # Returns
///
/// Number of bytes read from `reader`
pub fn parse_header_block<R: BufRead>(
    reader: &mut R,
    target: &mut HeaderMap,
    has_status_line: bool,
) -> io::Result<usize> {
    let mut bytes_consumed = 0;
    let mut line = Vec::new();
    let mut first_line = has_status_line;

    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line)?;
        if n == 0 {
            break;
        }
        bytes_consumed += n;

        let trimmed = trim_line_end(&line);
        if trimmed.is_empty() {
            break;
        }

        if first_line {
            target.set_status_line(trimmed);
            first_line = false;
            continue;
        }

        // Continuation line
        if trimmed[0] == b' ' || trimmed[0] == b'\t' {
            target.add_continuation(trimmed.trim_ascii());
            continue;
        }

        match trimmed.iter().position(|&b| b == b':') {
            Some(colon) => target.append_bytes(&trimmed[..colon], &trimmed[colon + 1..]),
            // Invalid header, try to preserve it
            None => target.add_continuation(trimmed),
        }
    }

    Ok(bytes_consumed)
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    &line[..end]
}

/// Read one plain (uncompressed) record.
///
/// Returns `Ok(None)` at the end of the input.
fn read_record<R: BufRead>(reader: &mut R, offset: u64) -> Result<Option<WarcRecord>, WarcError> {
    let mut version = Vec::new();
    if reader.read_until(b'\n', &mut version)? == 0 {
        return Ok(None);
    }
    let version = trim_line_end(&version);
    if !version.starts_with(WARC_MAGIC) {
        return Err(WarcError::corrupt(offset, "missing WARC version line", None));
    }

    let mut record = WarcRecord::new();
    record.stream_pos = offset;
    record.headers.set_status_line(version);
    parse_header_block(reader, &mut record.headers, false)?;

    record.record_type = record
        .headers
        .get("WARC-Type")
        .and_then(|t| WarcRecordType::try_from(t.as_str()).ok())
        .unwrap_or(WarcRecordType::Unknown);
    record.is_http = record
        .headers
        .get("Content-Type")
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("application/http"));

    let Some(length) = record
        .headers
        .get("Content-Length")
        .and_then(|l| l.trim().parse::<u64>().ok())
    else {
        return Err(WarcError::corrupt(offset, "missing or invalid Content-Length", Some(record)));
    };

    let mut content = Vec::with_capacity(length.min(1 << 20) as usize);
    reader.by_ref().take(length).read_to_end(&mut content)?;
    if (content.len() as u64) < length {
        let reason = format!("truncated block: expected {length} bytes, got {}", content.len());
        return Err(WarcError::corrupt(offset, reason, Some(record)));
    }
    record.content = content;
    Ok(Some(record))
}

/// Buffered reader that counts consumed bytes and supports pushing bytes back.
struct StreamReader<R> {
    inner: R,
    pushback: Vec<u8>,
    pos: u64,
}

impl<R: BufRead> StreamReader<R> {
    fn new(inner: R) -> Self {
        StreamReader {
            inner,
            pushback: Vec::new(),
            pos: 0,
        }
    }

    fn unread(&mut self, bytes: &[u8]) {
        self.pushback.splice(0..0, bytes.iter().copied());
        self.pos -= bytes.len() as u64;
    }

    fn peek(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let mut head = Vec::with_capacity(n);
        self.by_ref().take(n as u64).read_to_end(&mut head)?;
        self.unread(&head);
        Ok(head)
    }

    /// Skip CR, LF and other ASCII whitespace. Returns `false` at the end of the input.
    fn skip_whitespace(&mut self) -> io::Result<bool> {
        loop {
            let buf = self.fill_buf()?;
            if buf.is_empty() {
                return Ok(false);
            }
            let skip = buf.iter().take_while(|b| b.is_ascii_whitespace()).count();
            let exhausted = skip == buf.len();
            self.consume(skip);
            if !exhausted {
                return Ok(true);
            }
        }
    }

    /// Advance to the next occurrence of any of `markers` and leave it unconsumed.
    /// A marker may begin at the current position. Returns `false` if the input ended first.
    fn resync(&mut self, markers: &[&[u8]]) -> io::Result<bool> {
        let mut matched = vec![0usize; markers.len()];
        loop {
            let byte = match self.fill_buf()?.first() {
                Some(&b) => b,
                None => return Ok(false),
            };
            self.consume(1);
            for (marker, matched) in markers.iter().zip(matched.iter_mut()) {
                if byte == marker[*matched] {
                    *matched += 1;
                    if *matched == marker.len() {
                        self.unread(marker);
                        return Ok(true);
                    }
                } else {
                    *matched = usize::from(byte == marker[0]);
                }
            }
        }
    }
}

impl<R: BufRead> Read for StreamReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl<R: BufRead> BufRead for StreamReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.pushback.is_empty() {
            self.inner.fill_buf()
        } else {
            Ok(&self.pushback)
        }
    }

    fn consume(&mut self, amt: usize) {
        if self.pushback.is_empty() {
            self.inner.consume(amt);
        } else {
            let amt = amt.min(self.pushback.len());
            self.pushback.drain(..amt);
        }
        self.pos += amt as u64;
    }
}

/// Archive iterator configuration.
#[derive(Debug, Clone)]
pub struct ArchiveIteratorConfig {
    /// Whether to parse HTTP records automatically
    pub parse_http: bool,
    /// Report records whose block digest does not match as corrupt
    pub verify_digests: bool,
}

impl Default for ArchiveIteratorConfig {
    fn default() -> Self {
        ArchiveIteratorConfig {
            parse_http: true,
            verify_digests: false,
        }
    }
}

/// WARC record stream iterator.
///
/// Reads gzip-member-per-record archives as well as uncompressed archives (or a
/// mixture of both). Only one record is held in memory at a time.
///
/// A record that cannot be read yields a [`WarcError::CorruptRecord`] and the
/// iterator skips ahead to the next record boundary. An I/O error on the
/// underlying stream is yielded once and ends the iteration.
pub struct ArchiveIterator<R: BufRead> {
    reader: StreamReader<R>,
    config: ArchiveIteratorConfig,
    done: bool,
}

impl<R: BufRead> ArchiveIterator<R> {
    /// Create a new archive iterator.
    ///
    /// # Arguments
    ///
    /// * `reader` - Input stream
    /// * `config` - Iterator configuration
    pub fn new(reader: R, config: ArchiveIteratorConfig) -> Self {
        ArchiveIterator {
            reader: StreamReader::new(reader),
            config,
            done: false,
        }
    }

    /// Number of bytes consumed from the input stream so far.
    pub fn stream_pos(&self) -> u64 {
        self.reader.pos
    }

    /// Read the next WARC record from the stream.
    ///
    /// # Returns
    ///
    /// `Ok(Some(record))` if a record was read, `Ok(None)` if EOF, or an error
    pub fn read_next(&mut self) -> Result<Option<WarcRecord>, WarcError> {
        if !self.reader.skip_whitespace()? {
            return Ok(None);
        }
        let offset = self.reader.pos;
        let head = self.reader.peek(WARC_MAGIC.len())?;
        let record = if head.starts_with(&GZIP_MAGIC) {
            self.read_member(offset)?
        } else if head.starts_with(WARC_MAGIC) {
            self.read_plain(offset)?
        } else {
            self.reader.resync(&RECORD_MARKERS)?;
            return Err(WarcError::corrupt(offset, "no record at this position", None));
        };
        self.finish_record(record).map(Some)
    }

    fn read_member(&mut self, offset: u64) -> Result<WarcRecord, WarcError> {
        let mut block = Vec::new();
        let inflated = GzDecoder::new(&mut self.reader).read_to_end(&mut block);

        if let Err(err) = inflated {
            self.reader.resync(&RECORD_MARKERS)?;
            let partial = match read_record(&mut block.as_slice(), offset) {
                Ok(record) => record.map(Box::new),
                Err(WarcError::CorruptRecord { partial, .. }) => partial,
                Err(_) => None,
            };
            return Err(WarcError::CorruptRecord {
                offset,
                reason: format!("unreadable gzip member: {err}"),
                partial,
            });
        }

        match read_record(&mut block.as_slice(), offset)? {
            Some(record) => Ok(record),
            None => Err(WarcError::corrupt(offset, "empty gzip member", None)),
        }
    }

    fn read_plain(&mut self, offset: u64) -> Result<WarcRecord, WarcError> {
        match read_record(&mut self.reader, offset) {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(WarcError::corrupt(offset, "unexpected end of stream", None)),
            Err(err @ WarcError::CorruptRecord { .. }) => {
                self.reader.resync(&RECORD_MARKERS)?;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    fn finish_record(&self, mut record: WarcRecord) -> Result<WarcRecord, WarcError> {
        let offset = record.stream_pos;
        if self.config.verify_digests && record.verify_block_digest() == Some(false) {
            return Err(WarcError::corrupt(offset, "block digest mismatch", Some(record)));
        }
        if self.config.parse_http {
            if let Err(err) = record.parse_http() {
                return Err(WarcError::corrupt(offset, err.to_string(), Some(record)));
            }
        }
        Ok(record)
    }
}

impl<R: BufRead> Iterator for ArchiveIterator<R> {
    type Item = Result<WarcRecord, WarcError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = err.is_fatal();
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HeaderEncoding, WarcWriter};
    use pretty_assertions::assert_eq;

    fn response(body: &[u8]) -> WarcRecord {
        let mut http = HeaderMap::new(HeaderEncoding::Latin1);
        http.set_status_line("HTTP/1.1 200 OK");
        http.append("Content-Type", "text/plain");
        let mut record = WarcRecord::new();
        record.init_headers(0, WarcRecordType::Response, None);
        record.headers_mut().append("WARC-Target-URI", "https://example.com/");
        record.set_http_content(http, body).unwrap();
        record
    }

    fn member(record: &WarcRecord) -> Vec<u8> {
        let mut writer = WarcWriter::new(Vec::new(), true);
        writer.write_record(record).unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn reads_gzip_members_in_order() {
        let mut data = member(&response(b"one"));
        data.extend(member(&response(b"two")));

        let records: Vec<_> = ArchiveIterator::new(data.as_slice(), ArchiveIteratorConfig::default())
            .map(Result::unwrap)
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].content(), b"one");
        assert_eq!(records[1].content(), b"two");
        assert_eq!(records[0].stream_pos(), 0);
        assert!(records[1].stream_pos() > 0);
        assert_eq!(records[1].record_type(), WarcRecordType::Response);
    }

    #[test]
    fn reads_plain_records() {
        let mut writer = WarcWriter::new(Vec::new(), false);
        writer.write_record(&response(b"plain")).unwrap();
        writer.write_record(&response(b"text")).unwrap();
        let data = writer.finish().unwrap();

        let records: Vec<_> = ArchiveIterator::new(data.as_slice(), ArchiveIteratorConfig::default())
            .map(Result::unwrap)
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].content(), b"text");
        assert_eq!(records[1].http_headers().and_then(HeaderMap::status_code), Some(200));
    }

    #[test]
    fn checksum_failure_is_contained_to_one_member() {
        let first = member(&response(b"first"));
        let mut second = member(&response(b"second"));
        let third = member(&response(b"third"));
        // Flip a bit in the CRC32 trailer of the second member.
        let crc_pos = second.len() - 8;
        second[crc_pos] ^= 0xff;

        let mut data = first;
        data.extend(second);
        data.extend(third);

        let results: Vec<_> = ArchiveIterator::new(data.as_slice(), ArchiveIteratorConfig::default()).collect();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().content(), b"first");
        match &results[1] {
            Err(WarcError::CorruptRecord { partial: Some(partial), .. }) => {
                assert_eq!(partial.record_type(), WarcRecordType::Response);
            }
            other => panic!("expected corrupt record, got {other:?}"),
        }
        assert_eq!(results[2].as_ref().unwrap().content(), b"third");
    }

    #[test]
    fn damaged_member_header_loses_only_that_member() {
        let first = member(&response(b"first"));
        let mut second = member(&response(b"second"));
        let third = member(&response(b"third"));
        second[0] = 0x00;

        let mut data = first;
        data.extend(second);
        data.extend(third);

        let results: Vec<_> = ArchiveIterator::new(data.as_slice(), ArchiveIteratorConfig::default()).collect();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().content(), b"first");
        assert!(matches!(results[1], Err(WarcError::CorruptRecord { partial: None, .. })));
        assert_eq!(results[2].as_ref().unwrap().content(), b"third");
    }

    #[test]
    fn broken_plain_record_resyncs_on_next_member() {
        let mut data = b"WARC/1.1\r\nWARC-Type: resource\r\n\r\n".to_vec();
        data.extend(member(&response(b"after")));

        let results: Vec<_> = ArchiveIterator::new(data.as_slice(), ArchiveIteratorConfig::default()).collect();
        assert_eq!(results.len(), 2);
        assert!(matches!(&results[0], Err(WarcError::CorruptRecord { reason, .. }) if reason.contains("Content-Length")));
        assert_eq!(results[1].as_ref().unwrap().content(), b"after");
    }

    #[test]
    fn stream_pos_tracks_consumed_bytes() {
        let first = member(&response(b"one"));
        let mut data = first.clone();
        data.extend(member(&response(b"two")));

        let mut iter = ArchiveIterator::new(data.as_slice(), ArchiveIteratorConfig::default());
        assert_eq!(iter.stream_pos(), 0);
        iter.read_next().unwrap().unwrap();
        assert_eq!(iter.stream_pos(), first.len() as u64);
        let second = iter.read_next().unwrap().unwrap();
        assert_eq!(second.stream_pos(), first.len() as u64);
        assert_eq!(iter.stream_pos(), data.len() as u64);
        assert!(iter.read_next().unwrap().is_none());
    }

    #[test]
    fn garbage_between_plain_records_is_skipped() {
        let mut writer = WarcWriter::new(Vec::new(), false);
        writer.write_record(&response(b"a")).unwrap();
        let mut data = writer.finish().unwrap();
        data.extend_from_slice(b"garbage line\r\n");
        let mut writer = WarcWriter::new(Vec::new(), false);
        writer.write_record(&response(b"b")).unwrap();
        data.extend(writer.finish().unwrap());

        let results: Vec<_> = ArchiveIterator::new(data.as_slice(), ArchiveIteratorConfig::default()).collect();
        assert_eq!(results.len(), 3);
        assert!(matches!(results[1], Err(WarcError::CorruptRecord { .. })));
        assert_eq!(results[2].as_ref().unwrap().content(), b"b");
    }

    #[test]
    fn digest_mismatch_is_reported_when_verifying() {
        let mut writer = WarcWriter::new(Vec::new(), false);
        writer.write_record(&response(b"payload")).unwrap();
        let mut data = writer.finish().unwrap();
        let pos = data.windows(7).position(|w| w == b"payload").unwrap();
        data[pos] = b'P';

        let config = ArchiveIteratorConfig {
            verify_digests: true,
            ..Default::default()
        };
        let results: Vec<_> = ArchiveIterator::new(data.as_slice(), config).collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(&results[0], Err(WarcError::CorruptRecord { reason, .. }) if reason.contains("digest")));

        let results: Vec<_> = ArchiveIterator::new(data.as_slice(), ArchiveIteratorConfig::default()).collect();
        assert_eq!(results[0].as_ref().unwrap().content(), b"Payload");
    }

    #[test]
    fn truncated_record_keeps_headers() {
        let data = b"WARC/1.1\r\nWARC-Type: resource\r\nContent-Length: 100\r\n\r\nshort";
        let results: Vec<_> = ArchiveIterator::new(&data[..], ArchiveIteratorConfig::default()).collect();
        assert_eq!(results.len(), 1);
        match &results[0] {
            Err(WarcError::CorruptRecord { partial: Some(partial), reason, .. }) => {
                assert!(reason.contains("truncated"));
                assert_eq!(partial.record_type(), WarcRecordType::Resource);
            }
            other => panic!("expected corrupt record, got {other:?}"),
        }
    }

    #[test]
    fn header_block_accepts_bare_lf_and_continuations() {
        let mut headers = HeaderMap::new(HeaderEncoding::Latin1);
        let mut input: &[u8] = b"HTTP/1.1 200 OK\nX-Long: part one\n  part two\nX-Other: 1\n\nbody";
        let consumed = parse_header_block(&mut input, &mut headers, true).unwrap();
        assert_eq!(input, b"body");
        assert_eq!(consumed, 56);
        assert_eq!(headers.get("x-long").as_deref(), Some("part one part two"));
        assert_eq!(headers.status_code(), Some(200));
    }
}
