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

use std::io::{self, Write};

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::{WarcError, WarcRecord};

/// WARC record stream writer.
///
/// With compression enabled, each record becomes an independent gzip member.
pub struct WarcWriter<W: Write> {
    inner: W,
    compress: bool,
    records_written: usize,
    bytes_written: u64,
}

impl<W: Write> WarcWriter<W> {
    /// Create a new writer.
    ///
    /// # Arguments
    ///
    /// * `inner` - Output stream
    /// * `compress` - Whether to gzip every record
    pub fn new(inner: W, compress: bool) -> Self {
        WarcWriter {
            inner,
            compress,
            records_written: 0,
            bytes_written: 0,
        }
    }

    /// Whether records are gzip-compressed.
    pub fn is_compressed(&self) -> bool {
        self.compress
    }

    /// Number of records written so far.
    pub fn records_written(&self) -> usize {
        self.records_written
    }

    /// Number of (possibly compressed) bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Write a single record.
    ///
    /// # Returns
    ///
    /// Number of bytes written to the underlying stream
    pub fn write_record(&mut self, record: &WarcRecord) -> Result<usize, WarcError> {
        self.write_records(&[record])
    }

    /// Write a batch of records.
    ///
    /// All records are serialized before anything is written, so a record
    /// that fails to serialize leaves the stream untouched.
    ///
    /// # Returns
    ///
    /// Number of bytes written to the underlying stream
    pub fn write_records(&mut self, records: &[&WarcRecord]) -> Result<usize, WarcError> {
        let mut framed = Vec::new();
        for record in records {
            framed.extend(self.frame(record)?);
        }
        self.inner.write_all(&framed)?;
        self.records_written += records.len();
        self.bytes_written += framed.len() as u64;
        Ok(framed.len())
    }

    fn frame(&self, record: &WarcRecord) -> Result<Vec<u8>, WarcError> {
        let mut raw = Vec::with_capacity(record.content_length() + 512);
        record.write(&mut raw)?;
        if !self.compress {
            return Ok(raw);
        }
        let mut member = GzEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::default());
        member.write_all(&raw)?;
        Ok(member.finish()?)
    }

    /// Get a reference to the underlying stream.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    /// Flush and return the underlying stream.
    pub fn finish(mut self) -> Result<W, WarcError> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WarcRecordType;
    use pretty_assertions::assert_eq;

    fn resource(body: &[u8]) -> WarcRecord {
        let mut record = WarcRecord::new();
        record.init_headers(0, WarcRecordType::Resource, None);
        record.set_content(body.to_vec());
        record
    }

    #[test]
    fn counts_records_and_bytes() {
        let mut writer = WarcWriter::new(Vec::new(), false);
        assert!(!writer.is_compressed());
        let first = writer.write_record(&resource(b"abc")).unwrap();
        assert_eq!(writer.get_ref().len(), first);
        writer.flush().unwrap();

        let second = writer.write_records(&[&resource(b"d"), &resource(b"ef")]).unwrap();
        assert_eq!(writer.records_written(), 3);
        assert_eq!(writer.bytes_written(), (first + second) as u64);
        assert!(writer.get_ref().starts_with(b"WARC/1.1\r\n"));
        assert_eq!(writer.finish().unwrap().len(), first + second);
    }

    #[test]
    fn compressed_records_are_separate_gzip_members() {
        let mut writer = WarcWriter::new(Vec::new(), true);
        assert!(writer.is_compressed());
        let first = writer.write_record(&resource(b"abc")).unwrap();
        writer.write_record(&resource(b"def")).unwrap();
        let data = writer.finish().unwrap();

        assert_eq!(&data[..3], &[0x1f, 0x8b, 0x08]);
        assert_eq!(&data[first..first + 3], &[0x1f, 0x8b, 0x08]);
    }

    #[test]
    fn failed_batch_leaves_stream_untouched() {
        let mut bad = resource(b"x");
        bad.headers_mut().append("X-Bad", "a\nb");
        let mut writer = WarcWriter::new(Vec::new(), true);
        assert!(writer.write_records(&[&resource(b"ok"), &bad]).is_err());
        assert_eq!(writer.records_written(), 0);
        assert_eq!(writer.bytes_written(), 0);
        assert!(writer.get_ref().is_empty());
    }
}
