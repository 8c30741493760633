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

use chrono::Utc;
use pagewarc::model::Headers;
use pagewarc::{
    read_container, read_container_from, write_archive, Content, Correlator, ReadOptions, RequestRecord,
    ResponseRecord,
};
use pretty_assertions::assert_eq;

const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];

fn request(id: &str) -> RequestRecord {
    RequestRecord {
        id: id.to_string(),
        method: "GET".to_string(),
        headers: Headers::from([("Accept".to_string(), "*/*".to_string())]),
        body: None,
        timestamp: Utc::now(),
    }
}

fn response(id: &str, content_type: &str, body: &[u8]) -> ResponseRecord {
    ResponseRecord {
        id: id.to_string(),
        status: 200,
        headers: Headers::from([("Content-Type".to_string(), content_type.to_string())]),
        body: Some(body.to_vec()),
        remote: None,
        timing: None,
        timestamp: Utc::now(),
    }
}

fn member_starts(data: &[u8]) -> Vec<usize> {
    data.windows(GZIP_MAGIC.len())
        .enumerate()
        .filter(|(_, window)| *window == GZIP_MAGIC)
        .map(|(offset, _)| offset)
        .collect()
}

fn sample_table() -> pagewarc::ResourceTable {
    let correlator = Correlator::new();
    correlator.on_request_started("https://site.test/", request("1"));
    correlator.on_response_received("https://site.test/", response("1", "text/html; charset=utf-8", b"<h1>raw</h1>"));
    correlator.on_response_received("https://site.test/blob", response("2", "application/octet-stream", &[0, 1, 2, 3]));
    correlator.on_request_started("https://site.test/data.json", request("3"));
    correlator.on_response_received("https://site.test/data.json", response("3", "application/json", b"{\"a\":1}"));
    correlator.drain()
}

#[test]
fn capture_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    for (name, compress) in [("site.warc.gz", true), ("site.warc", false)] {
        let path = dir.path().join(name);
        let summary = write_archive(
            &path,
            "https://site.test/",
            Some("<h1>rendered</h1>".to_string()),
            &sample_table(),
            "pagewarc/test",
            compress,
        )
        .unwrap();
        assert_eq!(summary.written, 4);
        assert_eq!(summary.records, 9);

        let readout = read_container(&path, &ReadOptions { verify_digests: true }).unwrap();
        assert_eq!(readout.record_count, 9);
        let labels: Vec<_> = readout.iter().map(|(label, _)| label.to_string()).collect();
        assert_eq!(labels.first().map(String::as_str), Some("Record #1"));
        assert_eq!(labels.last().map(String::as_str), Some("Record #9"));
        assert!(readout.iter().all(|(_, record)| record.content_error.is_none()));

        let rendered = readout.get("Record #3").unwrap();
        assert_eq!(rendered.content, Content::Text("<h1>rendered</h1>".to_string()));
        assert_eq!(rendered.content_type, "text/html");

        let blob = readout.get("Record #7").unwrap();
        assert_eq!(blob.content, Content::Binary(vec![0, 1, 2, 3]));
        assert_eq!(blob.content_size, 4);
        assert_eq!(
            readout.get("Record #6").unwrap().http_headers.as_ref().unwrap().len(),
            1,
            "response-only entry gets a bare request"
        );

        let json: serde_json::Value = serde_json::from_str(&readout.to_json().unwrap()).unwrap();
        assert_eq!(json["recordCount"], 9);
        assert_eq!(json["records"]["Record #7"]["content"], "AAECAw==");
        assert_eq!(json["records"]["Record #7"]["contentEncoding"], "base64");
        assert_eq!(json["records"]["Record #9"]["content"], "{\"a\":1}");
        assert!(json["records"]["Record #9"].get("contentEncoding").is_none());
    }
}

#[test]
fn corrupt_member_is_reported_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("site.warc.gz");
    write_archive(&path, "https://site.test/", None, &sample_table(), "pagewarc/test", true).unwrap();
    let mut data = std::fs::read(&path).unwrap();

    let starts = member_starts(&data);
    assert_eq!(starts.len(), 7);
    // Break the CRC32 in the trailer of the third member.
    data[starts[3] - 8] ^= 0xff;

    let readout = read_container_from(data.as_slice(), &ReadOptions::default());
    assert_eq!(readout.record_count, 7);
    let broken = readout.get("Record #3").unwrap();
    assert!(broken.content_error.is_some());
    assert_eq!(broken.warc_headers.get("WARC-Type"), Some("response"));
    assert!(readout
        .iter()
        .filter(|(label, _)| *label != "Record #3")
        .all(|(_, record)| record.content_error.is_none()));
}

#[test]
fn damaged_member_header_loses_only_that_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("site.warc.gz");
    write_archive(&path, "https://site.test/", None, &sample_table(), "pagewarc/test", true).unwrap();
    let mut data = std::fs::read(&path).unwrap();

    let starts = member_starts(&data);
    assert_eq!(starts.len(), 7);
    // Overwrite the first gzip magic byte of the third member.
    data[starts[2]] = 0x00;

    let readout = read_container_from(data.as_slice(), &ReadOptions::default());
    assert_eq!(readout.record_count, 7);
    assert!(readout.get("Record #3").unwrap().content_error.is_some());
    assert!(readout
        .iter()
        .filter(|(label, _)| *label != "Record #3")
        .all(|(_, record)| record.content_error.is_none()));
    assert_eq!(readout.get("Record #4").unwrap().warc_headers.get("WARC-Type"), Some("request"));
}

#[test]
fn non_ascii_header_values_round_trip() {
    let correlator = Correlator::new();
    let mut exchange = response("1", "text/plain", b"hi");
    exchange.headers.insert("X-Name".to_string(), "café ✓".to_string());
    correlator.on_request_started("https://site.test/", request("1"));
    correlator.on_response_received("https://site.test/", exchange);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("site.warc.gz");
    write_archive(&path, "https://site.test/", None, &correlator.drain(), "pagewarc/test", true).unwrap();

    let readout = read_container(&path, &ReadOptions::default()).unwrap();
    let response = readout.get("Record #3").unwrap();
    assert_eq!(response.http_headers.as_ref().unwrap().get("X-Name"), Some("café ✓"));
}
