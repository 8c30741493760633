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

//! Plain-text rendering of a decoded archive.

use crate::decode::{Content, ContainerReadout, HeaderFields};

fn push_headers(report: &mut String, title: &str, headers: &HeaderFields) {
    report.push_str(title);
    report.push_str(":\n");
    for (key, value) in headers.iter() {
        report.push_str(&format!("  {key}: {value}\n"));
    }
    report.push('\n');
}

/// Human-readable report listing every record with its headers and content.
pub fn text_report(readout: &ContainerReadout) -> String {
    let mut report = String::from("WARC File Report\n================\n\n");
    report.push_str(&format!("Total Records: {}\n\n", readout.record_count));

    for (label, record) in readout.iter() {
        report.push_str(&format!("{label}\n{}\n\n", "-".repeat(label.len())));

        push_headers(&mut report, "WARC Headers", &record.warc_headers);
        if let Some(http_headers) = &record.http_headers {
            push_headers(&mut report, "HTTP Headers", http_headers);
        }

        report.push_str(&format!("Content Type: {}\n", record.content_type));
        report.push_str(&format!("Content Size: {} bytes\n\n", record.content_size));

        match (&record.content_error, &record.content) {
            (Some(error), _) => report.push_str(&format!("Content Error: {error}\n")),
            (None, Content::Text(text)) => {
                report.push_str("Content:\n--------\n");
                report.push_str(text);
                report.push('\n');
            }
            (None, Content::Binary(_)) => report.push_str("Content: [Binary data]\n"),
        }

        report.push_str(&format!("\n{}\n\n", "=".repeat(80)));
    }
    report
}
