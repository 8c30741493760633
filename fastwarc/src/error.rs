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

use std::io;

use thiserror::Error;

use crate::WarcRecord;

/// Errors raised while reading or writing WARC records.
#[derive(Debug, Error)]
pub enum WarcError {
    /// The underlying stream failed. Iteration cannot continue after this.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A header cannot be serialized into a header block.
    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: &'static str },

    /// A single record could not be read.
    ///
    /// `partial` holds whatever could be salvaged from the record (usually its WARC headers).
    #[error("corrupt record at offset {offset}: {reason}")]
    CorruptRecord {
        offset: u64,
        reason: String,
        partial: Option<Box<WarcRecord>>,
    },
}

impl WarcError {
    pub(crate) fn invalid_header(name: impl Into<String>, reason: &'static str) -> Self {
        WarcError::InvalidHeader { name: name.into(), reason }
    }

    pub(crate) fn corrupt(offset: u64, reason: impl Into<String>, partial: Option<WarcRecord>) -> Self {
        WarcError::CorruptRecord {
            offset,
            reason: reason.into(),
            partial: partial.map(Box::new),
        }
    }

    /// Whether the error affects the whole stream rather than a single record.
    pub fn is_fatal(&self) -> bool {
        matches!(self, WarcError::Io(_))
    }
}
