// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::fs::Metadata;
use std::sync::Arc;
use std::time::SystemTime;

use serde::Serialize;

/// Snapshot of the source file's metadata, taken when the source was opened.
///
/// `device` and `inode` let a registrar recognise the same file after a rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub device: Option<u64>,
    pub inode: Option<u64>,
}

impl From<&Metadata> for FileInfo {
    fn from(metadata: &Metadata) -> Self {
        #[cfg(unix)]
        let (device, inode) = {
            use std::os::unix::fs::MetadataExt;
            (Some(metadata.dev()), Some(metadata.ino()))
        };
        #[cfg(not(unix))]
        let (device, inode) = (None, None);

        Self {
            size: metadata.len(),
            modified: metadata.modified().ok(),
            device,
            inode,
        }
    }
}

/// A completed record, ready for the downstream consumer.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestEvent {
    pub source: Arc<str>,
    /// Byte position right after the last line of this record.
    pub offset: u64,
    /// Raw lines consumed from the source so far, this record's lines included.
    pub line: u64,
    pub text: String,
    pub fields: Arc<HashMap<String, String>>,
    /// `None` when reading standard input.
    pub file_info: Option<FileInfo>,
}
