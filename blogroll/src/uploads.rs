// Copyright (C) 2025-2026 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of blogroll.
//
// blogroll is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// blogroll is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with blogroll.  If not,
// see <http://www.gnu.org/licenses/>.

//! # uploads
//!
//! File uploads (blog images, avatars) are written synchronously to local disk: the request
//! blocks until the file is durably on disk before the referencing entity is persisted, so a
//! stored reference never names a file that isn't there. Files are named by
//! millisecond-timestamp plus the original extension, which is unique enough at this scale.

use std::path::Path;

use chrono::Utc;
use snafu::{prelude::*, Backtrace};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to create the upload directory {dir}: {source}"))]
    CreateDir {
        dir: String,
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to write {name}: {source}"))]
    Write {
        name: String,
        source: std::io::Error,
        backtrace: Backtrace,
    },
}

type Result<T> = std::result::Result<T, Error>;

/// Write one uploaded file into `dir`; return the generated file name
///
/// The stored entity reference is the caller's affair (blog images are served under `/uploads`,
/// avatars under `/avatars`); this function just picks the name & does the write.
pub async fn save_upload(dir: &Path, original_name: Option<&str>, bytes: &[u8]) -> Result<String> {
    tokio::fs::create_dir_all(dir).await.context(CreateDirSnafu {
        dir: dir.display().to_string(),
    })?;
    let ext = original_name
        .and_then(|name| Path::new(name).extension())
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let name = format!("{}{}", Utc::now().timestamp_millis(), ext);
    tokio::fs::write(dir.join(&name), bytes)
        .await
        .context(WriteSnafu { name: name.clone() })?;
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trip() {
        let tmp = tempfile::tempdir().unwrap(/* known good */);
        let name = save_upload(tmp.path(), Some("cat.png"), b"not actually a png")
            .await
            .unwrap(/* known good */);
        assert!(name.ends_with(".png"));
        let read = tokio::fs::read(tmp.path().join(&name)).await.unwrap(/* known good */);
        assert_eq!(b"not actually a png".to_vec(), read);
    }
}
