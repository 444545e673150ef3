use std::{
    fs::File,
    io::Cursor,
    path::{Path, PathBuf},
};

use zip::ZipArchive;

use super::DatasetError;

pub const MARKER_FILE: &str = ".dataset-version";

/// What was last unpacked into the data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadMarker {
    pub etag: Option<String>,
    /// blake3 hex digest of the archive bytes.
    pub digest: String,
}

impl DownloadMarker {
    pub fn parse(contents: &str) -> Option<Self> {
        let mut etag = None;
        let mut digest = None;
        for line in contents.lines() {
            match line.split_once('=') {
                Some(("etag", v)) if !v.is_empty() => etag = Some(v.to_string()),
                Some(("blake3", v)) if !v.is_empty() => digest = Some(v.to_string()),
                _ => {}
            }
        }
        Some(Self { etag, digest: digest? })
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(etag) = &self.etag {
            out.push_str(&format!("etag={etag}\n"));
        }
        out.push_str(&format!("blake3={}\n", self.digest));
        out
    }

    /// Missing or unreadable markers count as "never downloaded".
    pub async fn read(dir: &Path) -> Option<Self> {
        let contents = tokio::fs::read_to_string(dir.join(MARKER_FILE)).await.ok()?;
        Self::parse(&contents)
    }

    pub async fn write(&self, dir: &Path) -> Result<(), DatasetError> {
        tokio::fs::write(dir.join(MARKER_FILE), self.render()).await?;
        Ok(())
    }
}

pub fn archive_digest(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Unpack every file entry of a zip archive into `dest`.
///
/// Entries that would land outside `dest` fail the whole extraction.
pub fn extract_archive(bytes: &[u8], dest: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| DatasetError::Archive(format!("not a zip archive: {e}")))?;

    let mut files = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| DatasetError::Archive(format!("unreadable entry {i}: {e}")))?;

        let relative = entry
            .enclosed_name()
            .ok_or_else(|| DatasetError::Archive(format!("unsafe entry path '{}'", entry.name())))?
            .to_path_buf();
        let out_path = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)?;
        std::io::copy(&mut entry, &mut out)?;
        tracing::debug!(path = %out_path.display(), size = entry.size(), "extracted dataset file");
        files.push(out_path);
    }

    Ok(files)
}
