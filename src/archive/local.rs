//! Local Archive
//!
//! Filesystem-backed day files in an SDS-style tree:
//!
//! ```text
//! root/[BUCKET/]YYYY/NET/STA/CHA.D/NET.STA.LOC.CHA.D.YYYY.DDD
//! ```
//!
//! Serves both as the [`ArchiveStore`] the index cache reads through and the
//! [`ObjectStore`] the concurrent fetcher hydrates from. A bucket is always a
//! root-relative directory: day files listed under the archive's own bucket
//! are fetched back with `get_object(bucket, object_key)`.

use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::{ArchiveStore, DayFile};
use crate::error::{Result, SeisError};
use crate::fetch::ObjectStore;
use crate::identity::StreamIdentity;

/// Day-file archive rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalArchive {
    root: PathBuf,
    bucket: String,
}

impl LocalArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            bucket: String::new(),
        }
    }

    /// Keep day files under `root/bucket` instead of `root`
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Result<Self> {
        let bucket = bucket.into();
        if escapes(Path::new(&bucket)) {
            return Err(SeisError::Config(format!(
                "archive bucket escapes archive root: {}",
                bucket
            )));
        }
        self.bucket = bucket;
        Ok(self)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Root-relative object key of a day file
    pub fn relative_path(file: &DayFile) -> PathBuf {
        let id = &file.identity;
        let year = format!("{:04}", file.date.year());
        let name = format!(
            "{}.{}.{}.{}.D.{}.{:03}",
            id.network,
            id.station,
            id.location,
            id.channel,
            year,
            file.date.ordinal()
        );
        PathBuf::from(year)
            .join(&id.network)
            .join(&id.station)
            .join(format!("{}.D", id.channel))
            .join(name)
    }

    pub fn path_of(&self, file: &DayFile) -> PathBuf {
        self.bucket_dir().join(Self::relative_path(file))
    }

    /// Write (or replace) a whole day file
    pub async fn write_day_file(&self, file: &DayFile, data: &[u8]) -> Result<()> {
        let path = self.path_of(file);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut staging = path.clone().into_os_string();
        staging.push(".partial");
        tokio::fs::write(&staging, data).await?;
        tokio::fs::rename(&staging, &path).await?;
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn not_found(path: &Path, e: std::io::Error) -> SeisError {
        if e.kind() == std::io::ErrorKind::NotFound {
            SeisError::NotFound(path.display().to_string())
        } else {
            SeisError::Io(e)
        }
    }

    fn bucket_dir(&self) -> PathBuf {
        self.root.join(&self.bucket)
    }

    /// Resolve an object key without letting it escape the root
    fn resolve_key(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let relative = Path::new(bucket).join(key);
        if escapes(&relative) {
            return Err(SeisError::BadRequest(format!(
                "object key escapes archive root: {}",
                relative.display()
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ArchiveStore for LocalArchive {
    async fn fetch_whole(&self, file: &DayFile) -> Result<Bytes> {
        let path = self.path_of(file);
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| Self::not_found(&path, e))?;
        Ok(Bytes::from(data))
    }

    async fn modified_time(&self, file: &DayFile) -> Result<DateTime<Utc>> {
        let path = self.path_of(file);
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| Self::not_found(&path, e))?;
        Ok(DateTime::<Utc>::from(metadata.modified()?))
    }

    async fn fetch_range(&self, file: &DayFile, from: u64, to: u64) -> Result<Bytes> {
        let path = self.path_of(file);
        let mut handle = tokio::fs::File::open(&path)
            .await
            .map_err(|e| Self::not_found(&path, e))?;

        let len = to.saturating_sub(from);
        let mut buf = Vec::with_capacity(len as usize);
        handle.seek(SeekFrom::Start(from)).await?;
        handle.take(len).read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    async fn list_identities(&self, date: NaiveDate) -> Result<Vec<StreamIdentity>> {
        let year_dir = self.bucket_dir().join(format!("{:04}", date.year()));
        tokio::task::spawn_blocking(move || scan_year(&year_dir, date))
            .await
            .map_err(|e| SeisError::Storage(format!("archive scan task failed: {}", e)))?
    }

    fn object_key(&self, file: &DayFile) -> String {
        Self::relative_path(file).to_string_lossy().into_owned()
    }

    async fn object_size(&self, file: &DayFile) -> Result<u64> {
        let path = self.path_of(file);
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| Self::not_found(&path, e))?;
        Ok(metadata.len())
    }
}

#[async_trait]
impl ObjectStore for LocalArchive {
    async fn get_object(&self, bucket: &str, _version: Option<&str>, key: &str) -> Result<Bytes> {
        let path = self.resolve_key(bucket, key)?;
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| Self::not_found(&path, e))?;
        Ok(Bytes::from(data))
    }
}

/// True when `relative` is absolute or steps outside its base
fn escapes(relative: &Path) -> bool {
    relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Walk `YYYY/NET/STA/CHA.D/` collecting identities that have a file for `date`
fn scan_year(year_dir: &Path, date: NaiveDate) -> Result<Vec<StreamIdentity>> {
    let suffix = format!(".D.{:04}.{:03}", date.year(), date.ordinal());
    let mut identities = Vec::new();

    for network in read_dirs(year_dir)? {
        for station in read_dirs(&network)? {
            for channel in read_dirs(&station)? {
                for entry in std::fs::read_dir(&channel)? {
                    let entry = entry?;
                    let name = entry.file_name();
                    let Some(name) = name.to_str() else {
                        continue;
                    };
                    let Some(stem) = name.strip_suffix(&suffix) else {
                        continue;
                    };
                    if let Some(identity) = parse_stem(stem) {
                        identities.push(identity);
                    }
                }
            }
        }
    }
    Ok(identities)
}

/// Subdirectories of `dir`; a missing directory has none
fn read_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// `NET.STA.LOC.CHA` (location may be empty)
fn parse_stem(stem: &str) -> Option<StreamIdentity> {
    let mut parts = stem.split('.');
    let network = parts.next()?;
    let station = parts.next()?;
    let location = parts.next()?;
    let channel = parts.next()?;
    if parts.next().is_some() || network.is_empty() || station.is_empty() || channel.is_empty() {
        return None;
    }
    Some(StreamIdentity::new(network, station, location, channel))
}
