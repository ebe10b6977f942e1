//! NRT On-Disk Layout
//!
//! ```text
//! root/NET/STA/LOC/CHA/<Weekday>/<HH>/<startNanos>-<endNanos>
//! ```
//!
//! One file per record. `LOC` is `--` when the location code is empty,
//! `Weekday` is the full English day name and `HH` the UTC hour of the
//! record start. Writers replace a week-old hour directory in place, so the
//! tree holds at most seven days.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc, Weekday};

use crate::error::{Result, SeisError};
use crate::identity::StreamIdentity;
use crate::record::{RecordHeader, RECORD_LEN};

/// On-disk directory name for an empty location code
pub const EMPTY_LOCATION: &str = "--";

/// Directory holding every record of one identity
pub fn identity_dir(root: &Path, identity: &StreamIdentity) -> PathBuf {
    let location = if identity.location.is_empty() {
        EMPTY_LOCATION
    } else {
        identity.location.as_str()
    };
    root.join(&identity.network)
        .join(&identity.station)
        .join(location)
        .join(&identity.channel)
}

/// Full path of the file for a record spanning `[start, end]`
pub fn record_path(
    root: &Path,
    identity: &StreamIdentity,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<PathBuf> {
    Ok(identity_dir(root, identity)
        .join(weekday_name(start.weekday()))
        .join(format!("{:02}", start.hour()))
        .join(record_name(start, end)?))
}

/// `<startNanos>-<endNanos>`
pub fn record_name(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<String> {
    let nanos = |t: DateTime<Utc>| {
        t.timestamp_nanos_opt()
            .ok_or_else(|| SeisError::MalformedRecord(format!("time {} out of range", t)))
    };
    Ok(format!("{}-{}", nanos(start)?, nanos(end)?))
}

/// Parse `<startNanos>-<endNanos>`; `None` for anything else
pub fn parse_record_name(name: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let (start, end) = name.split_once('-')?;
    let start = Utc.timestamp_nanos(start.parse().ok()?);
    let end = Utc.timestamp_nanos(end.parse().ok()?);
    (start <= end).then_some((start, end))
}

/// Store one encoded record under `root`, returning its path
///
/// The record is written to a temporary sibling and renamed into place so
/// readers never observe a partial file.
pub async fn write_record(root: &Path, record: &[u8]) -> Result<PathBuf> {
    if record.len() != RECORD_LEN {
        return Err(SeisError::MalformedRecord(format!(
            "NRT record must be {} bytes, got {}",
            RECORD_LEN,
            record.len()
        )));
    }
    let header = RecordHeader::decode(record)?;
    let path = record_path(root, &header.identity, header.start, header.end())?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut staging = path.clone().into_os_string();
    staging.push(".tmp");
    tokio::fs::write(&staging, record).await?;
    tokio::fs::rename(&staging, &path).await?;
    Ok(path)
}

/// Identity encoded by the four directory names below the root
pub fn identity_from_dirs(
    network: &str,
    station: &str,
    location: &str,
    channel: &str,
) -> StreamIdentity {
    let location = if location == EMPTY_LOCATION { "" } else { location };
    StreamIdentity::new(network, station, location, channel)
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

