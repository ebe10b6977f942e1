//! Stream Identities
//!
//! The (network, station, location, channel) tuple that names one data
//! stream, plus the regular-expression form used for listing and searching.
//!
//! ## Matching Semantics
//! Each pattern field is anchored, so `BH.` matches `BHZ` but not `BHZX`.
//! This mirrors the full-match behaviour of the holdings index.

use std::fmt;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SeisError};

/// Network, station, location and channel codes of one stream
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamIdentity {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
}

impl StreamIdentity {
    pub fn new(
        network: impl Into<String>,
        station: impl Into<String>,
        location: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            network: network.into(),
            station: station.into(),
            location: location.into(),
            channel: channel.into(),
        }
    }

    /// Parse `NET.STA.LOC.CHA` (empty location allowed: `NZ.WEL..HHZ`)
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('.').collect();
        match parts.as_slice() {
            [net, sta, loc, cha] if !net.is_empty() && !sta.is_empty() && !cha.is_empty() => {
                Ok(Self::new(*net, *sta, *loc, *cha))
            }
            _ => Err(SeisError::BadRequest(format!(
                "expected NET.STA.LOC.CHA, got {:?}",
                s
            ))),
        }
    }
}

impl fmt::Display for StreamIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.network, self.station, self.location, self.channel
        )
    }
}

/// Unique key of one record across both tiers: identity + start time
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub identity: StreamIdentity,
    pub start: DateTime<Utc>,
}

/// Compiled regular expressions over the four identity fields
#[derive(Debug, Clone)]
pub struct IdentityPattern {
    network: Regex,
    station: Regex,
    location: Regex,
    channel: Regex,
    source: [String; 4],
}

impl IdentityPattern {
    /// Compile one regular expression per field
    ///
    /// Fails with `InvalidPattern` naming the first field that does not compile.
    pub fn new(network: &str, station: &str, location: &str, channel: &str) -> Result<Self> {
        Ok(Self {
            network: Self::compile("network", network)?,
            station: Self::compile("station", station)?,
            location: Self::compile("location", location)?,
            channel: Self::compile("channel", channel)?,
            source: [
                network.to_string(),
                station.to_string(),
                location.to_string(),
                channel.to_string(),
            ],
        })
    }

    /// Pattern that matches exactly one identity
    pub fn exact(identity: &StreamIdentity) -> Self {
        Self::new(
            &regex::escape(&identity.network),
            &regex::escape(&identity.station),
            &regex::escape(&identity.location),
            &regex::escape(&identity.channel),
        )
        .expect("escaped literals always compile")
    }

    /// Pattern that matches every identity
    pub fn any() -> Self {
        Self::new(".*", ".*", ".*", ".*").expect("static pattern compiles")
    }

    /// Build from FDSN wildcards: `*` any run, `?` one char, `--` empty location.
    /// Comma separated alternatives are allowed in every field.
    pub fn from_glob(network: &str, station: &str, location: &str, channel: &str) -> Result<Self> {
        let location = if location == "--" { "" } else { location };
        Self::new(
            &glob_to_regex(network),
            &glob_to_regex(station),
            &glob_to_regex(location),
            &glob_to_regex(channel),
        )
    }

    /// True if every field matches in full
    pub fn matches(&self, identity: &StreamIdentity) -> bool {
        self.network.is_match(&identity.network)
            && self.station.is_match(&identity.station)
            && self.location.is_match(&identity.location)
            && self.channel.is_match(&identity.channel)
    }

    /// The uncompiled field expressions (network, station, location, channel)
    pub fn source(&self) -> &[String; 4] {
        &self.source
    }

    fn compile(field: &'static str, expr: &str) -> Result<Regex> {
        Regex::new(&format!("^(?:{})$", expr))
            .map_err(|source| SeisError::InvalidPattern { field, source })
    }
}

impl fmt::Display for IdentityPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source.join("."))
    }
}

/// Translate one FDSN wildcard field into a regular expression
fn glob_to_regex(glob: &str) -> String {
    let alternatives: Vec<String> = glob
        .split(',')
        .map(|alt| {
            let alt = if alt == "--" { "" } else { alt };
            let mut out = String::with_capacity(alt.len() * 2);
            for c in alt.chars() {
                match c {
                    '*' => out.push_str(".*"),
                    '?' => out.push('.'),
                    other => out.push_str(&regex::escape(&other.to_string())),
                }
            }
            out
        })
        .collect();
    alternatives.join("|")
}
