//! Query Parsing
//!
//! FDSN dataselect-style requests, as GET parameters or a POST body:
//!
//! ```text
//! quality=B                                          <- optional key=value lines
//! IU ANMO 00 BHZ 2016-03-19T00:00:00 2016-03-19T01:00:00
//! IU *    -- LH? 2016-03-19           2016-03-20     <- one sub-query per line
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::{Result, SeisError};
use crate::identity::IdentityPattern;

/// One identity pattern over one time window
#[derive(Debug, Clone)]
pub struct SubQuery {
    pub pattern: IdentityPattern,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SubQuery {
    /// Build from FDSN wildcard fields
    pub fn new(
        fields: [&str; 4],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self> {
        if start > end {
            return Err(SeisError::BadRequest(format!(
                "start {} is after end {}",
                start, end
            )));
        }
        let [network, station, location, channel] = fields;
        let pattern = IdentityPattern::from_glob(network, station, location, channel)
            .map_err(|e| SeisError::BadRequest(e.to_string()))?;
        Ok(Self {
            pattern,
            start,
            end,
        })
    }
}

/// A request: ordered sub-queries plus any options it carried
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub sub_queries: Vec<SubQuery>,
    /// `key=value` options; accepted and passed through, none change selection
    pub options: BTreeMap<String, String>,
}

impl Query {
    pub fn new(sub_queries: Vec<SubQuery>) -> Self {
        Self {
            sub_queries,
            options: BTreeMap::new(),
        }
    }

    /// Parse GET parameters (long or short FDSN names)
    ///
    /// Identity fields default to `*`; start and end are required.
    pub fn from_params<'a, I>(params: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut fields = ["*", "*", "*", "*"];
        let mut start = None;
        let mut end = None;
        let mut options = BTreeMap::new();

        for (name, value) in params {
            match name {
                "network" | "net" => fields[0] = value,
                "station" | "sta" => fields[1] = value,
                "location" | "loc" => fields[2] = value,
                "channel" | "cha" => fields[3] = value,
                "starttime" | "start" => start = Some(parse_time(value)?),
                "endtime" | "end" => end = Some(parse_time(value)?),
                other => {
                    options.insert(other.to_string(), value.to_string());
                }
            }
        }

        let start = start.ok_or_else(|| SeisError::BadRequest("missing starttime".into()))?;
        let end = end.ok_or_else(|| SeisError::BadRequest("missing endtime".into()))?;

        Ok(Self {
            sub_queries: vec![SubQuery::new(fields, start, end)?],
            options,
        })
    }

    /// Parse a POST body
    pub fn parse_post(body: &str) -> Result<Self> {
        let mut query = Query::default();

        for (number, raw) in body.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                query
                    .options
                    .insert(key.trim().to_string(), value.trim().to_string());
                continue;
            }

            let tokens: Vec<&str> = line.split_whitespace().collect();
            let &[network, station, location, channel, start, end] = tokens.as_slice() else {
                return Err(SeisError::BadRequest(format!(
                    "line {}: expected 6 fields (NET STA LOC CHA START END), got {}",
                    number + 1,
                    tokens.len()
                )));
            };
            let sub = SubQuery::new(
                [network, station, location, channel],
                parse_time(start)?,
                parse_time(end)?,
            )
            .map_err(|e| SeisError::BadRequest(format!("line {}: {}", number + 1, e)))?;
            query.sub_queries.push(sub);
        }

        if query.sub_queries.is_empty() {
            return Err(SeisError::BadRequest("request has no selection lines".into()));
        }
        Ok(query)
    }
}

/// Parse an FDSN time: RFC 3339, naive `YYYY-MM-DDTHH:MM:SS[.f]` (UTC) or a bare date
pub fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Ok(t.with_timezone(&Utc));
    }
    let naive = value.trim_end_matches('Z');
    if let Ok(t) = NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(t.and_utc());
    }
    if let Ok(day) = NaiveDate::parse_from_str(naive, "%Y-%m-%d") {
        return Ok(day.and_time(chrono::NaiveTime::MIN).and_utc());
    }
    Err(SeisError::BadRequest(format!("invalid time: {:?}", value)))
}
