//! Record Header
//!
//! Decoding and encoding of the miniSEED fixed header and the two
//! blockettes that matter for time-window serving.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};

use crate::error::{Result, SeisError};
use crate::identity::{RecordKey, StreamIdentity};

use super::{
    BLOCKETTE_1000, BLOCKETTE_1001, FIXED_HEADER_LEN, RECORD_LEN, TIME_CORRECTION_APPLIED,
};

/// Offset of the first blockette written by `encode`
const ENCODED_FIRST_BLOCKETTE: u16 = FIXED_HEADER_LEN as u16;

/// Offset of the sample payload written by `encode` (header + two blockettes)
const ENCODED_DATA_OFFSET: u16 = 64;

/// Decoded header fields of one fixed-size record
#[derive(Debug, Clone, PartialEq)]
pub struct RecordHeader {
    /// Sequence number from the header (not the ordinal position in a file)
    pub sequence: u32,
    /// Data quality indicator: D, R, Q or M
    pub quality: u8,
    pub identity: StreamIdentity,
    /// Time of the first sample
    pub start: DateTime<Utc>,
    pub sample_count: u16,
    /// Samples per second (0 for non-waveform records)
    pub sample_rate: f64,
    /// Payload encoding from blockette 1000
    pub encoding: u8,
}

impl RecordHeader {
    /// Create a header with default quality (`D`) and Steim-2 encoding
    pub fn new(
        identity: StreamIdentity,
        start: DateTime<Utc>,
        sample_count: u16,
        sample_rate: f64,
    ) -> Self {
        Self {
            sequence: 1,
            quality: b'D',
            identity,
            start,
            sample_count,
            sample_rate,
            encoding: 11,
        }
    }

    /// Time of the last sample in the record
    pub fn end(&self) -> DateTime<Utc> {
        if self.sample_count == 0 || self.sample_rate <= 0.0 {
            return self.start;
        }
        let span = (self.sample_count as f64 - 1.0) / self.sample_rate;
        self.start + Duration::nanoseconds((span * 1e9).round() as i64)
    }

    /// Key used to recognise the same record in both tiers
    pub fn key(&self) -> RecordKey {
        RecordKey {
            identity: self.identity.clone(),
            start: self.start,
        }
    }

    /// Decode the header of one fixed-size block
    pub fn decode(block: &[u8]) -> Result<Self> {
        if block.len() < RECORD_LEN {
            return Err(SeisError::MalformedRecord(format!(
                "short block: expected {} bytes, got {}",
                RECORD_LEN,
                block.len()
            )));
        }

        let sequence = parse_sequence(&block[0..6])?;

        let quality = block[6];
        if !matches!(quality, b'D' | b'R' | b'Q' | b'M') {
            return Err(SeisError::MalformedRecord(format!(
                "invalid quality indicator 0x{:02x}",
                quality
            )));
        }

        let identity = StreamIdentity {
            station: ascii_field(&block[8..13]),
            location: ascii_field(&block[13..15]),
            channel: ascii_field(&block[15..18]),
            network: ascii_field(&block[18..20]),
        };

        let fields = Fields {
            block,
            big_endian: detect_big_endian(&block[20..24])?,
        };

        let mut start = btime(
            fields.u16(20),
            fields.u16(22),
            block[24],
            block[25],
            block[26],
            fields.u16(28),
        )?;

        let sample_count = fields.u16(30);
        let sample_rate = decode_rate(fields.i16(32), fields.i16(34));
        let activity = block[36];
        let blockette_count = block[39];
        let correction = fields.i32(40);
        let first_blockette = fields.u16(46) as usize;

        // Walk the blockette chain
        let mut encoding = 0u8;
        let mut offset = first_blockette;
        let mut seen = 0u8;
        while offset != 0 && seen < blockette_count {
            if offset < FIXED_HEADER_LEN || offset + 4 > RECORD_LEN {
                return Err(SeisError::MalformedRecord(format!(
                    "blockette offset {} outside record",
                    offset
                )));
            }
            let kind = fields.u16(offset);
            let next = fields.u16(offset + 2) as usize;

            match kind {
                BLOCKETTE_1000 => {
                    if offset + 8 > RECORD_LEN {
                        return Err(SeisError::MalformedRecord("truncated blockette 1000".into()));
                    }
                    encoding = block[offset + 4];
                    let exponent = block[offset + 6];
                    if exponent >= 31 || (1usize << exponent) != RECORD_LEN {
                        return Err(SeisError::MalformedRecord(format!(
                            "unsupported record length 2^{}",
                            exponent
                        )));
                    }
                }
                BLOCKETTE_1001 => {
                    if offset + 8 > RECORD_LEN {
                        return Err(SeisError::MalformedRecord("truncated blockette 1001".into()));
                    }
                    let micros = block[offset + 5] as i8;
                    start += Duration::microseconds(micros as i64);
                }
                _ => {}
            }

            if next != 0 && next <= offset {
                return Err(SeisError::MalformedRecord(format!(
                    "blockette chain loops back from {} to {}",
                    offset, next
                )));
            }
            offset = next;
            seen += 1;
        }

        // Correction is in units of 0.0001 s
        if activity & TIME_CORRECTION_APPLIED == 0 && correction != 0 {
            start += Duration::microseconds(correction as i64 * 100);
        }

        Ok(Self {
            sequence,
            quality,
            identity,
            start,
            sample_count,
            sample_rate,
            encoding,
        })
    }

    /// Encode a big-endian header with blockettes 1000 and 1001
    ///
    /// The sample payload is left zeroed.
    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut block = [0u8; RECORD_LEN];

        let sequence = format!("{:06}", self.sequence % 1_000_000);
        block[0..6].copy_from_slice(sequence.as_bytes());
        block[6] = self.quality;
        block[7] = b' ';
        put_ascii(&mut block[8..13], &self.identity.station);
        put_ascii(&mut block[13..15], &self.identity.location);
        put_ascii(&mut block[15..18], &self.identity.channel);
        put_ascii(&mut block[18..20], &self.identity.network);

        // BTIME carries 1e-4 s; the remaining microseconds go in blockette 1001
        let t = self.start;
        let nanos = t.nanosecond() % 1_000_000_000;
        let fract = (nanos / 100_000) as u16;
        let micros = ((nanos / 1_000) % 100) as i8;
        block[20..22].copy_from_slice(&(t.year() as u16).to_be_bytes());
        block[22..24].copy_from_slice(&(t.ordinal() as u16).to_be_bytes());
        block[24] = t.hour() as u8;
        block[25] = t.minute() as u8;
        block[26] = t.second() as u8;
        block[28..30].copy_from_slice(&fract.to_be_bytes());

        let (factor, multiplier) = encode_rate(self.sample_rate);
        block[30..32].copy_from_slice(&self.sample_count.to_be_bytes());
        block[32..34].copy_from_slice(&factor.to_be_bytes());
        block[34..36].copy_from_slice(&multiplier.to_be_bytes());
        block[39] = 2;
        block[44..46].copy_from_slice(&ENCODED_DATA_OFFSET.to_be_bytes());
        block[46..48].copy_from_slice(&ENCODED_FIRST_BLOCKETTE.to_be_bytes());

        // Blockette 1000: encoding, big endian, 2^9 = 512
        block[48..50].copy_from_slice(&BLOCKETTE_1000.to_be_bytes());
        block[50..52].copy_from_slice(&56u16.to_be_bytes());
        block[52] = self.encoding;
        block[53] = 1;
        block[54] = RECORD_LEN.trailing_zeros() as u8;

        // Blockette 1001: microsecond offset
        block[56..58].copy_from_slice(&BLOCKETTE_1001.to_be_bytes());
        block[58..60].copy_from_slice(&0u16.to_be_bytes());
        block[61] = micros as u8;
        block[63] = ((RECORD_LEN - ENCODED_DATA_OFFSET as usize) / 64) as u8;

        block
    }
}

// =============================================================================
// Private Helpers
// =============================================================================

/// Fixed header accessor honouring the detected byte order
struct Fields<'a> {
    block: &'a [u8],
    big_endian: bool,
}

impl Fields<'_> {
    fn u16(&self, at: usize) -> u16 {
        let raw = [self.block[at], self.block[at + 1]];
        if self.big_endian {
            u16::from_be_bytes(raw)
        } else {
            u16::from_le_bytes(raw)
        }
    }

    fn i16(&self, at: usize) -> i16 {
        self.u16(at) as i16
    }

    fn i32(&self, at: usize) -> i32 {
        let raw = [
            self.block[at],
            self.block[at + 1],
            self.block[at + 2],
            self.block[at + 3],
        ];
        if self.big_endian {
            i32::from_be_bytes(raw)
        } else {
            i32::from_le_bytes(raw)
        }
    }
}

fn parse_sequence(raw: &[u8]) -> Result<u32> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| SeisError::MalformedRecord("sequence number is not ASCII".into()))?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    trimmed
        .parse()
        .map_err(|_| SeisError::MalformedRecord(format!("invalid sequence number {:?}", text)))
}

fn ascii_field(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_matches(|c: char| c == ' ' || c == '\0')
        .to_string()
}

fn put_ascii(dest: &mut [u8], value: &str) {
    dest.fill(b' ');
    for (slot, byte) in dest.iter_mut().zip(value.bytes()) {
        *slot = byte;
    }
}

fn plausible(year: u16, day: u16) -> bool {
    (1900..=2100).contains(&year) && (1..=366).contains(&day)
}

/// Headers are written big endian by most producers; fall back to little endian
fn detect_big_endian(btime: &[u8]) -> Result<bool> {
    let be = (
        u16::from_be_bytes([btime[0], btime[1]]),
        u16::from_be_bytes([btime[2], btime[3]]),
    );
    if plausible(be.0, be.1) {
        return Ok(true);
    }
    let le = (
        u16::from_le_bytes([btime[0], btime[1]]),
        u16::from_le_bytes([btime[2], btime[3]]),
    );
    if plausible(le.0, le.1) {
        return Ok(false);
    }
    Err(SeisError::MalformedRecord(
        "start time year/day out of range in either byte order".into(),
    ))
}

fn btime(year: u16, day: u16, hour: u8, minute: u8, second: u8, fract: u16) -> Result<DateTime<Utc>> {
    if hour > 23 || minute > 59 || second > 60 || fract > 9999 {
        return Err(SeisError::MalformedRecord(format!(
            "invalid start time {:02}:{:02}:{:02}.{:04}",
            hour, minute, second, fract
        )));
    }
    let date = NaiveDate::from_yo_opt(year as i32, day as u32).ok_or_else(|| {
        SeisError::MalformedRecord(format!("invalid day-of-year {}/{}", year, day))
    })?;
    // Leap second 60 rolls into the next minute
    let naive = date
        .and_hms_opt(hour as u32, minute as u32, second.min(59) as u32)
        .ok_or_else(|| SeisError::MalformedRecord("invalid start time".into()))?;
    let mut start = naive.and_utc();
    if second == 60 {
        start += Duration::seconds(1);
    }
    Ok(start + Duration::microseconds(fract as i64 * 100))
}

fn decode_rate(factor: i16, multiplier: i16) -> f64 {
    let (f, m) = (factor as f64, multiplier as f64);
    if factor == 0 || multiplier == 0 {
        0.0
    } else if factor > 0 && multiplier > 0 {
        f * m
    } else if factor > 0 {
        -f / m
    } else if multiplier > 0 {
        -m / f
    } else {
        1.0 / (f * m)
    }
}

fn encode_rate(rate: f64) -> (i16, i16) {
    if rate <= 0.0 {
        return (0, 0);
    }
    if rate >= 1.0 && rate.fract() == 0.0 && rate <= i16::MAX as f64 {
        return (rate as i16, 1);
    }
    let period = 1.0 / rate;
    if rate < 1.0 && (period - period.round()).abs() < 1e-9 && period <= i16::MAX as f64 {
        return (-(period.round() as i16), 1);
    }
    // Two decimal places of precision: factor / 100
    let scaled = (rate * 100.0).round().min(i16::MAX as f64) as i16;
    (scaled, -100)
}
