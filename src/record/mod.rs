//! Record Module
//!
//! Codec for fixed-size miniSEED (v2) records.
//!
//! ## Responsibilities
//! - Decode the fixed header: identity, start time, sample count, rate
//! - Walk blockettes 1000 (record length) and 1001 (microseconds)
//! - Encode headers for ingestion tooling and fixtures
//! - Iterate the records of a buffer of concatenated blocks
//!
//! ## Fixed Header Layout (48 bytes)
//! ```text
//! ┌────────────┬─────────┬──────────┬─────────┬──────────┬─────────┐
//! │ Seq (6)    │ Qual(1) │ Rsvd (1) │ Sta (5) │ Loc (2)  │ Cha (3) │
//! ├────────────┼─────────┴──────────┴─────────┴──────────┴─────────┤
//! │ Net (2)    │ BTIME (10): year, doy, h, m, s, pad, 1e-4 s       │
//! ├────────────┼──────────────┬──────────────┬──────────────────────┤
//! │ Samples(2) │ RateFact (2) │ RateMult (2) │ Flags act/io/dq (3)  │
//! ├────────────┼──────────────┼──────────────┼──────────────────────┤
//! │ NBlkt (1)  │ TimeCorr (4) │ DataOff (2)  │ FirstBlkt (2)        │
//! └────────────┴──────────────┴──────────────┴──────────────────────┘
//! ```

mod header;
mod iter;

pub use header::RecordHeader;
pub use iter::{records, RecordIter};

/// Size of every record served by this crate
pub const RECORD_LEN: usize = 512;

/// Length of the fixed section of the header
pub const FIXED_HEADER_LEN: usize = 48;

/// Blockette carrying encoding, byte order and record length
pub(crate) const BLOCKETTE_1000: u16 = 1000;

/// Blockette carrying the microsecond start-time offset
pub(crate) const BLOCKETTE_1001: u16 = 1001;

/// Activity flag bit: time correction already applied
pub(crate) const TIME_CORRECTION_APPLIED: u8 = 0x02;
