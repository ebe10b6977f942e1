//! Record Iterator
//!
//! Sequential iteration over a buffer of concatenated fixed-size records.

use crate::error::{Result, SeisError};

use super::{RecordHeader, RECORD_LEN};

/// Iterator over `(byte offset, header)` pairs in buffer order
///
/// Stops after the first error; a trailing partial record is an error.
pub struct RecordIter<'a> {
    data: &'a [u8],
    /// Current position in the buffer
    offset: usize,
}

impl<'a> RecordIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }
}

impl<'a> Iterator for RecordIter<'a> {
    type Item = Result<(usize, RecordHeader)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.data.len() {
            return None;
        }

        let offset = self.offset;
        let remaining = self.data.len() - offset;
        if remaining < RECORD_LEN {
            self.offset = self.data.len();
            return Some(Err(SeisError::MalformedRecord(format!(
                "trailing partial record of {} bytes at offset {}",
                remaining, offset
            ))));
        }

        match RecordHeader::decode(&self.data[offset..offset + RECORD_LEN]) {
            Ok(header) => {
                self.offset += RECORD_LEN;
                Some(Ok((offset, header)))
            }
            Err(e) => {
                self.offset = self.data.len();
                Some(Err(e))
            }
        }
    }
}

/// Iterate the records of a buffer
pub fn records(data: &[u8]) -> RecordIter<'_> {
    RecordIter::new(data)
}
