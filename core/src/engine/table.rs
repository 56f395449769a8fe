// Copyright (c) 2022-2023 The MobileCoin Foundation

use cardvault_apdu::record::{RecordKey, MESSAGE_LEN};

use super::Error;

/// Number of record slots
pub const NUM_SLOTS: usize = 100;

#[derive(Copy, Clone)]
struct Record {
    key: RecordKey,
    message: [u8; MESSAGE_LEN],
    in_use: bool,
}

impl Record {
    const EMPTY: Record = Record {
        key: RecordKey {
            user_hash: [0u8; 32],
            address: [0u8; 20],
        },
        message: [0u8; MESSAGE_LEN],
        in_use: false,
    };
}

/// Fixed capacity record table
///
/// Deleting a record clears the in-use flag only, record bytes remain until
/// the slot is next written. Free slots are claimed lowest-first following
/// a delete, otherwise scanning forward (with wrap-around) from the last
/// allocation.
pub struct Table {
    records: [Record; NUM_SLOTS],
    total: u8,
    /// First candidate free slot, `None` when the table is full
    next_free: Option<usize>,
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

impl Table {
    /// Create a new (empty) table
    pub const fn new() -> Self {
        Self {
            records: [Record::EMPTY; NUM_SLOTS],
            total: 0,
            next_free: Some(0),
        }
    }

    /// Number of records in use
    pub fn total(&self) -> u8 {
        self.total
    }

    /// Store a record, overwriting the message in place where the key exists,
    /// returning `(slot, total)`
    pub fn store(
        &mut self,
        key: &RecordKey,
        message: &[u8; MESSAGE_LEN],
    ) -> Result<(u8, u8), Error> {
        // Overwrite existing record
        if let Some(slot) = self.find(key) {
            self.records[slot].message = *message;
            return Ok((slot as u8, self.total));
        }

        // Otherwise claim a free slot
        let slot = match self.next_free {
            Some(hint) if (self.total as usize) < NUM_SLOTS => {
                self.scan_free(hint).ok_or(Error::Full)?
            }
            _ => return Err(Error::Full),
        };

        self.records[slot] = Record {
            key: *key,
            message: *message,
            in_use: true,
        };
        self.total += 1;

        // Update free slot hint
        self.next_free = self.scan_free(slot);

        Ok((slot as u8, self.total))
    }

    /// Read the message for a key
    pub fn read(&self, key: &RecordKey) -> Result<[u8; MESSAGE_LEN], Error> {
        let slot = self.find(key).ok_or(Error::NotFound)?;

        Ok(self.records[slot].message)
    }

    /// Delete the record for a key, returning `(slot, total)`
    pub fn delete(&mut self, key: &RecordKey) -> Result<(u8, u8), Error> {
        let slot = self.find(key).ok_or(Error::NotFound)?;

        self.records[slot].in_use = false;
        self.total -= 1;

        // Freed slots below the hint are reused first
        match self.next_free {
            Some(n) if n <= slot => (),
            _ => self.next_free = Some(slot),
        }

        Ok((slot as u8, self.total))
    }

    /// Locate the in-use record for a key
    fn find(&self, key: &RecordKey) -> Option<usize> {
        self.records
            .iter()
            .position(|r| r.in_use && r.key == *key)
    }

    /// Scan for a free slot from `start`, wrapping around
    fn scan_free(&self, start: usize) -> Option<usize> {
        (start..NUM_SLOTS)
            .chain(0..start)
            .find(|i| !self.records[*i].in_use)
    }
}
