// Binary search over a file where records are in ascending key order but
// blank slots may sit anywhere between them. A probe that lands on a blank
// slot moves to the nearest record instead of treating the gap as a match.

use std::{cmp::Ordering, ops::Range};

use crate::{fs::DbDir, record_file::RecordFile, schema::Record, Result};

/// Where a key sits relative to the records in a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Position {
    /// Every slot is blank.
    Empty,
    Found(usize, Record),
    /// Sorts before every record; holds the slot of the first record.
    Before(usize),
    /// Sorts after every record; holds the slot of the last record.
    After(usize),
    /// Sorts strictly between the records in these two slots, and every slot
    /// between them is blank.
    Between(usize, usize),
}

/// The first record in `slots`, scanning forward.
pub(crate) fn next_occupied<D: DbDir>(
    file: &mut RecordFile<D>,
    slots: Range<usize>,
) -> Result<Option<(usize, Record)>> {
    for i in slots {
        if let Some(record) = file.read(i)? {
            return Ok(Some((i, record)));
        }
    }
    Ok(None)
}

/// The last record in `slots`, scanning backward.
pub(crate) fn prev_occupied<D: DbDir>(
    file: &mut RecordFile<D>,
    slots: Range<usize>,
) -> Result<Option<(usize, Record)>> {
    for i in slots.rev() {
        if let Some(record) = file.read(i)? {
            return Ok(Some((i, record)));
        }
    }
    Ok(None)
}

pub(crate) fn locate<D: DbDir>(file: &mut RecordFile<D>, key: u64) -> Result<Position> {
    let n = file.num_slots();

    // Check both ends first: inserts at either end are common and need the
    // boundary records anyway.
    let (first, first_record) = match next_occupied(file, 0..n)? {
        Some(found) => found,
        None => return Ok(Position::Empty),
    };
    match key.cmp(&first_record.key()?) {
        Ordering::Equal => return Ok(Position::Found(first, first_record)),
        Ordering::Less => return Ok(Position::Before(first)),
        Ordering::Greater => {}
    }

    let (last, last_record) = match prev_occupied(file, first + 1..n)? {
        Some(found) => found,
        None => return Ok(Position::After(first)),
    };
    match key.cmp(&last_record.key()?) {
        Ordering::Equal => return Ok(Position::Found(last, last_record)),
        Ordering::Greater => return Ok(Position::After(last)),
        Ordering::Less => {}
    }

    // Invariant: lo and hi hold records with key(lo) < key < key(hi).
    let (mut lo, mut hi) = (first, last);
    while hi - lo >= 2 {
        let mid = lo + (hi - lo) / 2;
        let probe = match next_occupied(file, mid..hi)? {
            Some(found) => Some(found),
            None => prev_occupied(file, lo + 1..mid)?,
        };
        let (idx, record) = match probe {
            Some(found) => found,
            // Nothing but gaps between lo and hi.
            None => break,
        };
        match record.key()?.cmp(&key) {
            Ordering::Equal => return Ok(Position::Found(idx, record)),
            Ordering::Greater => hi = idx,
            Ordering::Less => lo = idx,
        }
    }

    Ok(Position::Between(lo, hi))
}
