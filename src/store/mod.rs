use std::ops::{Bound, RangeBounds};

use crate::{
    config::{validate_store_name, StoreConfig},
    encoding,
    fs::DbDir,
    import::Table,
    record_file::RecordFile,
    schema::{Record, Schema},
    Error, Result,
};

use self::search::{locate, next_occupied, Position};

mod search;

#[cfg(test)]
mod model_test;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Uninitialized,
    Closed,
    Open,
}

/// Where an inserted record landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inserted {
    /// Written straight into a blank slot.
    Gap(usize),
    /// No blank slot was free where the record belongs, so the file was
    /// rewritten around it.
    Rewrite(usize),
}

impl Inserted {
    pub fn index(&self) -> usize {
        match self {
            Inserted::Gap(i) | Inserted::Rewrite(i) => *i,
        }
    }
}

#[derive(Debug)]
enum Inner<D: DbDir> {
    Uninitialized,
    Closed(StoreConfig),
    Open(RecordFile<D>),
}

/// A store of records kept in ascending primary-key order within a single
/// data file.
///
/// Non-blank slots are always in strictly ascending key order, with any number
/// of blank slots between them. Every operation finds its position by reading
/// the file; nothing but the schema and slot count is kept in memory.
#[derive(Debug)]
pub struct SortedRecordStore<D: DbDir> {
    dir: D,
    inner: Inner<D>,
}

impl<D: DbDir> SortedRecordStore<D> {
    /// Loads the store kept in `dir`, if there is one. A directory without a
    /// data and config file yields an uninitialized store.
    pub fn new(mut dir: D) -> Result<Self> {
        let inner = match StoreConfig::load(&mut dir) {
            Ok(config) => Inner::Closed(config),
            Err(Error::NoFilesFound) => Inner::Uninitialized,
            Err(e) => return Err(e),
        };
        Ok(SortedRecordStore { dir, inner })
    }

    pub fn state(&self) -> StoreState {
        match self.inner {
            Inner::Uninitialized => StoreState::Uninitialized,
            Inner::Closed(_) => StoreState::Closed,
            Inner::Open(_) => StoreState::Open,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == StoreState::Open
    }

    /// Creates the store's files from `table`. Rows may come in any order;
    /// they are written sorted by key, one blank slot apart.
    pub fn import_data(&mut self, name: &str, table: Table) -> Result<()> {
        if !matches!(self.inner, Inner::Uninitialized) {
            return Err(Error::AlreadyInitialized);
        }
        validate_store_name(name)?;

        let schema = Schema::infer(&table.fields, &table.rows)
            .map_err(|e| Error::InvalidImportSource(e.to_string()))?;

        let mut keyed = Vec::with_capacity(table.rows.len());
        for (i, row) in table.rows.into_iter().enumerate() {
            let record = Record::new(row);
            let key = record.key().map_err(|_| {
                Error::InvalidImportSource(format!(
                    "row {} has invalid primary key {:?}",
                    i + 1,
                    record.get(0).unwrap_or("")
                ))
            })?;
            keyed.push((key, record));
        }
        keyed.sort_by_key(|(key, _)| *key);
        if let Some(pair) = keyed.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(Error::InvalidImportSource(format!(
                "duplicate primary key {}",
                pair[0].0
            )));
        }

        let records: Vec<Record> = keyed.into_iter().map(|(_, record)| record).collect();
        let config = RecordFile::create(self.dir.clone(), name, schema, &records)?;
        self.inner = Inner::Closed(config);
        Ok(())
    }

    pub fn open(&mut self) -> Result<()> {
        let config = match &self.inner {
            Inner::Uninitialized => return Err(Error::Uninitialized),
            Inner::Open(_) => return Err(Error::AlreadyOpen),
            Inner::Closed(config) => config.clone(),
        };
        self.inner = Inner::Open(RecordFile::open(self.dir.clone(), config)?);
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.inner, Inner::Uninitialized) {
            Inner::Open(file) => {
                self.inner = Inner::Closed(file.close());
                Ok(())
            }
            other => {
                self.inner = other;
                Err(Error::NotOpen)
            }
        }
    }

    pub fn config(&self) -> Option<&StoreConfig> {
        match &self.inner {
            Inner::Uninitialized => None,
            Inner::Closed(config) => Some(config),
            Inner::Open(file) => Some(file.config()),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.config().map(|c| c.name.as_str())
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.config().map(|c| &c.schema)
    }

    pub fn fields(&self) -> Vec<&str> {
        self.schema().map(|s| s.names().collect()).unwrap_or_default()
    }

    pub fn num_fields(&self) -> usize {
        self.schema().map_or(0, Schema::len)
    }

    pub fn num_slots(&self) -> Option<usize> {
        self.config().map(|c| c.num_slots)
    }

    fn file(&mut self) -> Result<&mut RecordFile<D>> {
        match &mut self.inner {
            Inner::Open(file) => Ok(file),
            _ => Err(Error::NotOpen),
        }
    }

    /// Reads slot `index`, `None` meaning it is blank.
    pub fn read(&mut self, index: usize) -> Result<Option<Record>> {
        self.file()?.read(index)
    }

    /// Returns the slot and record with primary key `key`.
    pub fn find(&mut self, key: u64) -> Result<(usize, Record)> {
        match locate(self.file()?, key)? {
            Position::Found(index, record) => Ok((index, record)),
            _ => Err(Error::RecordNotFound(key)),
        }
    }

    /// Places `record` in key order. Uses a blank slot where the record
    /// belongs if there is one, and otherwise rewrites the file to make room.
    pub fn insert(&mut self, record: Record) -> Result<Inserted> {
        let file = self.file()?;
        encoding::validate(file.schema(), &record)?;
        let key = record.key()?;

        let n = file.num_slots();
        let gap = match locate(file, key)? {
            Position::Found(..) => return Err(Error::DuplicateKey(key)),
            Position::Empty => (n > 0).then(|| n / 2),
            Position::Before(first) => (first > 0).then_some(0),
            Position::After(last) => (last < n - 1).then(|| n - 1),
            Position::Between(lo, hi) => (hi - lo >= 2).then(|| lo + (hi - lo) / 2),
        };

        match gap {
            Some(index) => {
                file.write(index, &record)?;
                Ok(Inserted::Gap(index))
            }
            None => Ok(Inserted::Rewrite(file.rewrite_with_insertion(&record)?)),
        }
    }

    /// Replaces one non-key field of `record`, which lives in slot `index`,
    /// and returns the record as it now reads back from the file.
    ///
    /// Slot `index` must still hold a record with `record`'s key; anything
    /// else is `RecordNotFound` and nothing is written.
    pub fn update(&mut self, index: usize, record: &Record, field: &str, value: &str) -> Result<Record> {
        let file = self.file()?;
        let schema = file.schema();
        let position = schema
            .position(field)
            .ok_or_else(|| Error::UnknownField(field.to_owned()))?;
        if position == 0 {
            return Err(Error::PrimaryKeyImmutable(field.to_owned()));
        }
        if record.len() != schema.len() {
            return Err(Error::FieldCount {
                expected: schema.len(),
                got: record.len(),
            });
        }

        let key = record.key()?;
        let stored = match file.read(index)? {
            Some(stored) if stored.key()? == key => stored,
            _ => return Err(Error::RecordNotFound(key)),
        };

        file.write(index, &stored.with_value(position, value.to_owned()))?;
        file.read(index)?.ok_or(Error::RecordNotFound(key))
    }

    /// Blanks slot `index`. The file is not compacted.
    pub fn delete(&mut self, index: usize) -> Result<()> {
        self.file()?.write_blank(index)
    }

    /// The first `n` records in key order.
    pub fn scan_first_n(&mut self, n: usize) -> Result<Vec<Record>> {
        let file = self.file()?;
        let num_slots = file.num_slots();
        let mut out = Vec::new();
        let mut from = 0;
        while out.len() < n {
            match next_occupied(file, from..num_slots)? {
                Some((index, record)) => {
                    out.push(record);
                    from = index + 1;
                }
                None => break,
            }
        }
        Ok(out)
    }

    /// Every record whose key falls in `range`, with its slot, in key order.
    pub fn scan_range<R: RangeBounds<u64>>(&mut self, range: R) -> Result<Vec<(usize, Record)>> {
        let file = self.file()?;
        let start = match range.start_bound() {
            Bound::Unbounded => 0,
            Bound::Included(&key) | Bound::Excluded(&key) => match locate(file, key)? {
                Position::Found(index, _) => index,
                Position::Empty | Position::Before(_) => 0,
                Position::After(_) => return Ok(Vec::new()),
                Position::Between(lo, _) => lo + 1,
            },
        };

        let num_slots = file.num_slots();
        let mut out = Vec::new();
        let mut from = start;
        while let Some((index, record)) = next_occupied(file, from..num_slots)? {
            let key = record.key()?;
            let past_end = match range.end_bound() {
                Bound::Unbounded => false,
                Bound::Included(&end) => key > end,
                Bound::Excluded(&end) => key >= end,
            };
            if past_end {
                break;
            }
            if range.contains(&key) {
                out.push((index, record));
            }
            from = index + 1;
        }
        Ok(out)
    }
}
