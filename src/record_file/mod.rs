use std::io::{Read, Seek, SeekFrom};

use crate::{
    config::StoreConfig,
    encoding,
    fs::{tmp_name, DbDir, DbFile},
    schema::{Record, Schema},
    Error, Result,
};

// Rewrites buffer this many bytes before handing them to the file.
const FLUSH_SIZE: usize = 64 * 1024;

/// Writes a fresh data file in which every record is followed by one blank
/// slot, after a single leading blank slot.
struct SpacedWriter<F: DbFile> {
    file: F,
    schema: Schema,
    buf: Vec<u8>,
    records: usize,
}

impl<F: DbFile> SpacedWriter<F> {
    fn new(file: F, schema: Schema) -> Self {
        let mut buf = Vec::with_capacity(FLUSH_SIZE + schema.line_size() * 2);
        encoding::encode_blank(&schema, &mut buf);
        SpacedWriter {
            file,
            schema,
            buf,
            records: 0,
        }
    }

    // Returns the slot the record was written to.
    fn push(&mut self, record: &Record) -> Result<usize> {
        encoding::encode(&self.schema, record, &mut self.buf)?;
        encoding::encode_blank(&self.schema, &mut self.buf);
        self.records += 1;
        if self.buf.len() >= FLUSH_SIZE {
            self.flush()?;
        }
        Ok(self.records * 2 - 1)
    }

    fn flush(&mut self) -> Result<()> {
        self.file.write(&self.buf)?;
        self.buf.clear();
        Ok(())
    }

    // Returns the number of slots written.
    fn finish(mut self) -> Result<usize> {
        self.flush()?;
        self.file.sync()?;
        Ok(self.records * 2 + 1)
    }
}

/// Slot-addressed access to a store's data file.
///
/// Slot `i` occupies bytes `[i * line_size, (i + 1) * line_size)`. The file
/// handle is held for as long as the `RecordFile` lives.
#[derive(Debug)]
pub struct RecordFile<D: DbDir> {
    dir: D,
    config: StoreConfig,
    file: D::DbFile,
    line: Vec<u8>,
}

impl<D: DbDir> RecordFile<D> {
    /// Writes a new data file and config for `records`, which must already be
    /// in strictly ascending key order.
    pub fn create(mut dir: D, name: &str, schema: Schema, records: &[Record]) -> Result<StoreConfig> {
        let mut config = StoreConfig::new(name, schema, 0);
        let data_name = config.data_file_name();
        if dir.ls()?.contains(&data_name) {
            return Err(Error::AlreadyInitialized);
        }

        let tmp_path = tmp_name(&data_name);
        let file = dir
            .create(&tmp_path)?
            .ok_or_else(|| anyhow::anyhow!("temporary file {} already exists", tmp_path))?;
        let mut writer = SpacedWriter::new(file, config.schema.clone());
        for record in records {
            writer.push(record)?;
        }
        config.num_slots = writer.finish()?;
        dir.rename(&tmp_path, &data_name)?;
        config.save(&mut dir)?;

        Ok(config)
    }

    pub fn open(mut dir: D, config: StoreConfig) -> Result<Self> {
        let file = dir
            .open(&config.data_file_name())?
            .ok_or(Error::NoFilesFound)?;

        let line_size = config.schema.line_size();
        let expected = (config.num_slots * line_size) as u64;
        let actual = file.len()?;
        if actual != expected {
            return Err(Error::ConfigMismatch(format!(
                "{} is {} bytes but {} slots of {} bytes are configured",
                config.data_file_name(),
                actual,
                config.num_slots,
                line_size
            )));
        }

        Ok(RecordFile {
            dir,
            config,
            file,
            line: vec![0; line_size],
        })
    }

    /// Releases the file handle.
    pub fn close(self) -> StoreConfig {
        self.config
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn schema(&self) -> &Schema {
        &self.config.schema
    }

    pub fn num_slots(&self) -> usize {
        self.config.num_slots
    }

    pub fn line_size(&self) -> usize {
        self.line.len()
    }

    fn seek_to(&mut self, index: usize) -> Result<()> {
        if index >= self.config.num_slots {
            return Err(Error::OutOfRange {
                index,
                num_slots: self.config.num_slots,
            });
        }
        self.file
            .seek(SeekFrom::Start((index * self.line.len()) as u64))?;
        Ok(())
    }

    /// Reads slot `index`, returning `None` if it is blank.
    pub fn read(&mut self, index: usize) -> Result<Option<Record>> {
        self.seek_to(index)?;
        self.file.read_exact(&mut self.line)?;
        encoding::decode(&self.config.schema, &self.line)
            .map_err(|reason| Error::CorruptSlot { index, reason })
    }

    /// Overwrites slot `index`. The record is encoded before anything is
    /// written, so a rejected record leaves the slot as it was.
    pub fn write(&mut self, index: usize, record: &Record) -> Result<()> {
        let mut buf = Vec::with_capacity(self.line.len());
        encoding::encode(&self.config.schema, record, &mut buf)?;
        self.seek_to(index)?;
        self.file.write(&buf)?;
        self.file.sync()?;
        Ok(())
    }

    pub fn write_blank(&mut self, index: usize) -> Result<()> {
        self.write(index, &Record::blank(self.config.schema.len()))
    }

    /// Regenerates the data file with `record` placed before the first record
    /// whose key is greater than its own, and exactly one blank slot between
    /// neighbouring records. Returns the slot `record` now occupies.
    ///
    /// The new file is written under a temporary name and renamed over the old
    /// one; until that rename the old file is untouched.
    pub fn rewrite_with_insertion(&mut self, record: &Record) -> Result<usize> {
        let key = record.key()?;
        encoding::validate(&self.config.schema, record)?;

        let data_name = self.config.data_file_name();
        let tmp_path = tmp_name(&data_name);
        let file = self
            .dir
            .create(&tmp_path)?
            .ok_or_else(|| anyhow::anyhow!("temporary file {} already exists", tmp_path))?;
        let mut writer = SpacedWriter::new(file, self.config.schema.clone());

        let mut inserted_at = None;
        for i in 0..self.config.num_slots {
            if let Some(existing) = self.read(i)? {
                if inserted_at.is_none() && existing.key()? > key {
                    inserted_at = Some(writer.push(record)?);
                }
                writer.push(&existing)?;
            }
        }
        let inserted_at = match inserted_at {
            Some(slot) => slot,
            None => writer.push(record)?,
        };
        let num_slots = writer.finish()?;

        self.dir.rename(&tmp_path, &data_name)?;
        self.file = self.dir.open(&data_name)?.ok_or(Error::NoFilesFound)?;
        self.config.num_slots = num_slots;
        self.config.save(&mut self.dir)?;

        Ok(inserted_at)
    }
}
