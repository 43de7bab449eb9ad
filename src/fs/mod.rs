use std::{
    cell::RefCell,
    collections::HashMap,
    io::{self, Read, Seek},
    rc::Rc,
};

use anyhow::bail;

mod os;

pub use os::{OsDir, OsFile};

pub trait DbFile: std::fmt::Debug + Read + Seek {
    /// Writes all of `buf` at the current position.
    fn write(&mut self, buf: &[u8]) -> anyhow::Result<()>;
    fn sync(&mut self) -> anyhow::Result<()>;
    fn len(&self) -> anyhow::Result<u64>;
}

/// A fresh name for a temporary file that will be renamed over `base`.
/// Discovery ignores anything ending in `.tmp`, so a crash can only ever leave
/// an orphan behind.
pub fn tmp_name(base: &str) -> String {
    format!("{}.{:08x}.tmp", base, rand::random::<u32>())
}

/// A flat directory of files. Names passed in are plain file names, never
/// nested paths.
pub trait DbDir: Clone {
    type DbFile: DbFile;

    fn unlink(&mut self, fname: &str) -> anyhow::Result<bool>;

    fn ls(&mut self) -> anyhow::Result<Vec<String>>;

    /// Creates a new, empty file opened for reading and writing. Returns
    /// `None` if the name is already taken.
    fn create(&mut self, fname: &str) -> anyhow::Result<Option<Self::DbFile>>;

    fn open(&mut self, fname: &str) -> anyhow::Result<Option<Self::DbFile>>;

    /// Replaces `to` with `from` if `to` exists.
    fn rename(&mut self, from: &str, to: &str) -> anyhow::Result<()>;
}

// Mock Implementation
#[derive(Default, Debug)]
struct MockData {
    synced: Vec<u8>,
    unsynced: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct MockFile {
    idx: usize,
    pub file_id: FileId,
    fs: Rc<RefCell<MockFs>>,
}

impl MockFile {
    #[allow(unused)]
    pub fn read_all(&self) -> Vec<u8> {
        (*self.fs).borrow().data[self.file_id].unsynced.clone()
    }

    #[allow(unused)]
    fn read_all_synced(&self) -> Vec<u8> {
        (*self.fs).borrow().data[self.file_id].synced.clone()
    }
}

impl Seek for MockFile {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let target = match pos {
            io::SeekFrom::Start(i) => i as i64,
            io::SeekFrom::End(i) => self.read_all().len() as i64 + i,
            io::SeekFrom::Current(i) => self.idx as i64 + i,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of file",
            ));
        }
        self.idx = target as usize;
        Ok(self.idx as u64)
    }
}

impl Read for MockFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let fs = (*self.fs).borrow();
        let data = &fs.data[self.file_id].unsynced;
        if self.idx >= data.len() {
            return Ok(0);
        }
        let min_len = std::cmp::min(data.len() - self.idx, buf.len());
        buf[..min_len].copy_from_slice(&data[self.idx..self.idx + min_len]);
        self.idx += min_len;
        Ok(min_len)
    }
}

impl DbFile for MockFile {
    fn write(&mut self, buf: &[u8]) -> anyhow::Result<()> {
        (*self.fs)
            .borrow_mut()
            .write(self.file_id, self.idx, buf.to_vec())?;
        self.idx += buf.len();

        Ok(())
    }

    fn sync(&mut self) -> anyhow::Result<()> {
        (*self.fs).borrow_mut().sync(self.file_id)?;
        Ok(())
    }

    fn len(&self) -> anyhow::Result<u64> {
        Ok((*self.fs).borrow().data[self.file_id].unsynced.len() as u64)
    }
}

#[derive(Clone, Debug)]
pub struct MockDir {
    pub fs: Rc<RefCell<MockFs>>,
    prefix: String,
}

impl MockDir {
    #[allow(unused)]
    pub fn new() -> Self {
        MockDir {
            fs: Rc::new(RefCell::new(MockFs::new())),
            prefix: String::new(),
        }
    }

    /// A view of the subdirectory `dir_name` sharing the same filesystem.
    #[allow(unused)]
    pub fn cd(&self, dir_name: &str) -> Self {
        MockDir {
            fs: self.fs.clone(),
            prefix: self.full_path(dir_name),
        }
    }

    fn full_path(&self, fname: &str) -> String {
        if self.prefix.is_empty() {
            fname.to_owned()
        } else {
            format!("{}/{}", self.prefix, fname)
        }
    }
}

impl Default for MockDir {
    fn default() -> Self {
        Self::new()
    }
}

impl DbDir for MockDir {
    type DbFile = MockFile;

    fn unlink(&mut self, fname: &str) -> anyhow::Result<bool> {
        (*self.fs).borrow_mut().unlink(&self.full_path(fname))
    }

    fn ls(&mut self) -> anyhow::Result<Vec<String>> {
        let mut fs = (*self.fs).borrow_mut();
        let mut fnames: Vec<String> = fs
            .names
            .keys()
            .filter_map(|f| {
                if self.prefix.is_empty() {
                    Some(f.as_str())
                } else {
                    f.strip_prefix(self.prefix.as_str())
                        .and_then(|rest| rest.strip_prefix('/'))
                }
            })
            .filter(|f| !f.contains('/'))
            .map(str::to_owned)
            .collect();
        fnames.sort();
        fs.record(Event::Ls(fnames.clone()));
        Ok(fnames)
    }

    fn create(&mut self, fname: &str) -> anyhow::Result<Option<Self::DbFile>> {
        Ok((*self.fs)
            .borrow_mut()
            .create(&self.full_path(fname))?
            .map(|file_id| MockFile {
                fs: self.fs.clone(),
                file_id,
                idx: 0,
            }))
    }

    fn open(&mut self, fname: &str) -> anyhow::Result<Option<Self::DbFile>> {
        Ok((*self.fs)
            .borrow_mut()
            .open(&self.full_path(fname))
            .map(|file_id| MockFile {
                fs: self.fs.clone(),
                file_id,
                idx: 0,
            }))
    }

    fn rename(&mut self, from: &str, to: &str) -> anyhow::Result<()> {
        (*self.fs)
            .borrow_mut()
            .rename(&self.full_path(from), &self.full_path(to))
    }
}

type FileId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Create(String, FileId),
    Write(FileId, usize, Vec<u8>),
    Sync(FileId),
    Rename(String, String),
    Unlink(String),
    Open(String),
    Ls(Vec<String>),
}

#[derive(Debug)]
pub struct MockFs {
    names: HashMap<String, FileId>,
    data: Vec<MockData>,
    events: Vec<Event>,

    // After this many "things happen," "crash" the FS, meaning stop accepting
    // writes and discard any unsynced data.
    time_to_crash: Option<usize>,
}

impl MockFs {
    fn new() -> Self {
        MockFs {
            names: HashMap::new(),
            data: Vec::new(),
            events: Vec::new(),
            time_to_crash: None,
        }
    }

    fn check_crashed(&self) -> anyhow::Result<()> {
        if self.time_to_crash == Some(0) {
            bail!("filesystem is down")
        } else {
            Ok(())
        }
    }

    #[allow(unused)]
    pub fn schedule_crash(&mut self, ops: usize) {
        self.time_to_crash = Some(ops);
    }

    // Discard all unsynced state, become uncrashed.
    #[allow(unused)]
    pub fn reboot(&mut self) {
        for f in self.data.iter_mut() {
            f.unsynced.clear();
            f.unsynced.extend(&f.synced);
        }
        self.time_to_crash = None;
    }

    fn perform_op(&mut self) -> anyhow::Result<()> {
        self.check_crashed()?;
        if let Some(x) = self.time_to_crash {
            self.time_to_crash = Some(x - 1);
        }
        Ok(())
    }

    fn record(&mut self, e: Event) {
        self.events.push(e);
    }

    #[allow(unused)]
    pub fn iter_events(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    #[allow(unused)]
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}

impl MockFs {
    fn create(&mut self, path: &str) -> anyhow::Result<Option<FileId>> {
        self.perform_op()?;

        if self.names.contains_key(path) {
            return Ok(None);
        }

        let id = self.data.len();
        self.record(Event::Create(path.to_owned(), id));
        self.names.insert(path.to_owned(), id);
        self.data.push(MockData::default());

        Ok(Some(id))
    }

    fn unlink(&mut self, path: &str) -> anyhow::Result<bool> {
        self.perform_op()?;

        self.record(Event::Unlink(path.to_owned()));
        Ok(self.names.remove(path).is_some())
    }

    fn open(&mut self, path: &str) -> Option<FileId> {
        self.record(Event::Open(path.to_owned()));
        self.names.get(path).cloned()
    }

    fn rename(&mut self, from: &str, to: &str) -> anyhow::Result<()> {
        self.perform_op()?;

        self.record(Event::Rename(from.to_owned(), to.to_owned()));

        match self.names.remove(from) {
            Some(d) => {
                self.names.insert(to.to_owned(), d);
                Ok(())
            }
            None => bail!("no such file: {}", from),
        }
    }

    fn write(&mut self, file: FileId, idx: usize, data: Vec<u8>) -> anyhow::Result<()> {
        self.perform_op()?;

        let end = idx + data.len();
        let contents = &mut self.data[file].unsynced;
        if contents.len() < end {
            contents.resize(end, 0);
        }
        contents[idx..end].copy_from_slice(&data);

        self.record(Event::Write(file, idx, data));
        Ok(())
    }

    fn sync(&mut self, file: FileId) -> anyhow::Result<()> {
        self.perform_op()?;

        self.record(Event::Sync(file));
        let d = &mut self.data[file];
        d.synced = d.unsynced.clone();

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::io::{Read, Seek, SeekFrom};

    use super::{DbDir, DbFile, Event, MockDir};

    #[test]
    fn test_mock_file() -> anyhow::Result<()> {
        let mut dir = MockDir::new();

        let mut a = dir.create("a")?.unwrap();

        a.write(&[1, 2, 3, 4]).unwrap();

        assert_eq!(Vec::<u8>::new(), a.read_all_synced());
        assert_eq!(vec![1, 2, 3, 4], a.read_all());

        a.sync().unwrap();

        assert_eq!(vec![1, 2, 3, 4], a.read_all_synced());
        assert_eq!(vec![1, 2, 3, 4], a.read_all());

        Ok(())
    }

    #[test]
    fn test_overwrite_in_the_middle() -> anyhow::Result<()> {
        let mut dir = MockDir::new();
        let mut a = dir.create("a")?.unwrap();
        a.write(b"abcdef")?;
        a.seek(SeekFrom::Start(2))?;
        a.write(b"XY")?;
        assert_eq!(b"abXYef".to_vec(), a.read_all());
        assert_eq!(6, a.len()?);

        let mut buf = [0_u8; 3];
        a.seek(SeekFrom::Start(3))?;
        a.read_exact(&mut buf)?;
        assert_eq!(b"Yef", &buf);

        Ok(())
    }

    #[test]
    fn test_crash_discards_unsynced() -> anyhow::Result<()> {
        let mut dir = MockDir::new();
        let mut a = dir.create("a")?.unwrap();
        a.write(b"durable")?;
        a.sync()?;

        (*dir.fs).borrow_mut().schedule_crash(1);
        a.write(b"!")?;
        assert!(a.sync().is_err());

        (*dir.fs).borrow_mut().reboot();
        let a = dir.open("a")?.unwrap();
        assert_eq!(b"durable".to_vec(), a.read_all());

        Ok(())
    }

    #[test]
    fn test_subdirectories() -> anyhow::Result<()> {
        let root = MockDir::new();
        let mut people = root.cd("people");
        let mut pets = root.cd("pets");

        people.create("people.data")?.unwrap();
        pets.create("pets.data")?.unwrap();
        assert!(people.create("people.data")?.is_none());

        assert_eq!(vec!["people.data".to_owned()], people.ls()?);
        people.rename("people.data", "renamed.data")?;
        assert_eq!(vec!["renamed.data".to_owned()], people.ls()?);
        assert_eq!(vec!["pets.data".to_owned()], pets.ls()?);

        let events = (*root.fs).borrow_mut().take_events();
        assert!(events.contains(&Event::Rename(
            "people/people.data".to_owned(),
            "people/renamed.data".to_owned()
        )));

        Ok(())
    }
}
