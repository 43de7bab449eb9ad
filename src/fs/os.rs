use std::{
    fs::{self, File, OpenOptions},
    io::{self, Read, Seek, Write},
    path::{Path, PathBuf},
};

use super::{DbDir, DbFile};

/// A real directory on the local filesystem.
#[derive(Clone, Debug)]
pub struct OsDir {
    path: PathBuf,
}

impl OsDir {
    /// Uses `path` as the directory, creating it if it does not exist.
    pub fn new<P>(path: P) -> anyhow::Result<Self>
    where
        P: Into<PathBuf>,
    {
        let path = path.into();
        fs::create_dir_all(&path)?;
        Ok(OsDir { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DbDir for OsDir {
    type DbFile = OsFile;

    fn unlink(&mut self, fname: &str) -> anyhow::Result<bool> {
        match fs::remove_file(self.path.join(fname)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn ls(&mut self) -> anyhow::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn create(&mut self, fname: &str) -> anyhow::Result<Option<Self::DbFile>> {
        match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(self.path.join(fname))
        {
            Ok(file) => Ok(Some(OsFile { file })),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn open(&mut self, fname: &str) -> anyhow::Result<Option<Self::DbFile>> {
        match OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.path.join(fname))
        {
            Ok(file) => Ok(Some(OsFile { file })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn rename(&mut self, from: &str, to: &str) -> anyhow::Result<()> {
        // TODO: fsync the directory so the rename itself survives a power loss.
        fs::rename(self.path.join(from), self.path.join(to))?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct OsFile {
    file: File,
}

impl Read for OsFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for OsFile {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl DbFile for OsFile {
    fn write(&mut self, buf: &[u8]) -> anyhow::Result<()> {
        self.file.write_all(buf)?;
        Ok(())
    }

    fn sync(&mut self) -> anyhow::Result<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    fn len(&self) -> anyhow::Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

#[cfg(test)]
mod test {
    use std::io::{Read, Seek, SeekFrom};

    use super::OsDir;
    use crate::fs::{DbDir, DbFile};

    #[test]
    fn test_os_dir() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let mut dir = OsDir::new(tmp.path().join("store"))?;

        let mut f = dir.create("a.data")?.unwrap();
        f.write(b"hello world")?;
        f.sync()?;
        assert!(dir.create("a.data")?.is_none());
        assert!(dir.open("missing")?.is_none());

        dir.rename("a.data", "b.data")?;
        assert_eq!(vec!["b.data".to_owned()], dir.ls()?);

        let mut f = dir.open("b.data")?.unwrap();
        assert_eq!(11, f.len()?);
        f.seek(SeekFrom::Start(6))?;
        let mut buf = String::new();
        f.read_to_string(&mut buf)?;
        assert_eq!("world", buf);

        assert!(dir.unlink("b.data")?);
        assert!(!dir.unlink("b.data")?);

        Ok(())
    }
}
