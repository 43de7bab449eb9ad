use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};

use crate::{
    config::validate_store_name,
    fs::OsDir,
    import::Table,
    store::{SortedRecordStore, StoreState},
    Error, Result,
};

/// A directory of stores, one per subdirectory, of which at most one is open
/// at a time.
#[derive(Debug)]
pub struct Registry {
    root: PathBuf,
    stores: Vec<SortedRecordStore<OsDir>>,
    current: Option<usize>,
}

impl Registry {
    pub fn new<P: Into<PathBuf>>(root: P) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        let mut entries = Vec::new();
        for entry in fs::read_dir(&root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                entries.push(entry.path());
            }
        }
        entries.sort();

        let mut stores = Vec::new();
        for path in entries {
            match SortedRecordStore::new(OsDir::new(&path)?) {
                Ok(store) if store.state() == StoreState::Closed => {
                    debug!(store = store.name(), path = %path.display(), "found store");
                    stores.push(store);
                }
                Ok(_) => warn!(path = %path.display(), "skipping directory without a store"),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable store"),
            }
        }
        info!(root = %root.display(), stores = stores.len(), "loaded registry");

        Ok(Registry {
            root,
            stores,
            current: None,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn names(&self) -> Vec<&str> {
        self.stores.iter().filter_map(|s| s.name()).collect()
    }

    pub fn stores(&self) -> impl Iterator<Item = &SortedRecordStore<OsDir>> {
        self.stores.iter()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.stores.iter().position(|s| s.name() == Some(name))
    }

    /// Imports `csv_path` as a new store in its own subdirectory. The store is
    /// left closed.
    pub fn create_store<P: AsRef<Path>>(&mut self, name: &str, csv_path: P) -> Result<()> {
        validate_store_name(name)?;
        let path = self.root.join(name);
        if self.position(name).is_some() || path.exists() {
            return Err(Error::DuplicateStoreName(name.to_owned()));
        }
        let table = Table::from_path(csv_path.as_ref())?;

        let mut store = SortedRecordStore::new(OsDir::new(&path)?)?;
        if let Err(e) = store.import_data(name, table) {
            // Leave no half-created directory behind to shadow the name.
            if let Err(cleanup) = fs::remove_dir_all(&path) {
                warn!(
                    path = %path.display(),
                    error = %cleanup,
                    "could not remove directory of failed import; it blocks the name"
                );
            }
            return Err(e);
        }
        info!(
            store = name,
            source = %csv_path.as_ref().display(),
            slots = store.num_slots(),
            "created store"
        );
        self.stores.push(store);
        Ok(())
    }

    pub fn open_store(&mut self, name: &str) -> Result<()> {
        let i = self
            .position(name)
            .ok_or_else(|| Error::UnknownStore(name.to_owned()))?;
        if self.current.is_some() {
            return Err(Error::AlreadyOpen);
        }
        self.stores[i].open()?;
        self.current = Some(i);
        debug!(store = name, "opened store");
        Ok(())
    }

    pub fn close_store(&mut self) -> Result<()> {
        let i = self.current.ok_or(Error::NotOpen)?;
        self.stores[i].close()?;
        self.current = None;
        debug!(store = self.stores[i].name(), "closed store");
        Ok(())
    }

    pub fn current(&self) -> Option<&SortedRecordStore<OsDir>> {
        self.current.map(|i| &self.stores[i])
    }

    pub fn current_mut(&mut self) -> Option<&mut SortedRecordStore<OsDir>> {
        match self.current {
            Some(i) => Some(&mut self.stores[i]),
            None => None,
        }
    }
}
