use std::io::Read;

use crate::{
    fs::{tmp_name, DbDir, DbFile},
    schema::Schema,
    Error, Result,
};

const CONFIG_EXT: &str = ".config";
const DATA_EXT: &str = ".data";

/// The sidecar record stored next to a store's data file:
///
/// ```text
/// <store name>
/// <slot count>
/// <field>:<width>,<field>:<width>,...
/// ```
///
/// It must always describe the data file it sits next to; both are only ever
/// replaced by renaming a fully written temporary file over them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub name: String,
    pub num_slots: usize,
    pub schema: Schema,
}

pub fn config_file_name(name: &str) -> String {
    format!("{}{}", name, CONFIG_EXT)
}

pub fn data_file_name(name: &str) -> String {
    format!("{}{}", name, DATA_EXT)
}

/// Store names become file and directory names.
pub fn validate_store_name(name: &str) -> Result<()> {
    let reserved = |c: char| matches!(c, '/' | '\\' | '\n' | '\r' | '\0');
    if name.is_empty() || name.trim() != name || name.starts_with('.') || name.contains(reserved) {
        return Err(Error::InvalidStoreName(name.to_owned()));
    }
    Ok(())
}

impl StoreConfig {
    pub fn new<S: Into<String>>(name: S, schema: Schema, num_slots: usize) -> Self {
        StoreConfig {
            name: name.into(),
            num_slots,
            schema,
        }
    }

    pub fn config_file_name(&self) -> String {
        config_file_name(&self.name)
    }

    pub fn data_file_name(&self) -> String {
        data_file_name(&self.name)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines().map(str::trim);
        let name = match lines.next() {
            Some(name) if !name.is_empty() => name,
            _ => return Err(Error::ConfigMismatch("missing store name".into())),
        };
        let num_slots = lines
            .next()
            .and_then(|l| l.parse().ok())
            .ok_or_else(|| Error::ConfigMismatch("missing or invalid slot count".into()))?;
        let schema = lines
            .next()
            .ok_or_else(|| Error::ConfigMismatch("missing schema".into()))
            .and_then(|l| {
                Schema::parse(l).map_err(|e| Error::ConfigMismatch(e.to_string()))
            })?;
        Ok(StoreConfig::new(name, schema, num_slots))
    }

    pub fn render(&self) -> String {
        format!("{}\n{}\n{}\n", self.name, self.num_slots, self.schema)
    }

    /// Finds the single `<name>.config`/`<name>.data` pair in `dir` and reads
    /// the config.
    pub fn load<D: DbDir>(dir: &mut D) -> Result<Self> {
        let files = dir.ls()?;
        let mut stems = files.iter().filter_map(|f| f.strip_suffix(CONFIG_EXT));
        let stem = match (stems.next(), stems.next()) {
            (Some(stem), None) => stem,
            (None, _) => return Err(Error::NoFilesFound),
            (Some(_), Some(_)) => {
                return Err(Error::ConfigMismatch(
                    "more than one config file in store directory".into(),
                ))
            }
        };
        let data_name = data_file_name(stem);
        if !files.iter().any(|f| *f == data_name) {
            return Err(Error::NoFilesFound);
        }

        let mut file = dir
            .open(&config_file_name(stem))?
            .ok_or(Error::NoFilesFound)?;
        let mut text = String::new();
        file.read_to_string(&mut text)?;
        let config = Self::parse(&text)?;
        if config.name != stem {
            return Err(Error::ConfigMismatch(format!(
                "config names store {:?} but is stored as {:?}",
                config.name, stem
            )));
        }
        Ok(config)
    }

    pub fn save<D: DbDir>(&self, dir: &mut D) -> Result<()> {
        let path = self.config_file_name();
        let tmp_path = tmp_name(&path);
        let mut file = dir
            .create(&tmp_path)?
            .ok_or_else(|| anyhow::anyhow!("temporary file {} already exists", tmp_path))?;
        file.write(self.render().as_bytes())?;
        file.sync()?;
        dir.rename(&tmp_path, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{validate_store_name, StoreConfig};
    use crate::{
        fs::{DbDir, DbFile, MockDir},
        schema::Schema,
        Error,
    };

    fn config() -> StoreConfig {
        StoreConfig::new("people", Schema::parse("id:4,name:10").unwrap(), 7)
    }

    #[test]
    fn test_render_and_parse() {
        let config = config();
        assert_eq!("people\n7\nid:4,name:10\n", config.render());
        assert_eq!(config, StoreConfig::parse(&config.render()).unwrap());
        // Older files have no trailing newline.
        assert_eq!(
            config,
            StoreConfig::parse("people\n7\nid:4,name:10").unwrap()
        );
        assert!(matches!(
            StoreConfig::parse("people\nseven\nid:4"),
            Err(Error::ConfigMismatch(_))
        ));
        assert!(matches!(
            StoreConfig::parse("people\n7\n"),
            Err(Error::ConfigMismatch(_))
        ));
    }

    #[test]
    fn test_save_and_load() -> crate::Result<()> {
        let mut dir = MockDir::new();
        assert!(matches!(StoreConfig::load(&mut dir), Err(Error::NoFilesFound)));

        let config = config();
        config.save(&mut dir)?;
        // A config with no data file beside it is not a store.
        assert!(matches!(StoreConfig::load(&mut dir), Err(Error::NoFilesFound)));

        dir.create("people.data")?.unwrap();
        // Orphaned temporary files are ignored.
        dir.create("people.data.0badf00d.tmp")?.unwrap();
        assert_eq!(config, StoreConfig::load(&mut dir)?);

        let updated = StoreConfig {
            num_slots: 9,
            ..config
        };
        updated.save(&mut dir)?;
        assert_eq!(updated, StoreConfig::load(&mut dir)?);
        Ok(())
    }

    #[test]
    fn test_store_names() {
        assert!(validate_store_name("people").is_ok());
        assert!(validate_store_name("my store").is_ok());
        for bad in ["", " ", "trailing ", ".hidden", "a/b", "a\\b", "two\nlines"] {
            assert!(
                matches!(validate_store_name(bad), Err(Error::InvalidStoreName(_))),
                "{:?}",
                bad
            );
        }
    }

    #[test]
    fn test_name_must_match_file() -> crate::Result<()> {
        let mut dir = MockDir::new();
        let mut f = dir.create("pets.config")?.unwrap();
        f.write(b"people\n7\nid:4,name:10\n")?;
        dir.create("pets.data")?.unwrap();
        assert!(matches!(
            StoreConfig::load(&mut dir),
            Err(Error::ConfigMismatch(_))
        ));
        Ok(())
    }
}
