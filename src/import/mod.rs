use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use crate::{Error, Result};

/// A parsed comma-delimited source: a header line of field names followed by
/// one line per record. Values may not contain commas or newlines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub fields: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Splits one line into its values, dropping the line terminator.
pub fn parse_line(line: &str) -> Vec<String> {
    line.trim_end_matches(&['\n', '\r'][..])
        .split(',')
        .map(str::to_owned)
        .collect()
}

impl Table {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let is_csv = path.extension().map_or(false, |ext| ext == "csv");
        if !is_csv || !path.is_file() {
            return Err(Error::InvalidImportSource(format!(
                "{} is not a .csv file",
                path.display()
            )));
        }
        Self::parse(BufReader::new(File::open(path)?))
    }

    pub fn parse<R: BufRead>(reader: R) -> Result<Self> {
        let mut fields: Option<Vec<String>> = None;
        let mut rows = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let values = parse_line(&line);
            match &fields {
                None => fields = Some(values),
                Some(header) => {
                    if values.len() != header.len() {
                        return Err(Error::InvalidImportSource(format!(
                            "line {} has {} fields, expected {}",
                            i + 1,
                            values.len(),
                            header.len()
                        )));
                    }
                    rows.push(values);
                }
            }
        }

        let fields =
            fields.ok_or_else(|| Error::InvalidImportSource("missing header line".into()))?;
        if rows.is_empty() {
            return Err(Error::InvalidImportSource("no data rows".into()));
        }
        Ok(Table { fields, rows })
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::{parse_line, Table};
    use crate::Error;

    #[test]
    fn test_parse() {
        let table = Table::parse("id,name\r\n1,alice\r\n\n5,bob\n".as_bytes()).unwrap();
        assert_eq!(vec!["id", "name"], table.fields);
        assert_eq!(
            vec![vec!["1", "alice"], vec!["5", "bob"]],
            table.rows
        );
        assert_eq!(vec!["7", ""], parse_line("7,\n"));
    }

    #[test]
    fn test_rejects_malformed_sources() {
        let err = Table::parse("id,name\n1,alice\n2\n".as_bytes()).unwrap_err();
        assert_eq!(
            "invalid import source: line 3 has 1 fields, expected 2",
            err.to_string()
        );
        assert!(matches!(
            Table::parse("".as_bytes()),
            Err(Error::InvalidImportSource(_))
        ));
        assert!(matches!(
            Table::parse("id,name\n".as_bytes()),
            Err(Error::InvalidImportSource(_))
        ));
    }

    #[test]
    fn test_from_path() {
        let tmp = tempfile::tempdir().unwrap();

        let csv = tmp.path().join("people.csv");
        let mut f = std::fs::File::create(&csv).unwrap();
        writeln!(f, "id,name\n1,alice").unwrap();
        drop(f);
        assert_eq!(1, Table::from_path(&csv).unwrap().rows.len());

        let txt = tmp.path().join("people.txt");
        std::fs::copy(&csv, &txt).unwrap();
        assert!(matches!(
            Table::from_path(&txt),
            Err(Error::InvalidImportSource(_))
        ));
        assert!(matches!(
            Table::from_path(tmp.path().join("missing.csv")),
            Err(Error::InvalidImportSource(_))
        ));
    }
}
