use std::{collections::HashMap, fmt};

use serde::Serialize;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub name: String,
    pub width: usize,
}

impl Field {
    pub fn new<S: Into<String>>(name: S, width: usize) -> Self {
        Field {
            name: name.into(),
            width,
        }
    }
}

/// The ordered list of fields every record in a store conforms to. The first
/// field is the primary key.
///
/// A schema is fixed once a store is imported; it is never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schema {
    fields: Vec<Field>,
    #[serde(skip)]
    positions: HashMap<String, usize>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        if fields.is_empty() {
            return Err(Error::InvalidSchema("no fields".into()));
        }
        let mut positions = HashMap::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            if field.name.is_empty() {
                return Err(Error::InvalidSchema(format!("field {} has no name", i)));
            }
            // These separate fields and widths in the config file.
            if field.name.contains(&[':', ',', '\n', '\r'][..]) {
                return Err(Error::InvalidSchema(format!(
                    "field name {:?} contains a reserved character",
                    field.name
                )));
            }
            if positions.insert(field.name.clone(), i).is_some() {
                return Err(Error::InvalidSchema(format!(
                    "duplicate field name {:?}",
                    field.name
                )));
            }
        }
        Ok(Schema { fields, positions })
    }

    /// Builds a schema whose widths are the widest value seen in each column.
    pub fn infer(names: &[String], rows: &[Vec<String>]) -> Result<Self> {
        let mut widths = vec![0; names.len()];
        for row in rows {
            for (w, v) in widths.iter_mut().zip(row) {
                *w = std::cmp::max(*w, v.len());
            }
        }
        Self::new(
            names
                .iter()
                .zip(widths)
                .map(|(name, width)| Field::new(name.clone(), width))
                .collect(),
        )
    }

    /// Parses the `field:width,field:width` form written to config files.
    pub fn parse(s: &str) -> Result<Self> {
        let mut fields = Vec::new();
        for pair in s.split(',') {
            let (name, width) = pair
                .split_once(':')
                .ok_or_else(|| Error::InvalidSchema(format!("expected field:width, got {:?}", pair)))?;
            let width = width
                .trim()
                .parse()
                .map_err(|_| Error::InvalidSchema(format!("bad width for field {:?}", name)))?;
            fields.push(Field::new(name.trim(), width));
        }
        Self::new(fields)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn key_field(&self) -> &Field {
        &self.fields[0]
    }

    /// Bytes per slot: every field's width plus the trailing newline.
    pub fn line_size(&self) -> usize {
        self.fields.iter().map(|f| f.width).sum::<usize>() + 1
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}:{}", field.name, field.width)?;
        }
        Ok(())
    }
}

/// One value per schema field, in schema order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Record(Vec<String>);

impl Record {
    pub fn new(values: Vec<String>) -> Self {
        Record(values)
    }

    /// A record with every field empty, which is how a blank slot is written.
    pub fn blank(num_fields: usize) -> Self {
        Record(vec![String::new(); num_fields])
    }

    pub fn values(&self) -> &[String] {
        &self.0
    }

    pub fn get(&self, i: usize) -> Option<&str> {
        self.0.get(i).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_blank(&self) -> bool {
        self.0.iter().all(|v| v.is_empty())
    }

    pub fn key(&self) -> Result<u64> {
        let raw = self.0.first().map(String::as_str).unwrap_or("");
        raw.parse().map_err(|_| Error::InvalidKey(raw.to_owned()))
    }

    /// Returns a copy with the value at `i` replaced.
    pub fn with_value(&self, i: usize, value: String) -> Self {
        let mut values = self.0.clone();
        values[i] = value;
        Record(values)
    }

    pub fn into_values(self) -> Vec<String> {
        self.0
    }
}

impl From<Vec<String>> for Record {
    fn from(values: Vec<String>) -> Self {
        Record(values)
    }
}

impl<'a> From<Vec<&'a str>> for Record {
    fn from(values: Vec<&'a str>) -> Self {
        Record(values.into_iter().map(str::to_owned).collect())
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("|"))
    }
}
