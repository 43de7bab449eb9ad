// Slots are fixed width: each value is right-padded with spaces to its field's
// width, fields are concatenated with no delimiter, and a newline ends the
// slot. A slot whose fields are all empty after trimming is blank.

use crate::{
    schema::{Record, Schema},
    Error, Result,
};

const PAD: u8 = b' ';
const NEWLINE: u8 = b'\n';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Corruption {
    #[error("slot is {0} bytes, expected {1}")]
    Length(usize, usize),
    #[error("missing trailing newline")]
    MissingNewline,
    #[error("field {0:?} is not valid UTF-8")]
    InvalidUtf8(String),
}

/// Checks that `record` fits `schema` without producing any bytes.
pub fn validate(schema: &Schema, record: &Record) -> Result<()> {
    if record.len() != schema.len() {
        return Err(Error::FieldCount {
            expected: schema.len(),
            got: record.len(),
        });
    }
    for (field, value) in schema.fields().iter().zip(record.values()) {
        if value.len() > field.width {
            return Err(Error::RecordTooWide {
                field: field.name.clone(),
                width: field.width,
                len: value.len(),
            });
        }
        if value.contains('\n') {
            return Err(Error::ReservedCharacter(field.name.clone()));
        }
    }
    Ok(())
}

/// Appends exactly `schema.line_size()` bytes for `record` to `buf`. Nothing is
/// appended if the record does not fit.
pub fn encode(schema: &Schema, record: &Record, buf: &mut Vec<u8>) -> Result<()> {
    validate(schema, record)?;
    buf.reserve(schema.line_size());
    for (field, value) in schema.fields().iter().zip(record.values()) {
        buf.extend_from_slice(value.as_bytes());
        buf.extend(std::iter::repeat(PAD).take(field.width - value.len()));
    }
    buf.push(NEWLINE);
    Ok(())
}

pub fn encode_blank(schema: &Schema, buf: &mut Vec<u8>) {
    buf.extend(std::iter::repeat(PAD).take(schema.line_size() - 1));
    buf.push(NEWLINE);
}

/// Decodes one slot. Returns `None` for a blank slot.
pub fn decode(schema: &Schema, slot: &[u8]) -> std::result::Result<Option<Record>, Corruption> {
    if slot.len() != schema.line_size() {
        return Err(Corruption::Length(slot.len(), schema.line_size()));
    }
    if slot[slot.len() - 1] != NEWLINE {
        return Err(Corruption::MissingNewline);
    }

    let mut values = Vec::with_capacity(schema.len());
    let mut from = 0;
    for field in schema.fields() {
        let raw = &slot[from..from + field.width];
        from += field.width;

        let end = raw.iter().rposition(|b| *b != PAD).map_or(0, |i| i + 1);
        let value = std::str::from_utf8(&raw[..end])
            .map_err(|_| Corruption::InvalidUtf8(field.name.clone()))?;
        values.push(value.to_owned());
    }

    let record = Record::new(values);
    if record.is_blank() {
        Ok(None)
    } else {
        Ok(Some(record))
    }
}

#[cfg(test)]
mod test {
    use super::{decode, encode, encode_blank, Corruption};
    use crate::{
        schema::{Field, Record, Schema},
        Error,
    };

    fn schema() -> Schema {
        Schema::new(vec![Field::new("id", 4), Field::new("name", 10)]).unwrap()
    }

    #[test]
    fn test_layout() {
        let schema = schema();
        let mut buf = Vec::new();
        encode(&schema, &Record::from(vec!["5", "bob"]), &mut buf).unwrap();
        assert_eq!(b"5   bob       \n".to_vec(), buf);
        assert_eq!(schema.line_size(), buf.len());

        buf.clear();
        encode_blank(&schema, &mut buf);
        assert_eq!(b"              \n".to_vec(), buf);
    }

    #[test]
    fn test_values_survive_padding() {
        let schema = schema();
        for values in [
            vec!["1", "alice"],
            vec!["9999", "exactly10!"],
            vec!["7", ""],
            vec!["12", "two words"],
        ] {
            let record = Record::from(values);
            let mut buf = Vec::new();
            encode(&schema, &record, &mut buf).unwrap();
            assert_eq!(Some(record), decode(&schema, &buf).unwrap());
        }
    }

    #[test]
    fn test_blank_slots_decode_to_none() {
        let schema = schema();
        let mut buf = Vec::new();
        encode_blank(&schema, &mut buf);
        assert_eq!(None, decode(&schema, &buf).unwrap());

        buf.clear();
        encode(&schema, &Record::blank(2), &mut buf).unwrap();
        assert_eq!(None, decode(&schema, &buf).unwrap());
    }

    #[test]
    fn test_too_wide_writes_nothing() {
        let schema = schema();
        let mut buf = Vec::new();
        let err = encode(&schema, &Record::from(vec!["1", "much too long"]), &mut buf).unwrap_err();
        assert!(matches!(
            err,
            Error::RecordTooWide { ref field, width: 10, len: 13 } if field == "name"
        ));
        assert!(buf.is_empty());

        assert!(matches!(
            encode(&schema, &Record::from(vec!["1"]), &mut buf),
            Err(Error::FieldCount { expected: 2, got: 1 })
        ));
        assert!(matches!(
            encode(&schema, &Record::from(vec!["1", "a\nb"]), &mut buf),
            Err(Error::ReservedCharacter(_))
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_corruption() {
        let schema = schema();
        let mut good = Vec::new();
        encode(&schema, &Record::from(vec!["5", "bob"]), &mut good).unwrap();

        let mut bad = good.clone();
        *bad.last_mut().unwrap() = b' ';
        assert_eq!(Err(Corruption::MissingNewline), decode(&schema, &bad));

        assert_eq!(Err(Corruption::Length(3, 15)), decode(&schema, b"5 \n"));

        let mut bad = good.clone();
        bad[4] = 0xff;
        assert_eq!(
            Err(Corruption::InvalidUtf8("name".into())),
            decode(&schema, &bad)
        );
    }
}
