use std::fmt;

use super::error::RecordResult;
use super::layout::{BlockEntry, check_str_len, decode_str, encode_str, read_i32, write_i32};

/// Width of the `name` field in bytes
pub const NAME_LEN: usize = 15;
/// Width of the `surname` field in bytes
pub const SURNAME_LEN: usize = 20;
/// Width of the `city` field in bytes
pub const CITY_LEN: usize = 20;

const NAME_OFFSET: usize = 4;
const SURNAME_OFFSET: usize = NAME_OFFSET + NAME_LEN;
const CITY_OFFSET: usize = SURNAME_OFFSET + SURNAME_LEN;

/// A fixed-size tuple stored in heap and hash files.
///
/// String fields are validated against their on-disk widths at construction,
/// so every `Record` can be encoded without truncation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Record {
    id: i32,
    name: String,
    surname: String,
    city: String,
}

impl Record {
    pub fn new(
        id: i32,
        name: impl Into<String>,
        surname: impl Into<String>,
        city: impl Into<String>,
    ) -> RecordResult<Self> {
        let (name, surname, city) = (name.into(), surname.into(), city.into());
        check_str_len("name", &name, NAME_LEN)?;
        check_str_len("surname", &surname, SURNAME_LEN)?;
        check_str_len("city", &city, CITY_LEN)?;
        Ok(Self {
            id,
            name,
            surname,
            city,
        })
    }

    /// Primary key
    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn surname(&self) -> &str {
        &self.surname
    }

    pub fn city(&self) -> &str {
        &self.city
    }
}

impl BlockEntry for Record {
    const SIZE: usize = CITY_OFFSET + CITY_LEN;

    fn encode(&self, buf: &mut [u8]) {
        write_i32(buf, 0, self.id);
        encode_str(&mut buf[NAME_OFFSET..SURNAME_OFFSET], &self.name);
        encode_str(&mut buf[SURNAME_OFFSET..CITY_OFFSET], &self.surname);
        encode_str(&mut buf[CITY_OFFSET..Self::SIZE], &self.city);
    }

    fn decode(buf: &[u8]) -> RecordResult<Self> {
        Ok(Self {
            id: read_i32(buf, 0),
            name: decode_str(&buf[NAME_OFFSET..SURNAME_OFFSET])?,
            surname: decode_str(&buf[SURNAME_OFFSET..CITY_OFFSET])?,
            city: decode_str(&buf[CITY_OFFSET..Self::SIZE])?,
        })
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({},{},{},{})",
            self.id, self.name, self.surname, self.city
        )
    }
}

/// Outcome of a key or name lookup.
///
/// A miss is not an error: `records` is empty and `blocks_visited` still
/// reports the cost of finding that out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupResult {
    pub blocks_visited: usize,
    pub records: Vec<Record>,
}

impl LookupResult {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::layout::capacity;
    use crate::record::RecordError;

    #[test]
    fn test_record_width_and_capacity() {
        assert_eq!(Record::SIZE, 59);
        assert_eq!(capacity::<Record>(), 8);
    }

    #[test]
    fn test_encode_decode() {
        let record = Record::new(42, "Giorgos", "Papadopoulos", "Athens").unwrap();
        let mut buf = vec![0xEEu8; Record::SIZE];
        record.encode(&mut buf);

        assert_eq!(&buf[0..4], &42i32.to_le_bytes());
        assert_eq!(&buf[4..11], b"Giorgos");
        // Unused bytes of a field are NUL padded
        assert!(buf[11..19].iter().all(|&b| b == 0));
        assert_eq!(Record::decode(&buf).unwrap(), record);
    }

    #[test]
    fn test_full_width_fields() {
        let name = "a".repeat(NAME_LEN);
        let city = "c".repeat(CITY_LEN);
        let record = Record::new(-3, name.as_str(), "", city.as_str()).unwrap();
        let mut buf = vec![0u8; Record::SIZE];
        record.encode(&mut buf);

        let decoded = Record::decode(&buf).unwrap();
        assert_eq!(decoded.name(), name);
        assert_eq!(decoded.surname(), "");
        assert_eq!(decoded.city(), city);
        assert_eq!(decoded.id(), -3);
    }

    #[test]
    fn test_overlong_field_rejected() {
        let result = Record::new(1, "a".repeat(NAME_LEN + 1), "b", "c");
        assert!(matches!(result, Err(RecordError::InvalidRecord(_))));
    }

    #[test]
    fn test_display() {
        let record = Record::new(7, "Maria", "Ioannou", "Patra").unwrap();
        assert_eq!(record.to_string(), "(7,Maria,Ioannou,Patra)");
    }
}
