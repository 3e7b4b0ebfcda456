//! On-device script storage codec.
//!
//! Container layout:
//!
//! ```text
//! [magic 0xBADD0BEE, BE u32]
//! repeated: [record length, LE u16]["name.type\0"][payload]
//! [0x0000]
//! ```
//!
//! The record length covers the length field itself, the null-terminated
//! full name and the payload.

use serde::Serialize;

use super::bytes::{encode_text, latin1_decode, read_c_string, read_u16_le, read_u32_be};
use super::config::{SCRIPT_RECORD_TYPE, STORAGE_MAGIC};
use super::error::{DfuError, DfuResult};

/// Size of a record length prefix (and of the terminating zero length).
const LENGTH_FIELD: usize = 2;

/// A record as framed in the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawRecord {
    pub name: String,
    /// Text after the last `.` of the full name; `None` when the name has
    /// no usable suffix.
    pub record_type: Option<String>,
    pub data: Vec<u8>,
}

impl RawRecord {
    /// Name as stored on the device (`name.type`).
    pub fn full_name(&self) -> String {
        match &self.record_type {
            Some(record_type) => format!("{}.{}", self.name, record_type),
            None => self.name.clone(),
        }
    }
}

/// A decoded Python script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptRecord {
    pub name: String,
    pub auto_import: bool,
    pub code: String,
}

/// A record after type-specific decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "record")]
pub enum Record {
    /// A `py` record.
    Script(ScriptRecord),
    /// Any record type without a dedicated decoder.
    Raw(RawRecord),
}

impl Record {
    pub fn name(&self) -> &str {
        match self {
            Record::Script(script) => &script.name,
            Record::Raw(raw) => &raw.name,
        }
    }

    pub fn record_type(&self) -> Option<&str> {
        match self {
            Record::Script(_) => Some(SCRIPT_RECORD_TYPE),
            Record::Raw(raw) => raw.record_type.as_deref(),
        }
    }

    pub fn is_script(&self) -> bool {
        matches!(self, Record::Script(_))
    }
}

/// Split a full record name at its last `.`.
///
/// A name without a dot, or ending with one, has no type.
pub fn split_record_name(full_name: &str) -> (String, Option<String>) {
    match full_name.rsplit_once('.') {
        Some((name, record_type)) if !record_type.is_empty() => {
            (name.to_string(), Some(record_type.to_string()))
        }
        _ => (full_name.to_string(), None),
    }
}

/// Whether the blob opens with the storage magic.
pub fn has_storage_magic(blob: &[u8]) -> bool {
    matches!(read_u32_be(blob, 0), Ok(STORAGE_MAGIC))
}

/// Slice a container into its framed records.
///
/// A blob without the storage magic holds no records.
pub fn slice_storage(blob: &[u8]) -> DfuResult<Vec<RawRecord>> {
    let mut records = Vec::new();

    if !has_storage_magic(blob) {
        return Ok(records);
    }

    let mut offset = 4;
    while offset < blob.len() {
        let size = read_u16_le(blob, offset)? as usize;
        if size == 0 {
            break;
        }
        // Length field plus at least the name terminator
        if size < LENGTH_FIELD + 1 {
            return Err(DfuError::MalformedRecord { offset, size });
        }

        let end = offset + size;
        if end > blob.len() {
            return Err(DfuError::TruncatedInput {
                offset,
                needed: size,
                available: blob.len(),
            });
        }

        let (full_name, name_size) = read_c_string(blob, offset + LENGTH_FIELD, size - LENGTH_FIELD)?;
        let data_start = (offset + LENGTH_FIELD + name_size).min(end);
        let (name, record_type) = split_record_name(&full_name);

        records.push(RawRecord {
            name,
            record_type,
            data: blob[data_start..end].to_vec(),
        });

        offset = end;
    }

    Ok(records)
}

/// Decode a record according to its type.
pub fn decode_record(raw: RawRecord) -> DfuResult<Record> {
    match raw.record_type.as_deref() {
        Some(SCRIPT_RECORD_TYPE) => decode_script(raw).map(Record::Script),
        _ => Ok(Record::Raw(raw)),
    }
}

fn decode_script(raw: RawRecord) -> DfuResult<ScriptRecord> {
    let (&flag, source) = raw.data.split_first().ok_or(DfuError::TruncatedInput {
        offset: 0,
        needed: 1,
        available: 0,
    })?;
    let end = source.iter().position(|&b| b == 0).unwrap_or(source.len());

    Ok(ScriptRecord {
        name: raw.name,
        auto_import: flag != 0,
        code: latin1_decode(&source[..end]),
    })
}

/// Encode a record back into its framed form.
pub fn encode_record(record: Record) -> RawRecord {
    match record {
        Record::Script(script) => {
            let source = encode_text(&script.code);
            let mut data = Vec::with_capacity(source.len() + 2);
            data.push(script.auto_import as u8);
            data.extend_from_slice(&source);
            data.push(0);

            RawRecord {
                name: script.name,
                record_type: Some(SCRIPT_RECORD_TYPE.to_string()),
                data,
            }
        }
        Record::Raw(raw) => raw,
    }
}

/// Assemble framed records into a container of at most `max_size` bytes.
///
/// The size check runs before each record is appended and accounts for the
/// terminating length, so the error names the first record that does not fit.
pub fn assemble_storage(records: &[RawRecord], max_size: usize) -> DfuResult<Vec<u8>> {
    let mut out = STORAGE_MAGIC.to_be_bytes().to_vec();

    for (index, record) in records.iter().enumerate() {
        let record_type = record
            .record_type
            .as_deref()
            .ok_or_else(|| DfuError::UntypedRecord {
                index,
                name: record.name.clone(),
            })?;

        let mut name = encode_text(&record.name);
        name.push(b'.');
        name.extend_from_slice(&encode_text(record_type));
        name.push(0);

        let size = LENGTH_FIELD + name.len() + record.data.len();
        let prefix = u16::try_from(size).map_err(|_| DfuError::RecordTooLarge { index, size })?;

        let required = out.len() + size + LENGTH_FIELD;
        if required > max_size {
            log::error!(
                "Storage overflow at record {} ({}): {} > {} bytes",
                index,
                record.full_name(),
                required,
                max_size
            );
            return Err(DfuError::StorageOverflow {
                index,
                required,
                capacity: max_size,
            });
        }

        out.extend_from_slice(&prefix.to_le_bytes());
        out.extend_from_slice(&name);
        out.extend_from_slice(&record.data);
    }

    if out.len() + LENGTH_FIELD > max_size {
        return Err(DfuError::StorageOverflow {
            index: records.len(),
            required: out.len() + LENGTH_FIELD,
            capacity: max_size,
        });
    }

    out.extend_from_slice(&[0, 0]);
    Ok(out)
}

/// A decoded storage dump.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StorageContainer {
    pub magik: bool,
    pub records: Vec<Record>,
}

impl StorageContainer {
    /// Decode every record of a dump.
    pub fn parse(blob: &[u8]) -> DfuResult<Self> {
        let magik = has_storage_magic(blob);
        let records = slice_storage(blob)?
            .into_iter()
            .map(decode_record)
            .collect::<DfuResult<Vec<_>>>()?;

        Ok(Self { magik, records })
    }

    /// Decode a dump keeping only the scripts, as preserved across a flash.
    pub fn snapshot(blob: &[u8]) -> DfuResult<Self> {
        let mut container = Self::parse(blob)?;
        let before = container.records.len();
        container.records.retain(Record::is_script);

        if container.records.len() != before {
            log::debug!(
                "Discarding {} non-script records from storage snapshot",
                before - container.records.len()
            );
        }

        Ok(container)
    }

    /// Scripts held by the container.
    pub fn scripts(&self) -> impl Iterator<Item = &ScriptRecord> {
        self.records.iter().filter_map(|record| match record {
            Record::Script(script) => Some(script),
            Record::Raw(_) => None,
        })
    }

    /// Re-encode the container for a storage region of `max_size` bytes.
    pub fn encode(&self, max_size: usize) -> DfuResult<Vec<u8>> {
        let raw: Vec<RawRecord> = self.records.iter().cloned().map(encode_record).collect();
        assemble_storage(&raw, max_size)
    }
}
