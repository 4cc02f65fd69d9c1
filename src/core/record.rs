// Variable-length list entries with a self-describing field table.
//
// Entry layout (offsets relative to the entry start unless noted):
//   0 next entry (absolute)  4 field table (absolute)  8 field count
//  12 severity  16 message id[7]  23 type[2]  25 key[4]  29 file[10]
//  39 file library[10]  49 queue[10]  59 queue library[10]
//  69 date CYYMMDD[7]  76 time HHMMSS[6]
// Field layout:
//   0 next field (absolute)  4 info length  8 id  12 type tag  13 status
//  14 reserved[14]  28 data length  32 data
use crate::core::error::{Error, ErrorKind};
use crate::core::layout::{self, BLANK};
use crate::core::token::MessageKey;

pub const ENTRY_FIXED_LEN: usize = 84;
pub const FIELD_HEADER_LEN: usize = 32;

/// Identifiers of the fields a list request can ask for.
pub mod field_id {
    pub const REPLACEMENT_DATA: u32 = 201;
    pub const MESSAGE_TEXT: u32 = 302;
    pub const MESSAGE_HELP: u32 = 402;
    pub const MESSAGE_HELP_FORMATTED: u32 = 404;
    pub const DEFAULT_REPLY: u32 = 501;
    pub const SENDER_JOB: u32 = 601;
    pub const REPLY_STATUS: u32 = 1001;
}

const TAG_TEXT: u8 = b'C';
const TAG_BINARY: u8 = b'B';
const TAG_MULTI: u8 = b'M';

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    /// Repeated fixed-width sub-fields, kept as raw bytes.
    MultiValue(Vec<Vec<u8>>),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Field {
    pub id: u32,
    pub status: u8,
    pub value: FieldValue,
}

impl Field {
    pub fn text(id: u32, text: impl Into<String>) -> Self {
        Self {
            id,
            status: BLANK,
            value: FieldValue::Text(text.into()),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ListEntry {
    pub severity: i32,
    pub message_id: String,
    pub type_code: String,
    pub key: MessageKey,
    pub message_file: String,
    pub message_file_library: String,
    pub queue: String,
    pub queue_library: String,
    pub date_sent: String,
    pub time_sent: String,
    pub fields: Vec<Field>,
}

impl ListEntry {
    pub fn field(&self, id: u32) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|field| field.id == id)
            .map(|field| &field.value)
    }

    pub fn text_field(&self, id: u32) -> Option<&str> {
        match self.field(id) {
            Some(FieldValue::Text(text)) => Some(text.as_str()),
            _ => None,
        }
    }
}

/// Decodes `count` entries; never follows the last entry's next offset.
pub fn decode_entries(buf: &[u8], count: usize) -> Result<Vec<ListEntry>, Error> {
    let mut entries = Vec::with_capacity(count.min(1024));
    let mut offset = 0usize;
    for i in 0..count {
        let (entry, next) = decode_entry(buf, offset)?;
        entries.push(entry);
        if i + 1 == count {
            break;
        }
        if next <= offset || next >= buf.len() {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!("entry {i} points to invalid next entry {next}"))
                .with_offset(offset));
        }
        offset = next;
    }
    Ok(entries)
}

fn decode_entry(buf: &[u8], at: usize) -> Result<(ListEntry, usize), Error> {
    layout::read_bytes(buf, at, ENTRY_FIXED_LEN)?;
    let next = layout::read_offset(buf, at)?;
    let fields_at = layout::read_offset(buf, at + 4)?;
    let field_count = layout::read_offset(buf, at + 8)?;
    let fields = decode_fields(buf, fields_at, field_count)?;
    let entry = ListEntry {
        severity: layout::read_i32(buf, at + 12)?,
        message_id: layout::read_text(buf, at + 16, 7)?,
        type_code: layout::read_text(buf, at + 23, 2)?,
        key: MessageKey(layout::read_4(buf, at + 25)?),
        message_file: layout::read_text(buf, at + 29, 10)?,
        message_file_library: layout::read_text(buf, at + 39, 10)?,
        queue: layout::read_text(buf, at + 49, 10)?,
        queue_library: layout::read_text(buf, at + 59, 10)?,
        date_sent: layout::read_text(buf, at + 69, 7)?,
        time_sent: layout::read_text(buf, at + 76, 6)?,
        fields,
    };
    Ok((entry, next))
}

fn decode_fields(buf: &[u8], first: usize, count: usize) -> Result<Vec<Field>, Error> {
    let mut fields = Vec::with_capacity(count.min(64));
    let mut at = first;
    for j in 0..count {
        let next = layout::read_offset(buf, at)?;
        let info_len = layout::read_offset(buf, at + 4)?;
        let id = layout::read_u32(buf, at + 8)?;
        let tag = layout::read_bytes(buf, at + 12, 1)?[0];
        let status = layout::read_bytes(buf, at + 13, 1)?[0];
        let data_len = layout::read_offset(buf, at + 28)?;
        if FIELD_HEADER_LEN.saturating_add(data_len) > info_len {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!(
                    "field {id} holds {data_len} data bytes but its information length is {info_len}"
                ))
                .with_offset(at));
        }
        let data = layout::read_bytes(buf, at + FIELD_HEADER_LEN, data_len)?;
        let value = decode_value(tag, data).map_err(|err| err.with_offset(at))?;
        fields.push(Field { id, status, value });
        if j + 1 == count {
            break;
        }
        if next <= at || next >= buf.len() {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!("field {id} points to invalid next field {next}"))
                .with_offset(at));
        }
        at = next;
    }
    Ok(fields)
}

fn decode_value(tag: u8, data: &[u8]) -> Result<FieldValue, Error> {
    match tag {
        TAG_TEXT => Ok(FieldValue::Text(String::from_utf8_lossy(data).into_owned())),
        TAG_BINARY => match data.len() {
            4 => Ok(FieldValue::Integer(layout::read_i32(data, 0)? as i64)),
            8 => Ok(FieldValue::Integer(layout::read_i64(data, 0)?)),
            other => Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!("binary field has unsupported length {other}"))),
        },
        TAG_MULTI => {
            let repeat = layout::read_offset(data, 0)?;
            let rest = &data[4..];
            if repeat == 0 {
                return Ok(FieldValue::MultiValue(Vec::new()));
            }
            if rest.len() % repeat != 0 {
                return Err(Error::new(ErrorKind::Corrupt).with_message(format!(
                    "multi-value field of {} bytes cannot hold {repeat} equal sub-fields",
                    rest.len()
                )));
            }
            let width = rest.len() / repeat;
            if width == 0 {
                return Ok(FieldValue::MultiValue(vec![Vec::new(); repeat]));
            }
            Ok(FieldValue::MultiValue(
                rest.chunks(width).map(|chunk| chunk.to_vec()).collect(),
            ))
        }
        other => Err(Error::new(ErrorKind::Corrupt)
            .with_message(format!("unknown field type tag 0x{other:02X}"))),
    }
}

/// Encodes one entry whose first byte will sit at `base` in the final buffer.
pub fn encode_entry(entry: &ListEntry, base: usize) -> Result<Vec<u8>, Error> {
    let mut out = vec![0u8; ENTRY_FIXED_LEN];
    layout::write_u32(&mut out, 4, layout::to_u32(base + ENTRY_FIXED_LEN)?);
    layout::write_u32(&mut out, 8, layout::to_u32(entry.fields.len())?);
    layout::write_i32(&mut out, 12, entry.severity);
    layout::write_text(&mut out, 16, 7, &entry.message_id);
    layout::write_text(&mut out, 23, 2, &entry.type_code);
    out[25..29].copy_from_slice(&entry.key.0);
    layout::write_text(&mut out, 29, 10, &entry.message_file);
    layout::write_text(&mut out, 39, 10, &entry.message_file_library);
    layout::write_text(&mut out, 49, 10, &entry.queue);
    layout::write_text(&mut out, 59, 10, &entry.queue_library);
    layout::write_text(&mut out, 69, 7, &entry.date_sent);
    layout::write_text(&mut out, 76, 6, &entry.time_sent);
    out[82] = BLANK;
    out[83] = BLANK;

    for field in &entry.fields {
        let (tag, data) = encode_value(&field.value)?;
        let info_len = FIELD_HEADER_LEN + align4(data.len());
        let start = out.len();
        out.resize(start + info_len, 0);
        layout::write_u32(&mut out, start, layout::to_u32(base + start + info_len)?);
        layout::write_u32(&mut out, start + 4, layout::to_u32(info_len)?);
        layout::write_u32(&mut out, start + 8, field.id);
        out[start + 12] = tag;
        out[start + 13] = field.status;
        out[start + 14..start + 28].fill(BLANK);
        layout::write_u32(&mut out, start + 28, layout::to_u32(data.len())?);
        out[start + FIELD_HEADER_LEN..start + FIELD_HEADER_LEN + data.len()].copy_from_slice(&data);
    }

    let end = layout::to_u32(base + out.len())?;
    layout::write_u32(&mut out, 0, end);
    Ok(out)
}

pub fn encode_entries(entries: &[ListEntry]) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    for entry in entries {
        let bytes = encode_entry(entry, out.len())?;
        out.extend_from_slice(&bytes);
    }
    Ok(out)
}

fn encode_value(value: &FieldValue) -> Result<(u8, Vec<u8>), Error> {
    match value {
        FieldValue::Text(text) => Ok((TAG_TEXT, text.as_bytes().to_vec())),
        FieldValue::Integer(value) => match i32::try_from(*value) {
            Ok(small) => Ok((TAG_BINARY, small.to_be_bytes().to_vec())),
            Err(_) => Ok((TAG_BINARY, value.to_be_bytes().to_vec())),
        },
        FieldValue::MultiValue(items) => {
            let width = items.first().map_or(0, Vec::len);
            if items.iter().any(|item| item.len() != width) {
                return Err(Error::new(ErrorKind::Internal)
                    .with_message("multi-value sub-fields must share one width"));
            }
            let mut data = layout::to_u32(items.len())?.to_be_bytes().to_vec();
            for item in items {
                data.extend_from_slice(item);
            }
            Ok((TAG_MULTI, data))
        }
    }
}

fn align4(len: usize) -> usize {
    (len + 3) & !3
}

#[cfg(test)]
mod tests {
    use super::{
        decode_entries, encode_entries, encode_entry, field_id, Field, FieldValue, ListEntry,
        ENTRY_FIXED_LEN, FIELD_HEADER_LEN,
    };
    use crate::core::error::ErrorKind;
    use crate::core::layout;
    use crate::core::token::MessageKey;

    fn entry(key: u32, text: &str) -> ListEntry {
        ListEntry {
            severity: 40,
            message_id: "CPF9898".to_string(),
            type_code: "04".to_string(),
            key: MessageKey::from_u32(key),
            message_file: "QCPFMSG".to_string(),
            message_file_library: "QSYS".to_string(),
            queue: "QSYSOPR".to_string(),
            queue_library: "QSYS".to_string(),
            date_sent: "1261016".to_string(),
            time_sent: "101500".to_string(),
            fields: vec![
                Field::text(field_id::MESSAGE_TEXT, text),
                Field {
                    id: field_id::REPLY_STATUS,
                    status: b' ',
                    value: FieldValue::Integer(-3),
                },
            ],
        }
    }

    #[test]
    fn entries_advance_by_next_offset_not_fixed_size() {
        let entries = vec![entry(1, "short"), entry(2, "a considerably longer message text")];
        let buf = encode_entries(&entries).expect("encode");
        let first_len = layout::read_offset(&buf, 0).expect("next");
        assert!(first_len > ENTRY_FIXED_LEN);
        let decoded = decode_entries(&buf, 2).expect("decode");
        assert_eq!(decoded, entries);
        assert_eq!(
            decoded[1].text_field(field_id::MESSAGE_TEXT),
            Some("a considerably longer message text")
        );
    }

    #[test]
    fn last_entry_next_offset_at_buffer_end_is_not_followed() {
        let buf = encode_entries(&[entry(1, "only")]).expect("encode");
        assert_eq!(layout::read_offset(&buf, 0).expect("next"), buf.len());
        let decoded = decode_entries(&buf, 1).expect("decode");
        assert_eq!(decoded.len(), 1);
    }

    #[test]
    fn claimed_count_beyond_buffer_is_corrupt() {
        let buf = encode_entries(&[entry(1, "only")]).expect("encode");
        let err = decode_entries(&buf, 2).expect_err("overrun");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn truncated_field_data_is_corrupt() {
        let buf = encode_entries(&[entry(1, "payload that gets cut")]).expect("encode");
        let cut = ENTRY_FIXED_LEN + FIELD_HEADER_LEN + 4;
        let err = decode_entries(&buf[..cut], 1).expect_err("cut");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn binary_fields_decode_by_length() {
        let mut wide = entry(1, "x");
        wide.fields = vec![Field {
            id: 9,
            status: b' ',
            value: FieldValue::Integer(i64::from(i32::MAX) + 1),
        }];
        let buf = encode_entry(&wide, 0).expect("encode");
        let data_len = layout::read_offset(&buf, ENTRY_FIXED_LEN + 28).expect("len");
        assert_eq!(data_len, 8);
        let decoded = decode_entries(&buf, 1).expect("decode");
        assert_eq!(decoded[0].field(9), Some(&FieldValue::Integer(2_147_483_648)));
    }

    #[test]
    fn multi_value_splits_equal_width_sub_fields() {
        let mut multi = entry(1, "x");
        multi.fields = vec![Field {
            id: 7,
            status: b' ',
            value: FieldValue::MultiValue(vec![b"AB".to_vec(), b"CD".to_vec(), b"EF".to_vec()]),
        }];
        let buf = encode_entries(&[multi.clone()]).expect("encode");
        assert_eq!(buf[ENTRY_FIXED_LEN + 12], b'M');
        assert_eq!(decode_entries(&buf, 1).expect("decode"), vec![multi]);
    }

    #[test]
    fn unknown_type_tag_is_rejected() {
        let mut buf = encode_entries(&[entry(1, "x")]).expect("encode");
        buf[ENTRY_FIXED_LEN + 12] = b'Z';
        let err = decode_entries(&buf, 1).expect_err("tag");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        assert_eq!(err.offset(), Some(ENTRY_FIXED_LEN));
    }

    #[test]
    fn text_fields_keep_edge_blanks() {
        let padded = entry(1, "  indented text ends with spaces   ");
        let buf = encode_entries(&[padded.clone()]).expect("encode");
        let decoded = decode_entries(&buf, 1).expect("decode");
        assert_eq!(
            decoded[0].text_field(field_id::MESSAGE_TEXT),
            Some("  indented text ends with spaces   ")
        );
        assert_eq!(decoded, vec![padded]);
    }

    #[test]
    fn data_longer_than_field_information_is_corrupt() {
        let mut buf = encode_entries(&[entry(1, "twelve bytes")]).expect("encode");
        layout::write_u32(&mut buf, ENTRY_FIXED_LEN + 4, (FIELD_HEADER_LEN + 8) as u32);
        let err = decode_entries(&buf, 1).expect_err("info length");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        assert_eq!(err.offset(), Some(ENTRY_FIXED_LEN));
    }

    #[test]
    fn backwards_next_offset_is_rejected() {
        let mut buf = encode_entries(&[entry(1, "a"), entry(2, "b")]).expect("encode");
        layout::write_u32(&mut buf, 0, 0);
        let err = decode_entries(&buf, 2).expect_err("loop");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }
}
