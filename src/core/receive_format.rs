// Single-message receive record: fixed header plus three trailing sections.
//
//   0 bytes returned  4 bytes available  8 severity  12 message id[7]
//  19 type[2]  21 key[4]  25 file[10]  35 file library[10]  45 job[10]
//  55 user[10]  65 job number[6]  71 program[12]  83 date[7]  90 time[6]
//  96 reply status[1]  97 reserved[3]
// 100/104 substitution data returned/available  108/112 text  116/120 help
// 124 substitution data, text and help, back to back.
use crate::core::error::{Error, ErrorKind};
use crate::core::layout::{self, BLANK};
use crate::core::token::MessageKey;

pub const RECEIVE_HEADER_LEN: usize = 124;

const SECTION_LENGTHS: usize = 100;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReceivedRecord {
    pub severity: i32,
    pub message_id: String,
    pub type_code: String,
    pub key: MessageKey,
    pub message_file: String,
    pub message_file_library: String,
    pub sender_job: String,
    pub sender_user: String,
    pub sender_job_number: String,
    pub sender_program: String,
    pub date_sent: String,
    pub time_sent: String,
    pub reply_status: String,
    pub substitution_data: Vec<u8>,
    pub text: String,
    pub help: String,
    pub bytes_available: usize,
    pub truncated: bool,
}

/// Decodes a receive answer; the all-zero sentinel means nothing was there.
pub fn decode_received(buf: &[u8]) -> Result<Option<ReceivedRecord>, Error> {
    let bytes_returned = layout::read_offset(buf, 0)?;
    let bytes_available = layout::read_offset(buf, 4)?;
    if bytes_available == 0 {
        return Ok(None);
    }
    if bytes_returned < RECEIVE_HEADER_LEN || buf.len() < RECEIVE_HEADER_LEN {
        return Err(Error::new(ErrorKind::Corrupt)
            .with_message(format!("receive record header cut at {bytes_returned} bytes")));
    }
    let buf = &buf[..bytes_returned.min(buf.len())];

    let mut sections = [(0usize, 0usize); 3];
    for (i, section) in sections.iter_mut().enumerate() {
        let at = SECTION_LENGTHS + i * 8;
        *section = (layout::read_offset(buf, at)?, layout::read_offset(buf, at + 4)?);
    }
    let [(subst_len, subst_avail), (text_len, text_avail), (help_len, help_avail)] = sections;

    let subst_at = RECEIVE_HEADER_LEN;
    let text_at = subst_at + subst_len;
    let help_at = text_at + text_len;

    Ok(Some(ReceivedRecord {
        severity: layout::read_i32(buf, 8)?,
        message_id: layout::read_text(buf, 12, 7)?,
        type_code: layout::read_text(buf, 19, 2)?,
        key: MessageKey(layout::read_4(buf, 21)?),
        message_file: layout::read_text(buf, 25, 10)?,
        message_file_library: layout::read_text(buf, 35, 10)?,
        sender_job: layout::read_text(buf, 45, 10)?,
        sender_user: layout::read_text(buf, 55, 10)?,
        sender_job_number: layout::read_text(buf, 65, 6)?,
        sender_program: layout::read_text(buf, 71, 12)?,
        date_sent: layout::read_text(buf, 83, 7)?,
        time_sent: layout::read_text(buf, 90, 6)?,
        reply_status: layout::read_text(buf, 96, 1)?,
        substitution_data: layout::read_bytes(buf, subst_at, subst_len)?.to_vec(),
        text: section_text(layout::read_bytes(buf, text_at, text_len)?),
        help: section_text(layout::read_bytes(buf, help_at, help_len)?),
        bytes_available,
        truncated: subst_len < subst_avail || text_len < text_avail || help_len < help_avail,
    }))
}

fn section_text(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}

/// The answer a host gives when no message matched.
pub fn not_found_record() -> Vec<u8> {
    vec![0u8; 8]
}

/// Encodes `record` into at most `buffer_len` bytes, cutting the trailing
/// sections in order when they do not fit.
pub fn encode_received(record: &ReceivedRecord, buffer_len: usize) -> Result<Vec<u8>, Error> {
    if buffer_len < RECEIVE_HEADER_LEN {
        return Err(Error::new(ErrorKind::Usage).with_message(format!(
            "receive buffer of {buffer_len} bytes cannot hold the {RECEIVE_HEADER_LEN} byte header"
        )));
    }
    let sections: [&[u8]; 3] = [
        &record.substitution_data,
        record.text.as_bytes(),
        record.help.as_bytes(),
    ];
    let available = RECEIVE_HEADER_LEN + sections.iter().map(|s| s.len()).sum::<usize>();

    let mut out = vec![0u8; RECEIVE_HEADER_LEN];
    layout::write_u32(&mut out, 4, layout::to_u32(available)?);
    layout::write_i32(&mut out, 8, record.severity);
    layout::write_text(&mut out, 12, 7, &record.message_id);
    layout::write_text(&mut out, 19, 2, &record.type_code);
    out[21..25].copy_from_slice(&record.key.0);
    layout::write_text(&mut out, 25, 10, &record.message_file);
    layout::write_text(&mut out, 35, 10, &record.message_file_library);
    layout::write_text(&mut out, 45, 10, &record.sender_job);
    layout::write_text(&mut out, 55, 10, &record.sender_user);
    layout::write_text(&mut out, 65, 6, &record.sender_job_number);
    layout::write_text(&mut out, 71, 12, &record.sender_program);
    layout::write_text(&mut out, 83, 7, &record.date_sent);
    layout::write_text(&mut out, 90, 6, &record.time_sent);
    layout::write_text(&mut out, 96, 1, &record.reply_status);
    out[97..100].fill(BLANK);

    for (i, section) in sections.iter().enumerate() {
        let room = buffer_len - out.len();
        let take = section.len().min(room);
        let at = SECTION_LENGTHS + i * 8;
        layout::write_u32(&mut out, at, layout::to_u32(take)?);
        layout::write_u32(&mut out, at + 4, layout::to_u32(section.len())?);
        out.extend_from_slice(&section[..take]);
    }
    let returned = layout::to_u32(out.len())?;
    layout::write_u32(&mut out, 0, returned);
    Ok(out)
}
