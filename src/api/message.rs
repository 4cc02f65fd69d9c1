//! Purpose: Typed views of queue messages built from decoded list entries and receive records.
//! Exports: `MessageType`, `ReplyStatus`, `QueuedMessage`, `ReceivedMessage`.
//! Role: Stable message shape for the queue facade and the CLI.
//! Invariants: Help text is formatted according to the criteria the list was opened with.
//! Invariants: Unknown type codes are kept verbatim in `MessageType::Other`.

use crate::core::criteria::HelpFormatting;
use crate::core::format::{parse_host_timestamp, substitute_formatting};
use crate::core::receive_format::ReceivedRecord;
use crate::core::record::{field_id, FieldValue, ListEntry};
use crate::core::token::MessageKey;
use std::fmt;
use time::PrimitiveDateTime;

const TYPE_CODES: [(MessageType, &str); 14] = [
    (MessageType::Completion, "01"),
    (MessageType::Diagnostic, "02"),
    (MessageType::Informational, "04"),
    (MessageType::Inquiry, "05"),
    (MessageType::SendersCopy, "06"),
    (MessageType::Request, "08"),
    (MessageType::RequestWithPrompting, "10"),
    (MessageType::Notify, "14"),
    (MessageType::Escape, "15"),
    (MessageType::Reply, "21"),
    (MessageType::ReplyValidityChecked, "22"),
    (MessageType::ReplyMessageDefault, "23"),
    (MessageType::ReplySystemDefault, "24"),
    (MessageType::ReplyFromReplyList, "25"),
];

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum MessageType {
    Completion,
    Diagnostic,
    Informational,
    Inquiry,
    SendersCopy,
    Request,
    RequestWithPrompting,
    Notify,
    Escape,
    Reply,
    ReplyValidityChecked,
    ReplyMessageDefault,
    ReplySystemDefault,
    ReplyFromReplyList,
    Other(String),
}

impl MessageType {
    pub fn from_code(code: &str) -> Self {
        TYPE_CODES
            .iter()
            .find(|(_, known)| *known == code)
            .map(|(message_type, _)| message_type.clone())
            .unwrap_or_else(|| MessageType::Other(code.to_string()))
    }

    pub fn code(&self) -> &str {
        if let MessageType::Other(code) = self {
            return code;
        }
        TYPE_CODES
            .iter()
            .find(|(message_type, _)| message_type == self)
            .map_or("", |(_, code)| *code)
    }

    pub fn is_reply(&self) -> bool {
        matches!(
            self,
            MessageType::Reply
                | MessageType::ReplyValidityChecked
                | MessageType::ReplyMessageDefault
                | MessageType::ReplySystemDefault
                | MessageType::ReplyFromReplyList
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Completion => "completion",
            MessageType::Diagnostic => "diagnostic",
            MessageType::Informational => "informational",
            MessageType::Inquiry => "inquiry",
            MessageType::SendersCopy => "senders_copy",
            MessageType::Request => "request",
            MessageType::RequestWithPrompting => "request_with_prompting",
            MessageType::Notify => "notify",
            MessageType::Escape => "escape",
            MessageType::Reply => "reply",
            MessageType::ReplyValidityChecked => "reply_validity_checked",
            MessageType::ReplyMessageDefault => "reply_message_default",
            MessageType::ReplySystemDefault => "reply_system_default",
            MessageType::ReplyFromReplyList => "reply_from_reply_list",
            MessageType::Other(code) => return write!(f, "type_{code}"),
        };
        f.write_str(name)
    }
}

/// Whether an inquiry still waits for its answer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ReplyStatus {
    Answered,
    Waiting,
    NotAccepted,
}

impl ReplyStatus {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "A" => Some(ReplyStatus::Answered),
            "W" => Some(ReplyStatus::Waiting),
            "N" => Some(ReplyStatus::NotAccepted),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            ReplyStatus::Answered => "A",
            ReplyStatus::Waiting => "W",
            ReplyStatus::NotAccepted => "N",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct QueuedMessage {
    pub key: MessageKey,
    pub severity: i32,
    pub message_id: String,
    pub message_type: MessageType,
    pub message_file: String,
    pub message_file_library: String,
    pub queue: String,
    pub queue_library: String,
    pub text: String,
    pub help: String,
    pub substitution_data: Vec<u8>,
    pub default_reply: Option<String>,
    pub sender_job: Option<String>,
    pub reply_status: Option<ReplyStatus>,
    pub sent_at: Option<PrimitiveDateTime>,
}

impl QueuedMessage {
    pub fn from_entry(entry: &ListEntry, help_formatting: HelpFormatting) -> Self {
        let help = entry
            .text_field(field_id::MESSAGE_HELP_FORMATTED)
            .or_else(|| entry.text_field(field_id::MESSAGE_HELP))
            .unwrap_or_default();
        let help = match help_formatting {
            HelpFormatting::SubstituteFormattingCharacters => substitute_formatting(help),
            _ => help.to_string(),
        };
        let substitution_data = match entry.field(field_id::REPLACEMENT_DATA) {
            Some(FieldValue::MultiValue(items)) => items.concat(),
            Some(FieldValue::Text(text)) => text.as_bytes().to_vec(),
            _ => Vec::new(),
        };
        let non_empty = |id| {
            entry
                .text_field(id)
                .filter(|text| !text.is_empty())
                .map(str::to_string)
        };
        Self {
            key: entry.key,
            severity: entry.severity,
            message_id: entry.message_id.clone(),
            message_type: MessageType::from_code(&entry.type_code),
            message_file: entry.message_file.clone(),
            message_file_library: entry.message_file_library.clone(),
            queue: entry.queue.clone(),
            queue_library: entry.queue_library.clone(),
            text: entry
                .text_field(field_id::MESSAGE_TEXT)
                .unwrap_or_default()
                .to_string(),
            help,
            substitution_data,
            default_reply: non_empty(field_id::DEFAULT_REPLY),
            sender_job: non_empty(field_id::SENDER_JOB),
            reply_status: entry
                .text_field(field_id::REPLY_STATUS)
                .and_then(ReplyStatus::from_code),
            sent_at: parse_host_timestamp(&entry.date_sent, &entry.time_sent),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReceivedMessage {
    pub key: MessageKey,
    pub severity: i32,
    pub message_id: String,
    pub message_type: MessageType,
    pub message_file: String,
    pub message_file_library: String,
    pub sender_job: String,
    pub sender_user: String,
    pub sender_job_number: String,
    pub sender_program: String,
    pub text: String,
    pub help: String,
    pub substitution_data: Vec<u8>,
    pub reply_status: Option<ReplyStatus>,
    pub sent_at: Option<PrimitiveDateTime>,
    /// Text or help was cut and could not be received again in full.
    pub truncated: bool,
}

impl ReceivedMessage {
    pub fn from_record(record: ReceivedRecord) -> Self {
        Self {
            key: record.key,
            severity: record.severity,
            message_id: record.message_id,
            message_type: MessageType::from_code(&record.type_code),
            message_file: record.message_file,
            message_file_library: record.message_file_library,
            sent_at: parse_host_timestamp(&record.date_sent, &record.time_sent),
            sender_job: record.sender_job,
            sender_user: record.sender_user,
            sender_job_number: record.sender_job_number,
            sender_program: record.sender_program,
            text: record.text,
            help: record.help,
            substitution_data: record.substitution_data,
            reply_status: ReplyStatus::from_code(&record.reply_status),
            truncated: record.truncated,
        }
    }
}
