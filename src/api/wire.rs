//! Purpose: JSON bodies of the `/v0` bridge protocol, shared by the HTTP gateway and the server.
//! Exports: request/response bodies, `ErrorEnvelope`, conversions to and from gateway types.
//! Role: Single definition of the bridge wire format.
//! Invariants: Host buffers travel as JSON arrays of bytes, never re-encoded.
//! Invariants: Handles and keys travel as 8 upper-case hex digits.
#![allow(clippy::result_large_err)]

use super::gateway::{
    ApiResult, FetchRequest, OpenListRequest, OpenedList, QueueIdentity, ReceiveRequest,
    RemoveRequest, RemoveSelection, ReplyRequest, SendKind, SendRequest,
};
use super::receive::{ReceiveAction, ReceiveSelection, WaitTime};
use crate::core::error::{Error, ErrorKind, HostMessage};
use crate::core::fetch::{FetchedPage, RecordCount, StartAt};
use crate::core::list_info::{ListInfo, ListStatus};
use crate::core::token::{ListHandle, MessageKey};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize)]
pub struct OpenListBody {
    pub queue: String,
    pub selection: Vec<u8>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct OpenedListBody {
    pub handle: String,
    pub info: Vec<u8>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ListInfoBody {
    pub info: Vec<u8>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct FetchBody {
    pub buffer_len: usize,
    pub count: i32,
    pub start: i32,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct FetchedBody {
    pub data: Vec<u8>,
    pub bytes_returned: usize,
    pub bytes_available: usize,
    pub info: Vec<u8>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ReceiveBody {
    pub queue: String,
    pub selection: String,
    pub key: String,
    pub wait: i32,
    pub action: String,
    pub buffer_len: usize,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RecordBody {
    pub record: Vec<u8>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SendBody {
    pub queue: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_queue: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct KeyBody {
    pub key: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ReplyBody {
    pub queue: String,
    pub key: String,
    pub text: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RemoveBody {
    pub queue: String,
    pub selection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DoneBody {
    pub ok: bool,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ErrorBody {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub host_messages: Vec<HostMessageBody>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct HostMessageBody {
    pub id: String,
    pub severity: i32,
    pub text: String,
}

impl OpenListBody {
    pub fn from_request(request: &OpenListRequest) -> Self {
        Self {
            queue: request.queue.to_string(),
            selection: request.selection.clone(),
        }
    }

    pub fn into_request(self) -> ApiResult<OpenListRequest> {
        Ok(OpenListRequest {
            queue: self.queue.parse()?,
            selection: self.selection,
        })
    }
}

impl OpenedListBody {
    pub fn from_opened(opened: &OpenedList) -> Self {
        Self {
            handle: opened.handle.to_string(),
            info: opened.info.encode().to_vec(),
        }
    }

    pub fn into_opened(self) -> ApiResult<OpenedList> {
        Ok(OpenedList {
            handle: self.handle.parse()?,
            info: ListInfo::decode(&self.info)?,
        })
    }
}

impl FetchBody {
    pub fn from_request(request: &FetchRequest) -> Self {
        Self {
            buffer_len: request.buffer_len,
            count: request.count.to_wire(),
            start: request.start.to_wire(),
        }
    }

    pub fn into_request(self, handle: ListHandle) -> ApiResult<FetchRequest> {
        Ok(FetchRequest {
            handle,
            buffer_len: self.buffer_len,
            count: RecordCount::from_wire(self.count)?,
            start: StartAt::from_wire(self.start)?,
        })
    }
}

impl FetchedBody {
    pub fn from_page(page: &FetchedPage) -> Self {
        Self {
            data: page.data.clone(),
            bytes_returned: page.bytes_returned,
            bytes_available: page.bytes_available,
            info: page.info.encode().to_vec(),
        }
    }

    pub fn into_page(self) -> ApiResult<FetchedPage> {
        Ok(FetchedPage {
            info: ListInfo::decode(&self.info)?,
            data: self.data,
            bytes_returned: self.bytes_returned,
            bytes_available: self.bytes_available,
        })
    }
}

impl ReceiveBody {
    pub fn from_request(request: &ReceiveRequest) -> Self {
        Self {
            queue: request.queue.to_string(),
            selection: request.selection.as_str().to_string(),
            key: request.key.to_string(),
            wait: request.wait.to_wire(),
            action: request.action.as_str().to_string(),
            buffer_len: request.buffer_len,
        }
    }

    pub fn into_request(self) -> ApiResult<ReceiveRequest> {
        Ok(ReceiveRequest {
            queue: self.queue.parse()?,
            selection: ReceiveSelection::parse(&self.selection)?,
            key: self.key.parse()?,
            wait: WaitTime::from_wire(self.wait)?,
            action: ReceiveAction::parse(&self.action)?,
            buffer_len: self.buffer_len,
        })
    }
}

impl SendBody {
    pub fn from_request(request: &SendRequest) -> Self {
        let reply_queue = match &request.kind {
            SendKind::Informational => None,
            SendKind::Inquiry { reply_queue } => Some(reply_queue.to_string()),
        };
        Self {
            queue: request.queue.to_string(),
            text: request.text.clone(),
            reply_queue,
        }
    }

    pub fn into_request(self) -> ApiResult<SendRequest> {
        let kind = match self.reply_queue {
            None => SendKind::Informational,
            Some(raw) => SendKind::Inquiry {
                reply_queue: raw.parse()?,
            },
        };
        Ok(SendRequest {
            queue: self.queue.parse()?,
            text: self.text,
            kind,
        })
    }
}

impl ReplyBody {
    pub fn from_request(request: &ReplyRequest) -> Self {
        Self {
            queue: request.queue.to_string(),
            key: request.key.to_string(),
            text: request.text.clone(),
        }
    }

    pub fn into_request(self) -> ApiResult<ReplyRequest> {
        Ok(ReplyRequest {
            queue: self.queue.parse()?,
            key: self.key.parse()?,
            text: self.text,
        })
    }
}

impl RemoveBody {
    pub fn from_request(request: &RemoveRequest) -> Self {
        let key = match request.selection {
            RemoveSelection::Key(key) => Some(key.to_string()),
            _ => None,
        };
        Self {
            queue: request.queue.to_string(),
            selection: request.selection.as_str().to_string(),
            key,
        }
    }

    pub fn into_request(self) -> ApiResult<RemoveRequest> {
        let queue: QueueIdentity = self.queue.parse()?;
        let selection = match (self.selection.as_str(), self.key) {
            ("*BYKEY", Some(key)) => RemoveSelection::Key(key.parse::<MessageKey>()?),
            ("*BYKEY", None) => {
                return Err(Error::new(ErrorKind::Usage).with_message("*BYKEY removal needs a key"));
            }
            ("*ALL", _) => RemoveSelection::All,
            ("*KEEPUNANS", _) => RemoveSelection::KeepUnanswered,
            ("*OLD", _) => RemoveSelection::Old,
            ("*NEW", _) => RemoveSelection::New,
            (other, _) => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!("unknown removal selection {other:?}")));
            }
        };
        Ok(RemoveRequest { queue, selection })
    }
}

impl ErrorBody {
    pub fn from_error(err: &Error) -> Self {
        Self {
            kind: format!("{:?}", err.kind()),
            message: err.message().map(str::to_string),
            hint: err.hint().map(str::to_string),
            status: err.status().map(|status| format!("{status:?}")),
            host_messages: err
                .host_messages()
                .iter()
                .map(|message| HostMessageBody {
                    id: message.id.clone(),
                    severity: message.severity,
                    text: message.text.clone(),
                })
                .collect(),
        }
    }

    pub fn into_error(self) -> Error {
        let mut err = Error::new(parse_error_kind(&self.kind)).with_host_messages(
            self.host_messages
                .into_iter()
                .map(|message| HostMessage::new(message.id, message.severity, message.text)),
        );
        if let Some(message) = self.message {
            err = err.with_message(message);
        }
        if let Some(hint) = self.hint {
            err = err.with_hint(hint);
        }
        if let Some(status) = self.status.as_deref().and_then(parse_status) {
            err = err.with_status(status);
        }
        err
    }
}

pub fn parse_error_kind(kind: &str) -> ErrorKind {
    match kind {
        "Usage" => ErrorKind::Usage,
        "Transport" => ErrorKind::Transport,
        "ListStatus" => ErrorKind::ListStatus,
        "Corrupt" => ErrorKind::Corrupt,
        _ => ErrorKind::Internal,
    }
}

fn parse_status(status: &str) -> Option<ListStatus> {
    Some(match status {
        "NoErrors" => ListStatus::NoErrors,
        "NoAuthority" => ListStatus::NoAuthority,
        "Damaged" => ListStatus::Damaged,
        "Locked" => ListStatus::Locked,
        "PartiallyDamaged" => ListStatus::PartiallyDamaged,
        "Incomplete" => ListStatus::Incomplete,
        "Complete" => ListStatus::Complete,
        "Partial" => ListStatus::Partial,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::{ErrorBody, ErrorEnvelope, RemoveBody};
    use crate::api::gateway::{QueueIdentity, RemoveRequest, RemoveSelection};
    use crate::core::error::{Error, ErrorKind, HostMessage};
    use crate::core::list_info::ListStatus;
    use crate::core::token::MessageKey;

    #[test]
    fn error_envelope_keeps_host_messages_and_status() {
        let err = Error::new(ErrorKind::ListStatus)
            .with_message("list is not readable")
            .with_status(ListStatus::Locked)
            .with_host_message(HostMessage::new("CPF2451", 40, "Message queue is allocated."));
        let json = serde_json::to_string(&ErrorEnvelope { error: ErrorBody::from_error(&err) })
            .expect("json");
        let back: ErrorEnvelope = serde_json::from_str(&json).expect("parse");
        let err = back.error.into_error();
        assert_eq!(err.kind(), ErrorKind::ListStatus);
        assert_eq!(err.status(), Some(ListStatus::Locked));
        assert_eq!(err.host_messages()[0].id, "CPF2451");
    }

    #[test]
    fn removal_by_key_carries_the_key() {
        let request = RemoveRequest {
            queue: QueueIdentity::Current,
            selection: RemoveSelection::Key(MessageKey::from_u32(9)),
        };
        let body = RemoveBody::from_request(&request);
        assert_eq!(body.key.as_deref(), Some("00000009"));
        assert_eq!(body.into_request().expect("request"), request);
    }

    #[test]
    fn unknown_error_kind_is_internal() {
        let body: ErrorBody = serde_json::from_str(r#"{"kind":"Bogus"}"#).expect("parse");
        assert_eq!(body.into_error().kind(), ErrorKind::Internal);
    }
}
