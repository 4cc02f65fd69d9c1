//! Purpose: Define the remote call boundary every list and queue operation goes through.
//! Exports: `RemoteCallGateway`, `QueueIdentity`, request/answer types.
//! Role: Seam between the list protocol and a concrete transport or host.
//! Invariants: Every call blocks until the host answers; there is no cancellation.
//! Invariants: Failed calls return `ErrorKind::Transport` with host messages attached verbatim.
#![allow(clippy::result_large_err)]

use super::receive::{ReceiveAction, ReceiveSelection, WaitTime};
use crate::core::error::{Error, ErrorKind};
use crate::core::fetch::{FetchedPage, RecordCount, StartAt};
use crate::core::list_info::ListInfo;
use crate::core::token::{ListHandle, MessageKey};
use std::fmt;
use std::str::FromStr;

pub type ApiResult<T> = Result<T, Error>;

pub const MAX_NAME_LEN: usize = 10;

/// A message queue on the host: the caller's own user queue or `LIB/NAME`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum QueueIdentity {
    Current,
    Qualified { library: String, name: String },
}

impl QueueIdentity {
    pub fn qualified(library: impl Into<String>, name: impl Into<String>) -> ApiResult<Self> {
        let library = library.into().to_ascii_uppercase();
        let name = name.into().to_ascii_uppercase();
        ensure_object_name("library", &library)?;
        ensure_object_name("queue", &name)?;
        Ok(Self::Qualified { library, name })
    }
}

impl fmt::Display for QueueIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueIdentity::Current => f.write_str("*CURRENT"),
            QueueIdentity::Qualified { library, name } => write!(f, "{library}/{name}"),
        }
    }
}

impl FromStr for QueueIdentity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("*CURRENT") {
            return Ok(QueueIdentity::Current);
        }
        match s.split_once('/') {
            Some((library, name)) => QueueIdentity::qualified(library, name),
            None => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("invalid message queue {s:?}"))
                .with_hint("Use LIBRARY/QUEUE or *CURRENT.")),
        }
    }
}

fn ensure_object_name(what: &str, name: &str) -> ApiResult<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '#' | '@' | '$' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::new(ErrorKind::Usage)
            .with_message(format!("invalid {what} name {name:?}"))
            .with_hint("Object names are 1 to 10 characters: letters, digits, # @ $ _ or '.'."))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OpenListRequest {
    pub queue: QueueIdentity,
    pub selection: Vec<u8>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OpenedList {
    pub handle: ListHandle,
    pub info: ListInfo,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FetchRequest {
    pub handle: ListHandle,
    pub buffer_len: usize,
    pub count: RecordCount,
    pub start: StartAt,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReceiveRequest {
    pub queue: QueueIdentity,
    pub selection: ReceiveSelection,
    pub key: MessageKey,
    pub wait: WaitTime,
    pub action: ReceiveAction,
    pub buffer_len: usize,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SendKind {
    Informational,
    Inquiry { reply_queue: QueueIdentity },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SendRequest {
    pub queue: QueueIdentity,
    pub text: String,
    pub kind: SendKind,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReplyRequest {
    pub queue: QueueIdentity,
    pub key: MessageKey,
    pub text: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RemoveSelection {
    Key(MessageKey),
    All,
    KeepUnanswered,
    Old,
    New,
}

impl RemoveSelection {
    pub fn as_str(self) -> &'static str {
        match self {
            RemoveSelection::Key(_) => "*BYKEY",
            RemoveSelection::All => "*ALL",
            RemoveSelection::KeepUnanswered => "*KEEPUNANS",
            RemoveSelection::Old => "*OLD",
            RemoveSelection::New => "*NEW",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoveRequest {
    pub queue: QueueIdentity,
    pub selection: RemoveSelection,
}

/// The host programs this crate calls, abstracted from their real names.
pub trait RemoteCallGateway: Send + Sync {
    /// Starts building a filtered list and returns its handle.
    fn open_list(&self, request: &OpenListRequest) -> ApiResult<OpenedList>;

    /// Blocks until the list is built; the answer carries the total count.
    fn list_length(&self, handle: ListHandle) -> ApiResult<ListInfo>;

    fn fetch_entries(&self, request: &FetchRequest) -> ApiResult<FetchedPage>;

    fn close_list(&self, handle: ListHandle) -> ApiResult<()>;

    fn receive_one(&self, request: &ReceiveRequest) -> ApiResult<Vec<u8>>;

    fn send_message(&self, request: &SendRequest) -> ApiResult<MessageKey>;

    fn send_reply(&self, request: &ReplyRequest) -> ApiResult<()>;

    fn remove_messages(&self, request: &RemoveRequest) -> ApiResult<()>;
}

#[cfg(test)]
mod tests {
    use super::QueueIdentity;
    use crate::core::error::ErrorKind;

    #[test]
    fn queue_identity_parses_and_uppercases() {
        let queue: QueueIdentity = "qsys/qsysopr".parse().expect("queue");
        assert_eq!(queue.to_string(), "QSYS/QSYSOPR");
        assert_eq!("*current".parse::<QueueIdentity>().expect("current"), QueueIdentity::Current);
    }

    #[test]
    fn queue_identity_rejects_bad_names() {
        for raw in ["QSYSOPR", "/Q", "LIB/", "LIB/WAYTOOLONGNAME", "LIB/A B", "A/B/C"] {
            let err = raw.parse::<QueueIdentity>().expect_err(raw);
            assert_eq!(err.kind(), ErrorKind::Usage);
        }
    }
}
