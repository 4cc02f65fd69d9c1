//! Purpose: Receive exactly one message from a queue, without a list handle.
//! Exports: `ReceiveSelection`, `ReceiveAction`, `WaitTime`, `ReceiveOptions`, `Received`,
//! `receive_message`.
//! Role: Peer of the list session; shares the codecs but not the handle lifecycle.
//! Invariants: Key requirements are validated before any gateway call.
//! Invariants: The all-zero answer is `Received::NotFound`, never an error.
//! Invariants: A truncated record is re-received by key only if it is still on the queue.
#![allow(clippy::result_large_err)]

use super::gateway::{ApiResult, QueueIdentity, ReceiveRequest, RemoteCallGateway};
use super::message::ReceivedMessage;
use crate::core::error::{Error, ErrorKind};
use crate::core::receive_format::{decode_received, RECEIVE_HEADER_LEN};
use crate::core::token::MessageKey;

/// Which message a receive picks.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ReceiveSelection {
    Any,
    Completion,
    Copy,
    Diagnostic,
    First,
    Informational,
    Inquiry,
    Last,
    Next,
    Previous,
    Reply,
}

const SELECTIONS: [(ReceiveSelection, &str); 11] = [
    (ReceiveSelection::Any, "*ANY"),
    (ReceiveSelection::Completion, "*COMP"),
    (ReceiveSelection::Copy, "*COPY"),
    (ReceiveSelection::Diagnostic, "*DIAG"),
    (ReceiveSelection::First, "*FIRST"),
    (ReceiveSelection::Informational, "*INFO"),
    (ReceiveSelection::Inquiry, "*INQ"),
    (ReceiveSelection::Last, "*LAST"),
    (ReceiveSelection::Next, "*NEXT"),
    (ReceiveSelection::Previous, "*PRV"),
    (ReceiveSelection::Reply, "*RPY"),
];

impl ReceiveSelection {
    pub fn as_str(self) -> &'static str {
        SELECTIONS
            .iter()
            .find(|(selection, _)| *selection == self)
            .map_or("*ANY", |(_, name)| *name)
    }

    pub fn parse(raw: &str) -> ApiResult<Self> {
        let upper = raw.trim().to_ascii_uppercase();
        SELECTIONS
            .iter()
            .find(|(_, name)| *name == upper || name[1..] == upper)
            .map(|(selection, _)| *selection)
            .ok_or_else(|| {
                Error::new(ErrorKind::Usage)
                    .with_message(format!("unknown message selection {raw:?}"))
                    .with_hint("Use one of *ANY, *COMP, *COPY, *DIAG, *FIRST, *INFO, *INQ, *LAST, *NEXT, *PRV, *RPY.")
            })
    }

    pub fn requires_key(self) -> bool {
        matches!(
            self,
            ReceiveSelection::Copy
                | ReceiveSelection::Next
                | ReceiveSelection::Previous
                | ReceiveSelection::Reply
        )
    }

    pub fn forbids_key(self) -> bool {
        matches!(self, ReceiveSelection::First | ReceiveSelection::Last)
    }
}

/// What happens to a message once it has been received.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ReceiveAction {
    /// Keep it on the queue, marked as old.
    Old,
    Remove,
    /// Leave it exactly as it was.
    Same,
}

impl ReceiveAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ReceiveAction::Old => "*OLD",
            ReceiveAction::Remove => "*REMOVE",
            ReceiveAction::Same => "*SAME",
        }
    }

    pub fn parse(raw: &str) -> ApiResult<Self> {
        match raw.trim().trim_start_matches('*').to_ascii_uppercase().as_str() {
            "OLD" => Ok(ReceiveAction::Old),
            "REMOVE" => Ok(ReceiveAction::Remove),
            "SAME" => Ok(ReceiveAction::Same),
            _ => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unknown receive action {raw:?}"))
                .with_hint("Use *OLD, *REMOVE or *SAME.")),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum WaitTime {
    NoWait,
    Seconds(u32),
    Forever,
}

impl WaitTime {
    pub fn to_wire(self) -> i32 {
        match self {
            WaitTime::NoWait => 0,
            WaitTime::Seconds(seconds) => seconds.min(i32::MAX as u32) as i32,
            WaitTime::Forever => -1,
        }
    }

    pub fn from_wire(value: i32) -> ApiResult<Self> {
        match value {
            0 => Ok(WaitTime::NoWait),
            -1 => Ok(WaitTime::Forever),
            seconds if seconds > 0 => Ok(WaitTime::Seconds(seconds as u32)),
            other => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("invalid wait time {other}"))
                .with_hint("Use 0 for no wait, -1 to wait forever, or a number of seconds.")),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReceiveOptions {
    pub selection: ReceiveSelection,
    pub key: Option<MessageKey>,
    pub wait: WaitTime,
    pub action: ReceiveAction,
    pub buffer_len: usize,
    /// Upper bound for the re-receive of a truncated message.
    pub max_buffer_len: usize,
}

impl ReceiveOptions {
    pub fn new(selection: ReceiveSelection) -> Self {
        Self {
            selection,
            key: None,
            wait: WaitTime::NoWait,
            action: ReceiveAction::Old,
            buffer_len: 4096,
            max_buffer_len: 1024 * 1024,
        }
    }

    pub fn with_key(mut self, key: MessageKey) -> Self {
        self.key = Some(key);
        self
    }

    pub fn with_wait(mut self, wait: WaitTime) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_action(mut self, action: ReceiveAction) -> Self {
        self.action = action;
        self
    }

    pub fn with_buffer_len(mut self, buffer_len: usize) -> Self {
        self.buffer_len = buffer_len;
        self
    }

    pub fn validate(&self) -> ApiResult<()> {
        let key = self.key.filter(|key| !key.is_blank());
        if self.selection.requires_key() && key.is_none() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("{} requires a message key", self.selection.as_str()))
                .with_hint("Pass the key of the message to start from."));
        }
        if self.selection.forbids_key() && key.is_some() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("{} does not take a message key", self.selection.as_str())));
        }
        if let WaitTime::Seconds(seconds) = self.wait {
            if seconds > i32::MAX as u32 {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!("wait time {seconds}s does not fit the host field")));
            }
        }
        if self.buffer_len < RECEIVE_HEADER_LEN {
            return Err(Error::new(ErrorKind::Usage).with_message(format!(
                "receive buffer must be at least {RECEIVE_HEADER_LEN} bytes"
            )));
        }
        Ok(())
    }
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        Self::new(ReceiveSelection::Any)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Received {
    Message(ReceivedMessage),
    NotFound,
}

impl Received {
    pub fn message(&self) -> Option<&ReceivedMessage> {
        match self {
            Received::Message(message) => Some(message),
            Received::NotFound => None,
        }
    }
}

/// Receives one message; callers holding a list must invalidate it afterwards.
pub fn receive_message(
    gateway: &dyn RemoteCallGateway,
    queue: &QueueIdentity,
    options: &ReceiveOptions,
) -> ApiResult<Received> {
    options.validate()?;
    let request = ReceiveRequest {
        queue: queue.clone(),
        selection: options.selection,
        key: options.key.unwrap_or(MessageKey::BLANK),
        wait: options.wait,
        action: options.action,
        buffer_len: options.buffer_len,
    };
    let raw = gateway.receive_one(&request)?;
    let Some(record) = decode_received(&raw)? else {
        tracing::debug!(%queue, selection = options.selection.as_str(), "no message to receive");
        return Ok(Received::NotFound);
    };
    if !record.truncated || options.action == ReceiveAction::Remove {
        return Ok(Received::Message(ReceivedMessage::from_record(record)));
    }

    let available = record.bytes_available;
    if available > options.max_buffer_len {
        tracing::warn!(
            %queue,
            key = %record.key,
            available,
            "message larger than the receive limit; returning it truncated"
        );
        return Ok(Received::Message(ReceivedMessage::from_record(record)));
    }
    tracing::debug!(%queue, key = %record.key, available, "re-receiving truncated message");
    let retry = ReceiveRequest {
        queue: queue.clone(),
        selection: ReceiveSelection::Any,
        key: record.key,
        wait: WaitTime::NoWait,
        action: ReceiveAction::Same,
        buffer_len: available,
    };
    let raw = gateway.receive_one(&retry)?;
    match decode_received(&raw)? {
        Some(full) => Ok(Received::Message(ReceivedMessage::from_record(full))),
        None => Ok(Received::Message(ReceivedMessage::from_record(record))),
    }
}
