//! Purpose: One message queue seen through a list session plus direct queue operations.
//! Exports: `MessageQueue`.
//! Role: Facade the CLI and library users work with.
//! Invariants: Anything that can change the queue's contents invalidates the session.
//! Invariants: Argument checks happen before any gateway call.
#![allow(clippy::result_large_err)]

use super::gateway::{
    ApiResult, QueueIdentity, RemoteCallGateway, RemoveRequest, RemoveSelection, ReplyRequest,
    SendKind, SendRequest,
};
use super::message::QueuedMessage;
use super::receive::{receive_message, ReceiveAction, ReceiveOptions, Received};
use super::session::ListSession;
use crate::core::criteria::SelectionCriteria;
use crate::core::error::{Error, ErrorKind};
use crate::core::fetch::{GrowthPolicy, RecordCount, StartAt};
use crate::core::token::MessageKey;
use std::sync::Arc;

pub const MAX_TEXT_LEN: usize = 512;
pub const MAX_REPLY_LEN: usize = 132;

pub struct MessageQueue {
    session: ListSession,
}

impl MessageQueue {
    pub fn new(gateway: Arc<dyn RemoteCallGateway>, queue: QueueIdentity) -> Self {
        Self {
            session: ListSession::new(gateway, queue),
        }
    }

    pub fn with_policy(self, policy: GrowthPolicy) -> Self {
        Self {
            session: self.session.with_policy(policy),
        }
    }

    pub fn identity(&self) -> &QueueIdentity {
        self.session.queue()
    }

    pub fn session(&self) -> &ListSession {
        &self.session
    }

    pub fn criteria(&self) -> SelectionCriteria {
        self.session.criteria()
    }

    pub fn set_criteria(&self, criteria: SelectionCriteria) -> ApiResult<()> {
        self.session.set_criteria(criteria)
    }

    pub fn len(&self) -> ApiResult<u32> {
        self.session.len()
    }

    pub fn is_empty(&self) -> ApiResult<bool> {
        self.session.is_empty()
    }

    pub fn messages(&self, start: StartAt, count: RecordCount) -> ApiResult<Vec<QueuedMessage>> {
        let (criteria, entries) = self.session.entries_with_criteria(start, count)?;
        Ok(entries
            .iter()
            .map(|entry| QueuedMessage::from_entry(entry, criteria.help_formatting))
            .collect())
    }

    pub fn all_messages(&self) -> ApiResult<Vec<QueuedMessage>> {
        let (criteria, entries) = self.session.all_with_criteria()?;
        Ok(entries
            .iter()
            .map(|entry| QueuedMessage::from_entry(entry, criteria.help_formatting))
            .collect())
    }

    pub fn receive(&self, options: &ReceiveOptions) -> ApiResult<Received> {
        options.validate()?;
        let result = receive_message(self.session.gateway().as_ref(), self.identity(), options);
        if options.action != ReceiveAction::Same {
            self.session.invalidate();
        }
        result
    }

    pub fn send_informational(&self, text: &str) -> ApiResult<MessageKey> {
        self.send(text, SendKind::Informational)
    }

    /// Sends an inquiry; the host puts a sender's copy on `reply_queue`.
    pub fn send_inquiry(&self, text: &str, reply_queue: QueueIdentity) -> ApiResult<MessageKey> {
        self.send(text, SendKind::Inquiry { reply_queue })
    }

    fn send(&self, text: &str, kind: SendKind) -> ApiResult<MessageKey> {
        ensure_text("message", text, MAX_TEXT_LEN)?;
        let result = self.session.gateway().send_message(&SendRequest {
            queue: self.identity().clone(),
            text: text.to_string(),
            kind,
        });
        self.session.invalidate();
        let key = result?;
        tracing::debug!(queue = %self.identity(), %key, "sent message");
        Ok(key)
    }

    pub fn reply(&self, key: MessageKey, text: &str) -> ApiResult<()> {
        ensure_text("reply", text, MAX_REPLY_LEN)?;
        if key.is_blank() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("reply requires the key of an inquiry message"));
        }
        let result = self.session.gateway().send_reply(&ReplyRequest {
            queue: self.identity().clone(),
            key,
            text: text.to_string(),
        });
        self.session.invalidate();
        result
    }

    pub fn remove(&self, selection: RemoveSelection) -> ApiResult<()> {
        let result = self.session.gateway().remove_messages(&RemoveRequest {
            queue: self.identity().clone(),
            selection,
        });
        self.session.invalidate();
        result
    }

    pub fn close(&self) -> ApiResult<()> {
        self.session.close()
    }
}

fn ensure_text(what: &str, text: &str, max: usize) -> ApiResult<()> {
    if text.trim().is_empty() {
        return Err(Error::new(ErrorKind::Usage).with_message(format!("{what} text is empty")));
    }
    if text.len() > max {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("{what} text is {} bytes; the limit is {max}", text.len())));
    }
    Ok(())
}
