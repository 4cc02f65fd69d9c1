//! Purpose: In-process host holding message queues and the list handles opened against them.
//! Exports: `MemoryHost`, `NewMessage`, `QueueAccess`, `SenderJob`.
//! Role: Host side of `RemoteCallGateway`; backs the bridge server and the tests.
//! Invariants: Lists are snapshots taken at open; later queue changes never show through.
//! Invariants: A list cursor advances only when a page returned every record it asked for.
//! Invariants: Pages hold whole records only; `bytes_available` covers every requested record.
//! Invariants: Unknown queues, handles and keys fail with host diagnostic messages.
#![allow(clippy::result_large_err)]

use crate::api::{
    ApiResult, FetchRequest, MessageType, OpenListRequest, OpenedList, QueueIdentity,
    ReceiveAction, ReceiveRequest, ReceiveSelection, RecordCount, RemoteCallGateway,
    RemoveRequest, RemoveSelection, ReplyRequest, SendKind, SendRequest, StartAt, WaitTime,
};
use crate::core::criteria::{decode_selection, DecodedSelection, FilterKeyword, ListDirection};
use crate::core::error::{Error, ErrorKind, HostMessage};
use crate::core::fetch::FetchedPage;
use crate::core::format::{host_date_time, strip_formatting};
use crate::core::list_info::{BuildState, ListInfo, ListStatus, LIST_INFO_LEN};
use crate::core::receive_format::{encode_received, not_found_record, ReceivedRecord};
use crate::core::record::{encode_entry, field_id, Field, FieldValue, ListEntry};
use crate::core::token::{ListHandle, MessageKey};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use time::{OffsetDateTime, PrimitiveDateTime};

const STATUS_ANSWERED: &str = "A";
const STATUS_WAITING: &str = "W";
const STATUS_NONE: &str = "N";

/// How list requests against a queue behave.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum QueueAccess {
    #[default]
    Normal,
    Damaged,
    Locked,
    NoAuthority,
}

/// Job that sends messages through this host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SenderJob {
    pub name: String,
    pub user: String,
    pub number: String,
    pub program: String,
}

impl SenderJob {
    fn qualified(&self) -> String {
        format!("{}/{}/{}", self.number, self.user, self.name)
    }
}

impl Default for SenderJob {
    fn default() -> Self {
        Self {
            name: "QPADEV0001".to_string(),
            user: "HOSTLIST".to_string(),
            number: "000001".to_string(),
            program: "HOSTLIST".to_string(),
        }
    }
}

/// A message placed directly on a queue, as a host job would.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewMessage {
    pub message_type: MessageType,
    pub severity: i32,
    pub message_id: String,
    pub message_file: String,
    pub message_file_library: String,
    pub text: String,
    pub help: String,
    pub substitution_data: Vec<u8>,
    pub default_reply: String,
    pub sender: SenderJob,
}

impl NewMessage {
    pub fn new(message_type: MessageType, text: impl Into<String>) -> Self {
        let severity = if message_type == MessageType::Inquiry { 99 } else { 0 };
        Self {
            message_type,
            severity,
            message_id: String::new(),
            message_file: String::new(),
            message_file_library: String::new(),
            text: text.into(),
            help: String::new(),
            substitution_data: Vec::new(),
            default_reply: String::new(),
            sender: SenderJob::default(),
        }
    }

    pub fn with_severity(mut self, severity: i32) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_id(
        mut self,
        message_id: impl Into<String>,
        file: impl Into<String>,
        library: impl Into<String>,
    ) -> Self {
        self.message_id = message_id.into();
        self.message_file = file.into();
        self.message_file_library = library.into();
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    pub fn with_substitution_data(mut self, data: Vec<u8>) -> Self {
        self.substitution_data = data;
        self
    }

    pub fn with_default_reply(mut self, reply: impl Into<String>) -> Self {
        self.default_reply = reply.into();
        self
    }
}

#[derive(Clone, Debug)]
struct Link {
    queue: QueueIdentity,
    key: u32,
}

#[derive(Clone, Debug)]
struct StoredMessage {
    key: u32,
    body: NewMessage,
    type_code: String,
    sent_at: PrimitiveDateTime,
    reply_status: &'static str,
    old: bool,
    link: Option<Link>,
}

impl StoredMessage {
    fn needs_reply(&self) -> bool {
        self.type_code == MessageType::Inquiry.code() && self.reply_status == STATUS_WAITING
    }

    fn copy_needs_reply(&self) -> bool {
        self.type_code == MessageType::SendersCopy.code() && self.reply_status == STATUS_WAITING
    }
}

#[derive(Debug, Default)]
struct StoredQueue {
    messages: Vec<StoredMessage>,
    next_key: u32,
    access: QueueAccess,
}

impl StoredQueue {
    fn position(&self, key: u32) -> Option<usize> {
        self.messages.iter().position(|message| message.key == key)
    }
}

#[derive(Debug)]
struct OpenList {
    queue: QueueIdentity,
    entries: Vec<ListEntry>,
    sizes: Vec<usize>,
    cursor: usize,
    info: ListInfo,
}

#[derive(Debug)]
struct HostState {
    current: QueueIdentity,
    queues: BTreeMap<QueueIdentity, StoredQueue>,
    lists: HashMap<ListHandle, OpenList>,
    next_handle: u32,
}

pub struct MemoryHost {
    state: Mutex<HostState>,
    arrived: Condvar,
}

impl MemoryHost {
    /// A host whose `*CURRENT` queue is `QUSRSYS/HOSTLIST`.
    pub fn new() -> Self {
        let current = QueueIdentity::Qualified {
            library: "QUSRSYS".to_string(),
            name: "HOSTLIST".to_string(),
        };
        let mut queues = BTreeMap::new();
        queues.insert(current.clone(), StoredQueue::default());
        Self {
            state: Mutex::new(HostState {
                current,
                queues,
                lists: HashMap::new(),
                next_handle: 0,
            }),
            arrived: Condvar::new(),
        }
    }

    pub fn current_queue(&self) -> QueueIdentity {
        self.lock().current.clone()
    }

    /// Creates `queue` if it does not exist yet.
    pub fn create_queue(&self, queue: &QueueIdentity) -> ApiResult<QueueIdentity> {
        let mut state = self.lock();
        let queue = state.resolve(queue);
        state.queues.entry(queue.clone()).or_default();
        Ok(queue)
    }

    pub fn queues(&self) -> Vec<QueueIdentity> {
        self.lock().queues.keys().cloned().collect()
    }

    pub fn set_access(&self, queue: &QueueIdentity, access: QueueAccess) -> ApiResult<()> {
        let mut state = self.lock();
        let (_, stored) = state.queue_mut(queue)?;
        stored.access = access;
        Ok(())
    }

    /// Places a message on `queue` and wakes waiting receivers.
    pub fn post(&self, queue: &QueueIdentity, message: NewMessage) -> ApiResult<MessageKey> {
        let status = if message.message_type == MessageType::Inquiry {
            STATUS_WAITING
        } else {
            STATUS_NONE
        };
        let mut state = self.lock();
        let key = state.push(queue, message, status, None)?;
        self.arrived.notify_all();
        Ok(MessageKey::from_u32(key))
    }

    /// Handles opened and not yet closed.
    pub fn open_lists(&self) -> Vec<ListHandle> {
        let mut handles: Vec<_> = self.lock().lists.keys().copied().collect();
        handles.sort_by_key(|handle| handle.as_u32());
        handles
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostState {
    fn resolve(&self, queue: &QueueIdentity) -> QueueIdentity {
        match queue {
            QueueIdentity::Current => self.current.clone(),
            other => other.clone(),
        }
    }

    fn queue(&self, queue: &QueueIdentity) -> ApiResult<(QueueIdentity, &StoredQueue)> {
        let resolved = self.resolve(queue);
        match self.queues.get(&resolved) {
            Some(stored) => Ok((resolved, stored)),
            None => Err(queue_not_found(&resolved)),
        }
    }

    fn queue_mut(&mut self, queue: &QueueIdentity) -> ApiResult<(QueueIdentity, &mut StoredQueue)> {
        let resolved = self.resolve(queue);
        match self.queues.get_mut(&resolved) {
            Some(stored) => Ok((resolved, stored)),
            None => Err(queue_not_found(&resolved)),
        }
    }

    fn push(
        &mut self,
        queue: &QueueIdentity,
        body: NewMessage,
        reply_status: &'static str,
        link: Option<Link>,
    ) -> ApiResult<u32> {
        let (_, stored) = self.queue_mut(queue)?;
        stored.next_key += 1;
        let key = stored.next_key;
        stored.messages.push(StoredMessage {
            key,
            type_code: body.message_type.code().to_string(),
            body,
            sent_at: now(),
            reply_status,
            old: false,
            link,
        });
        Ok(key)
    }

    fn list(&mut self, handle: ListHandle) -> ApiResult<&mut OpenList> {
        self.lists.get_mut(&handle).ok_or_else(|| {
            host_error("GUI0002", format!("Request handle {handle} is not valid."))
                .with_hint("The list was closed or never opened on this host.")
        })
    }
}

impl RemoteCallGateway for MemoryHost {
    fn open_list(&self, request: &OpenListRequest) -> ApiResult<OpenedList> {
        let selection = decode_selection(&request.selection).map_err(|err| {
            host_error("CPF3C3C", "Value for selection criteria is not valid.").with_source(err)
        })?;
        let mut state = self.lock();
        let (queue, stored) = state.queue(&request.queue)?;
        let status = match stored.access {
            QueueAccess::Normal => ListStatus::NoErrors,
            QueueAccess::Damaged => ListStatus::Damaged,
            QueueAccess::Locked => ListStatus::Locked,
            QueueAccess::NoAuthority => ListStatus::NoAuthority,
        };
        let entries = if status.is_hard_failure() {
            Vec::new()
        } else {
            snapshot(&queue, stored, &selection)
        };
        let sizes = entries
            .iter()
            .map(|entry| encode_entry(entry, 0).map(|bytes| bytes.len()))
            .collect::<Result<Vec<_>, _>>()?;

        state.next_handle += 1;
        let handle = ListHandle::from_u32(state.next_handle);
        let (date, time) = host_date_time(now());
        let mut info = ListInfo::new(handle);
        info.total_records = entries.len() as u32;
        info.record_length = sizes.iter().copied().max().unwrap_or(0) as u32;
        info.created = format!("{date}{time}");
        info.build_state = BuildState::Built;
        info.status = status;
        info.info_length = LIST_INFO_LEN as u32;
        tracing::debug!(%queue, %handle, total = entries.len(), "opened list");
        state.lists.insert(
            handle,
            OpenList {
                queue,
                entries,
                sizes,
                cursor: 0,
                info: info.clone(),
            },
        );
        Ok(OpenedList { handle, info })
    }

    fn list_length(&self, handle: ListHandle) -> ApiResult<ListInfo> {
        let mut state = self.lock();
        Ok(state.list(handle)?.info.clone())
    }

    fn fetch_entries(&self, request: &FetchRequest) -> ApiResult<FetchedPage> {
        let mut state = self.lock();
        let list = state.list(request.handle)?;
        let first = match request.start {
            StartAt::Cursor => list.cursor,
            StartAt::Record(record) => (record as usize).saturating_sub(1),
        };
        let remaining = list.entries.len().saturating_sub(first);
        let wanted = match request.count {
            RecordCount::All => remaining,
            RecordCount::Exactly(count) => (count as usize).min(remaining),
        };
        let available: usize = list.sizes.iter().skip(first).take(wanted).sum();

        let mut data: Vec<u8> = Vec::new();
        let mut returned = 0usize;
        for entry in list.entries.iter().skip(first).take(wanted) {
            let bytes = encode_entry(entry, data.len())?;
            if data.len() + bytes.len() > request.buffer_len {
                break;
            }
            data.extend_from_slice(&bytes);
            returned += 1;
        }
        if returned == wanted {
            list.cursor = first + returned;
        }

        let mut info = list.info.clone();
        info.records_returned = returned as u32;
        info.first_record = if returned == 0 { 0 } else { first as u32 + 1 };
        tracing::debug!(
            handle = %request.handle,
            queue = %list.queue,
            first,
            returned,
            available,
            "fetched list page"
        );
        Ok(FetchedPage {
            bytes_returned: data.len(),
            bytes_available: available,
            data,
            info,
        })
    }

    fn close_list(&self, handle: ListHandle) -> ApiResult<()> {
        let mut state = self.lock();
        state.list(handle)?;
        state.lists.remove(&handle);
        tracing::debug!(%handle, "closed list");
        Ok(())
    }

    fn receive_one(&self, request: &ReceiveRequest) -> ApiResult<Vec<u8>> {
        let key = (!request.key.is_blank()).then(|| request.key.as_u32());
        let deadline = match request.wait {
            WaitTime::NoWait => Some(Instant::now()),
            WaitTime::Seconds(seconds) => {
                Some(Instant::now() + Duration::from_secs(u64::from(seconds)))
            }
            WaitTime::Forever => None,
        };
        let waits = key.is_none() && waits_for_new(request.selection);

        let mut state = self.lock();
        loop {
            let (queue, stored) = state.queue_mut(&request.queue)?;
            if let Some(index) = select(&queue, stored, request.selection, key)? {
                let record = received_record(&stored.messages[index]);
                match request.action {
                    ReceiveAction::Old => stored.messages[index].old = true,
                    ReceiveAction::Remove => {
                        stored.messages.remove(index);
                    }
                    ReceiveAction::Same => {}
                }
                tracing::debug!(
                    %queue,
                    key = %record.key,
                    action = request.action.as_str(),
                    "received message"
                );
                return encode_received(&record, request.buffer_len);
            }
            if !waits {
                return Ok(not_found_record());
            }
            state = match deadline {
                None => self
                    .arrived
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(not_found_record());
                    }
                    self.arrived
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    fn send_message(&self, request: &SendRequest) -> ApiResult<MessageKey> {
        let mut state = self.lock();
        let (target, _) = state.queue(&request.queue)?;
        let key = match &request.kind {
            SendKind::Informational => {
                let body = NewMessage::new(MessageType::Informational, request.text.clone());
                state.push(&target, body, STATUS_NONE, None)?
            }
            SendKind::Inquiry { reply_queue } => {
                let (reply_queue, _) = state.queue(reply_queue)?;
                let inquiry = NewMessage::new(MessageType::Inquiry, request.text.clone());
                let copy = NewMessage::new(MessageType::SendersCopy, request.text.clone());
                let key = state.push(&target, inquiry, STATUS_WAITING, None)?;
                let copy_key = state.push(
                    &reply_queue,
                    copy,
                    STATUS_WAITING,
                    Some(Link {
                        queue: target.clone(),
                        key,
                    }),
                )?;
                let (_, stored) = state.queue_mut(&target)?;
                if let Some(index) = stored.position(key) {
                    stored.messages[index].link = Some(Link {
                        queue: reply_queue,
                        key: copy_key,
                    });
                }
                key
            }
        };
        self.arrived.notify_all();
        tracing::debug!(queue = %target, key, "sent message");
        Ok(MessageKey::from_u32(key))
    }

    fn send_reply(&self, request: &ReplyRequest) -> ApiResult<()> {
        let mut state = self.lock();
        let key = request.key.as_u32();
        let (queue, stored) = state.queue_mut(&request.queue)?;
        let index = stored
            .position(key)
            .ok_or_else(|| key_not_found(&queue, request.key))?;
        let inquiry = &mut stored.messages[index];
        if inquiry.type_code != MessageType::Inquiry.code() {
            return Err(host_error(
                "CPF2422",
                format!("Message key {} does not refer to an inquiry message.", request.key),
            ));
        }
        if inquiry.reply_status != STATUS_WAITING {
            return Err(host_error(
                "CPF2420",
                format!("Reply already sent for inquiry message {}.", request.key),
            ));
        }
        inquiry.reply_status = STATUS_ANSWERED;
        let link = inquiry.link.clone();

        if let Some(link) = link {
            if let Ok((_, reply_queue)) = state.queue_mut(&link.queue) {
                if let Some(copy) = reply_queue.position(link.key) {
                    reply_queue.messages[copy].reply_status = STATUS_ANSWERED;
                }
            }
            let reply = NewMessage::new(MessageType::Reply, request.text.clone());
            state.push(
                &link.queue,
                reply,
                STATUS_NONE,
                Some(Link {
                    queue: link.queue.clone(),
                    key: link.key,
                }),
            )?;
        }
        self.arrived.notify_all();
        Ok(())
    }

    fn remove_messages(&self, request: &RemoveRequest) -> ApiResult<()> {
        let mut state = self.lock();
        let (queue, stored) = state.queue_mut(&request.queue)?;
        match request.selection {
            RemoveSelection::Key(key) => {
                let index = stored
                    .position(key.as_u32())
                    .ok_or_else(|| key_not_found(&queue, key))?;
                stored.messages.remove(index);
            }
            RemoveSelection::All => stored.messages.clear(),
            RemoveSelection::Old => stored.messages.retain(|message| !message.old),
            RemoveSelection::New => stored.messages.retain(|message| message.old),
            RemoveSelection::KeepUnanswered => {
                stored.messages.retain(StoredMessage::needs_reply)
            }
        }
        tracing::debug!(%queue, selection = request.selection.as_str(), "removed messages");
        Ok(())
    }
}

fn snapshot(
    queue: &QueueIdentity,
    stored: &StoredQueue,
    selection: &DecodedSelection,
) -> Vec<ListEntry> {
    let start = selection.user_start.as_u32();
    let mut picked: Vec<&StoredMessage> = stored
        .messages
        .iter()
        .filter(|message| message.body.severity >= selection.severity)
        .filter(|message| matches_filter(message, &selection.filter))
        .filter(|message| match selection.direction {
            ListDirection::OldestFirst => message.key >= start,
            ListDirection::NewestFirst => message.key <= start,
        })
        .collect();
    if selection.direction == ListDirection::NewestFirst {
        picked.reverse();
    }
    picked
        .into_iter()
        .map(|message| list_entry(queue, message, selection))
        .collect()
}

fn matches_filter(message: &StoredMessage, filter: &[FilterKeyword]) -> bool {
    filter.iter().any(|keyword| match keyword {
        FilterKeyword::All => true,
        FilterKeyword::NeedsReply => message.needs_reply(),
        FilterKeyword::SendersCopyNeedsReply => message.copy_needs_reply(),
        FilterKeyword::NoReplyNeeded => !message.needs_reply() && !message.copy_needs_reply(),
    })
}

fn list_entry(
    queue: &QueueIdentity,
    message: &StoredMessage,
    selection: &DecodedSelection,
) -> ListEntry {
    let (library, name) = match queue {
        QueueIdentity::Qualified { library, name } => (library.clone(), name.clone()),
        QueueIdentity::Current => (String::new(), String::new()),
    };
    let (date_sent, time_sent) = host_date_time(message.sent_at);
    let body = &message.body;
    let fields = selection
        .field_ids
        .iter()
        .filter_map(|&id| {
            let value = match id {
                field_id::REPLACEMENT_DATA if body.substitution_data.is_empty() => {
                    FieldValue::MultiValue(Vec::new())
                }
                field_id::REPLACEMENT_DATA => {
                    FieldValue::MultiValue(vec![body.substitution_data.clone()])
                }
                field_id::MESSAGE_TEXT => {
                    FieldValue::Text(clip(&body.text, selection.max_message_len))
                }
                field_id::MESSAGE_HELP => {
                    FieldValue::Text(clip(&strip_formatting(&body.help), selection.max_help_len))
                }
                field_id::MESSAGE_HELP_FORMATTED => {
                    FieldValue::Text(clip(&body.help, selection.max_help_len))
                }
                field_id::DEFAULT_REPLY => FieldValue::Text(body.default_reply.clone()),
                field_id::SENDER_JOB => FieldValue::Text(body.sender.qualified()),
                field_id::REPLY_STATUS => FieldValue::Text(message.reply_status.to_string()),
                _ => return None,
            };
            Some(Field {
                id,
                status: b' ',
                value,
            })
        })
        .collect();
    ListEntry {
        severity: body.severity,
        message_id: body.message_id.clone(),
        type_code: message.type_code.clone(),
        key: MessageKey::from_u32(message.key),
        message_file: body.message_file.clone(),
        message_file_library: body.message_file_library.clone(),
        queue: name,
        queue_library: library,
        date_sent,
        time_sent,
        fields,
    }
}

fn clip(text: &str, max: Option<u32>) -> String {
    let Some(max) = max else {
        return text.to_string();
    };
    let mut end = (max as usize).min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

fn waits_for_new(selection: ReceiveSelection) -> bool {
    matches!(
        selection,
        ReceiveSelection::Any
            | ReceiveSelection::Completion
            | ReceiveSelection::Diagnostic
            | ReceiveSelection::Informational
            | ReceiveSelection::Inquiry
    )
}

fn type_of(selection: ReceiveSelection) -> Option<MessageType> {
    match selection {
        ReceiveSelection::Completion => Some(MessageType::Completion),
        ReceiveSelection::Diagnostic => Some(MessageType::Diagnostic),
        ReceiveSelection::Informational => Some(MessageType::Informational),
        ReceiveSelection::Inquiry => Some(MessageType::Inquiry),
        _ => None,
    }
}

fn select(
    queue: &QueueIdentity,
    stored: &StoredQueue,
    selection: ReceiveSelection,
    key: Option<u32>,
) -> ApiResult<Option<usize>> {
    let messages = &stored.messages;
    let by_key = |key: u32| {
        stored
            .position(key)
            .ok_or_else(|| key_not_found(queue, MessageKey::from_u32(key)))
    };
    match (selection, key) {
        (ReceiveSelection::First, _) => Ok((!messages.is_empty()).then_some(0)),
        (ReceiveSelection::Last, _) => Ok(messages.len().checked_sub(1)),
        (ReceiveSelection::Next, Some(key)) => {
            let index = by_key(key)? + 1;
            Ok((index < messages.len()).then_some(index))
        }
        (ReceiveSelection::Previous, Some(key)) => Ok(by_key(key)?.checked_sub(1)),
        (ReceiveSelection::Reply, Some(copy_key)) => Ok(messages.iter().position(|message| {
            MessageType::from_code(&message.type_code).is_reply()
                && message.link.as_ref().is_some_and(|link| link.key == copy_key)
        })),
        (ReceiveSelection::Copy, Some(reply_key)) => {
            let reply = &messages[by_key(reply_key)?];
            match &reply.link {
                Some(link) => Ok(stored.position(link.key)),
                None => Ok(None),
            }
        }
        (ReceiveSelection::Next | ReceiveSelection::Previous, None)
        | (ReceiveSelection::Reply | ReceiveSelection::Copy, None) => Err(Error::new(ErrorKind::Usage)
            .with_message(format!("{} requires a message key", selection.as_str()))),
        (other, Some(key)) => {
            let index = by_key(key)?;
            let wanted = type_of(other);
            let message_type = MessageType::from_code(&messages[index].type_code);
            Ok(wanted.is_none_or(|wanted| wanted == message_type).then_some(index))
        }
        (other, None) => {
            let wanted = type_of(other);
            Ok(messages.iter().position(|message| {
                !message.old
                    && wanted
                        .as_ref()
                        .is_none_or(|wanted| *wanted == MessageType::from_code(&message.type_code))
            }))
        }
    }
}

fn received_record(message: &StoredMessage) -> ReceivedRecord {
    let (date_sent, time_sent) = host_date_time(message.sent_at);
    let body = &message.body;
    ReceivedRecord {
        severity: body.severity,
        message_id: body.message_id.clone(),
        type_code: message.type_code.clone(),
        key: MessageKey::from_u32(message.key),
        message_file: body.message_file.clone(),
        message_file_library: body.message_file_library.clone(),
        sender_job: body.sender.name.clone(),
        sender_user: body.sender.user.clone(),
        sender_job_number: body.sender.number.clone(),
        sender_program: body.sender.program.clone(),
        date_sent,
        time_sent,
        reply_status: message.reply_status.to_string(),
        substitution_data: body.substitution_data.clone(),
        text: body.text.clone(),
        help: body.help.clone(),
        bytes_available: 0,
        truncated: false,
    }
}

fn now() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

fn host_error(id: &str, text: impl Into<String>) -> Error {
    let text = text.into();
    Error::new(ErrorKind::Transport)
        .with_message(text.clone())
        .with_host_message(HostMessage::new(id, 40, text))
}

fn queue_not_found(queue: &QueueIdentity) -> Error {
    host_error("CPF2403", format!("Message queue {queue} not found."))
        .with_hint("Create the queue on the host first.")
}

fn key_not_found(queue: &QueueIdentity, key: MessageKey) -> Error {
    host_error(
        "CPF2410",
        format!("Message key {key} not found in message queue {queue}."),
    )
}

#[cfg(test)]
mod tests {
    use super::{MemoryHost, NewMessage, QueueAccess};
    use crate::api::{
        FetchRequest, MessageType, OpenListRequest, QueueIdentity, ReceiveAction, ReceiveRequest,
        ReceiveSelection, RecordCount, RemoteCallGateway, StartAt, WaitTime,
    };
    use crate::core::criteria::{encode_selection, SelectionCriteria};
    use crate::core::error::ErrorKind;
    use crate::core::list_info::ListStatus;
    use crate::core::receive_format::decode_received;
    use crate::core::record::decode_entries;
    use crate::core::token::{ListHandle, MessageKey};

    fn open(host: &MemoryHost, criteria: &SelectionCriteria) -> ListHandle {
        host.open_list(&OpenListRequest {
            queue: QueueIdentity::Current,
            selection: encode_selection(criteria).expect("selection"),
        })
        .expect("open")
        .handle
    }

    fn fill(host: &MemoryHost, count: usize) {
        for i in 0..count {
            host.post(
                &QueueIdentity::Current,
                NewMessage::new(MessageType::Informational, format!("message {i}")),
            )
            .expect("post");
        }
    }

    #[test]
    fn pages_hold_whole_records_and_cursor_waits_for_complete_pages() {
        let host = MemoryHost::new();
        fill(&host, 5);
        let handle = open(&host, &SelectionCriteria::default());

        let short = host
            .fetch_entries(&FetchRequest {
                handle,
                buffer_len: 200,
                count: RecordCount::Exactly(3),
                start: StartAt::Cursor,
            })
            .expect("short");
        assert!(short.bytes_returned < short.bytes_available);
        assert_eq!(short.data.len(), short.bytes_returned);
        let returned = short.info.records_returned as usize;
        assert_eq!(decode_entries(&short.data, returned).expect("decode").len(), returned);

        let full = host
            .fetch_entries(&FetchRequest {
                handle,
                buffer_len: 64 * 1024,
                count: RecordCount::Exactly(3),
                start: StartAt::Cursor,
            })
            .expect("full");
        assert_eq!(full.info.first_record, 1);
        assert_eq!(full.info.records_returned, 3);

        let rest = host
            .fetch_entries(&FetchRequest {
                handle,
                buffer_len: 64 * 1024,
                count: RecordCount::All,
                start: StartAt::Cursor,
            })
            .expect("rest");
        assert_eq!(rest.info.first_record, 4);
        assert_eq!(rest.info.records_returned, 2);
        host.close_list(handle).expect("close");
    }

    #[test]
    fn lists_are_snapshots() {
        let host = MemoryHost::new();
        fill(&host, 2);
        let handle = open(&host, &SelectionCriteria::default());
        fill(&host, 3);
        let info = host.list_length(handle).expect("length");
        assert_eq!(info.total_records, 2);
        host.close_list(handle).expect("close");
    }

    #[test]
    fn unknown_handles_fail_with_host_messages() {
        let host = MemoryHost::new();
        let err = host.close_list(ListHandle::from_u32(42)).expect_err("unknown");
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.host_messages()[0].id, "GUI0002");
    }

    #[test]
    fn locked_queue_reports_status_and_still_allocates_a_handle() {
        let host = MemoryHost::new();
        host.set_access(&QueueIdentity::Current, QueueAccess::Locked).expect("access");
        let opened = host
            .open_list(&OpenListRequest {
                queue: QueueIdentity::Current,
                selection: encode_selection(&SelectionCriteria::default()).expect("selection"),
            })
            .expect("open");
        assert_eq!(opened.info.status, ListStatus::Locked);
        assert_eq!(host.open_lists(), vec![opened.handle]);
    }

    #[test]
    fn severity_floor_filters_entries() {
        let host = MemoryHost::new();
        host.post(
            &QueueIdentity::Current,
            NewMessage::new(MessageType::Diagnostic, "low").with_severity(10),
        )
        .expect("post");
        host.post(
            &QueueIdentity::Current,
            NewMessage::new(MessageType::Diagnostic, "high").with_severity(50),
        )
        .expect("post");
        let handle = open(&host, &SelectionCriteria::default().with_severity(40));
        assert_eq!(host.list_length(handle).expect("length").total_records, 1);
        host.close_list(handle).expect("close");
    }

    #[test]
    fn receive_marks_old_and_skips_old_messages() {
        let host = MemoryHost::new();
        fill(&host, 2);
        let request = ReceiveRequest {
            queue: QueueIdentity::Current,
            selection: ReceiveSelection::Any,
            key: MessageKey::BLANK,
            wait: WaitTime::NoWait,
            action: ReceiveAction::Old,
            buffer_len: 1024,
        };
        let first = decode_received(&host.receive_one(&request).expect("first"))
            .expect("decode")
            .expect("record");
        let second = decode_received(&host.receive_one(&request).expect("second"))
            .expect("decode")
            .expect("record");
        assert_eq!(first.text, "message 0");
        assert_eq!(second.text, "message 1");
        let none = host.receive_one(&request).expect("third");
        assert_eq!(decode_received(&none).expect("decode"), None);
    }

    #[test]
    fn next_with_unknown_key_is_a_host_error() {
        let host = MemoryHost::new();
        let err = host
            .receive_one(&ReceiveRequest {
                queue: QueueIdentity::Current,
                selection: ReceiveSelection::Next,
                key: MessageKey::from_u32(77),
                wait: WaitTime::NoWait,
                action: ReceiveAction::Same,
                buffer_len: 1024,
            })
            .expect_err("key");
        assert_eq!(err.host_messages()[0].id, "CPF2410");
    }
}
