//! Purpose: Own one server-side message list: open on demand, page through it, release it.
//! Exports: `ListSession`, `SessionPhase`.
//! Role: The only place list handles are created, kept and closed.
//! Invariants: All handle-touching calls are serialized by one mutex per session.
//! Invariants: Invalidation never does I/O; the stale handle is closed before the next open.
//! Invariants: Every opened handle is closed exactly once, including after failed opens.
//! Invariants: Dropping a session with a live handle only logs; release is explicit.
#![allow(clippy::result_large_err)]

use super::gateway::{ApiResult, FetchRequest, OpenListRequest, QueueIdentity, RemoteCallGateway};
use crate::core::criteria::{encode_selection, SelectionCriteria};
use crate::core::fetch::{fetch_with_growth, FetchResult, GrowthPolicy, RecordCount, StartAt};
use crate::core::list_info::check_list_info;
use crate::core::record::ListEntry;
use crate::core::token::ListHandle;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionPhase {
    Unopened,
    Open,
    /// Criteria changed since the list was built; the next read reopens.
    Stale,
    Closed,
}

#[derive(Clone, Copy, Debug)]
struct ActiveList {
    handle: ListHandle,
    total: u32,
}

#[derive(Debug)]
struct SessionState {
    criteria: SelectionCriteria,
    phase: SessionPhase,
    active: Option<ActiveList>,
    pending_close: Option<ListHandle>,
}

pub struct ListSession {
    gateway: Arc<dyn RemoteCallGateway>,
    queue: QueueIdentity,
    policy: GrowthPolicy,
    state: Mutex<SessionState>,
}

impl ListSession {
    pub fn new(gateway: Arc<dyn RemoteCallGateway>, queue: QueueIdentity) -> Self {
        Self {
            gateway,
            queue,
            policy: GrowthPolicy::default(),
            state: Mutex::new(SessionState {
                criteria: SelectionCriteria::default(),
                phase: SessionPhase::Unopened,
                active: None,
                pending_close: None,
            }),
        }
    }

    pub fn with_policy(mut self, policy: GrowthPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_criteria(self, criteria: SelectionCriteria) -> ApiResult<Self> {
        self.set_criteria(criteria)?;
        Ok(self)
    }

    pub fn queue(&self) -> &QueueIdentity {
        &self.queue
    }

    pub fn gateway(&self) -> &Arc<dyn RemoteCallGateway> {
        &self.gateway
    }

    pub fn criteria(&self) -> SelectionCriteria {
        self.lock().criteria.clone()
    }

    /// Replaces the criteria; a different value marks the current list stale.
    pub fn set_criteria(&self, criteria: SelectionCriteria) -> ApiResult<()> {
        criteria.validate()?;
        let mut state = self.lock();
        if state.criteria == criteria {
            return Ok(());
        }
        state.criteria = criteria;
        invalidate_locked(&mut state);
        Ok(())
    }

    pub fn invalidate(&self) {
        invalidate_locked(&mut self.lock());
    }

    pub fn phase(&self) -> SessionPhase {
        self.lock().phase
    }

    pub fn handle(&self) -> Option<ListHandle> {
        self.lock().active.map(|active| active.handle)
    }

    pub fn pending_close(&self) -> Option<ListHandle> {
        self.lock().pending_close
    }

    /// Total records in the list, opening it first if needed.
    pub fn len(&self) -> ApiResult<u32> {
        let mut state = self.lock();
        Ok(self.ensure_open(&mut state)?.total)
    }

    pub fn is_empty(&self) -> ApiResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn fetch(&self, start: StartAt, count: RecordCount) -> ApiResult<FetchResult> {
        let mut state = self.lock();
        self.fetch_locked(&mut state, start, count)
    }

    pub fn entries(&self, start: StartAt, count: RecordCount) -> ApiResult<Vec<ListEntry>> {
        let mut state = self.lock();
        self.entries_locked(&mut state, start, count)
    }

    pub fn all(&self) -> ApiResult<Vec<ListEntry>> {
        let mut state = self.lock();
        self.all_locked(&mut state)
    }

    /// Like `entries`, also returning the criteria the list was built with.
    pub(crate) fn entries_with_criteria(
        &self,
        start: StartAt,
        count: RecordCount,
    ) -> ApiResult<(SelectionCriteria, Vec<ListEntry>)> {
        let mut state = self.lock();
        let entries = self.entries_locked(&mut state, start, count)?;
        Ok((state.criteria.clone(), entries))
    }

    /// Like `all`, also returning the criteria the list was built with.
    pub(crate) fn all_with_criteria(&self) -> ApiResult<(SelectionCriteria, Vec<ListEntry>)> {
        let mut state = self.lock();
        let entries = self.all_locked(&mut state)?;
        Ok((state.criteria.clone(), entries))
    }

    /// Releases the server-side list. Safe to call any number of times.
    pub fn close(&self) -> ApiResult<()> {
        let mut state = self.lock();
        if let Some(active) = state.active.take() {
            state.pending_close = Some(active.handle);
        }
        let Some(handle) = state.pending_close else {
            if state.phase != SessionPhase::Unopened {
                state.phase = SessionPhase::Closed;
            }
            return Ok(());
        };
        if let Err(err) = self.gateway.close_list(handle) {
            state.phase = SessionPhase::Stale;
            return Err(err);
        }
        state.pending_close = None;
        state.phase = SessionPhase::Closed;
        tracing::debug!(queue = %self.queue, %handle, "closed list");
        Ok(())
    }

    fn fetch_locked(
        &self,
        state: &mut SessionState,
        start: StartAt,
        count: RecordCount,
    ) -> ApiResult<FetchResult> {
        let active = self.ensure_open(state)?;
        fetch_with_growth(&self.policy, count, self.policy.initial_len, |buffer_len| {
            self.gateway.fetch_entries(&FetchRequest {
                handle: active.handle,
                buffer_len,
                count,
                start,
            })
        })
    }

    fn entries_locked(
        &self,
        state: &mut SessionState,
        start: StartAt,
        count: RecordCount,
    ) -> ApiResult<Vec<ListEntry>> {
        if count == RecordCount::Exactly(0) {
            return Ok(Vec::new());
        }
        self.fetch_locked(state, start, count)?.entries()
    }

    fn all_locked(&self, state: &mut SessionState) -> ApiResult<Vec<ListEntry>> {
        if self.ensure_open(state)?.total == 0 {
            return Ok(Vec::new());
        }
        self.entries_locked(state, StartAt::Record(1), RecordCount::All)
    }

    fn ensure_open(&self, state: &mut SessionState) -> ApiResult<ActiveList> {
        if let Some(active) = state.active {
            return Ok(active);
        }
        if let Some(stale) = state.pending_close {
            self.gateway.close_list(stale)?;
            state.pending_close = None;
            tracing::debug!(queue = %self.queue, handle = %stale, "closed stale list");
        }

        let selection = encode_selection(&state.criteria)?;
        let opened = self.gateway.open_list(&OpenListRequest {
            queue: self.queue.clone(),
            selection,
        })?;
        let handle = opened.handle;
        let total = check_list_info(&opened.info).and_then(|()| {
            let info = self.gateway.list_length(handle)?;
            check_list_info(&info)?;
            Ok(info.total_records)
        });
        match total {
            Ok(total) => {
                let active = ActiveList { handle, total };
                state.active = Some(active);
                state.phase = SessionPhase::Open;
                tracing::debug!(queue = %self.queue, %handle, total, "opened list");
                Ok(active)
            }
            Err(err) => {
                state.pending_close = Some(handle);
                state.phase = SessionPhase::Stale;
                tracing::debug!(queue = %self.queue, %handle, "list unusable after open: {err}");
                Err(err)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn invalidate_locked(state: &mut SessionState) {
    if let Some(active) = state.active.take() {
        tracing::debug!(handle = %active.handle, "list marked stale");
        state.pending_close = Some(active.handle);
        state.phase = SessionPhase::Stale;
    }
}

impl Drop for ListSession {
    fn drop(&mut self) {
        let state = self.lock();
        let live = state.active.map(|active| active.handle).or(state.pending_close);
        if let Some(handle) = live {
            tracing::warn!(queue = %self.queue, %handle, "list session dropped without close");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ListSession, SessionPhase};
    use crate::api::gateway::{
        ApiResult, FetchRequest, OpenListRequest, OpenedList, QueueIdentity, ReceiveRequest,
        RemoteCallGateway, RemoveRequest, ReplyRequest, SendRequest,
    };
    use crate::core::criteria::SelectionCriteria;
    use crate::core::error::{Error, ErrorKind};
    use crate::core::fetch::FetchedPage;
    use crate::core::list_info::ListInfo;
    use crate::core::token::{ListHandle, MessageKey};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Counting {
        next: Mutex<u32>,
        closed: Mutex<Vec<u32>>,
    }

    impl RemoteCallGateway for Counting {
        fn open_list(&self, _request: &OpenListRequest) -> ApiResult<OpenedList> {
            let mut next = self.next.lock().expect("lock");
            *next += 1;
            let handle = ListHandle::from_u32(*next);
            Ok(OpenedList { handle, info: ListInfo::new(handle) })
        }

        fn list_length(&self, handle: ListHandle) -> ApiResult<ListInfo> {
            Ok(ListInfo::new(handle))
        }

        fn fetch_entries(&self, request: &FetchRequest) -> ApiResult<FetchedPage> {
            Ok(FetchedPage {
                data: Vec::new(),
                bytes_returned: 0,
                bytes_available: 0,
                info: ListInfo::new(request.handle),
            })
        }

        fn close_list(&self, handle: ListHandle) -> ApiResult<()> {
            self.closed.lock().expect("lock").push(handle.as_u32());
            Ok(())
        }

        fn receive_one(&self, _request: &ReceiveRequest) -> ApiResult<Vec<u8>> {
            Err(Error::new(ErrorKind::Internal))
        }

        fn send_message(&self, _request: &SendRequest) -> ApiResult<MessageKey> {
            Err(Error::new(ErrorKind::Internal))
        }

        fn send_reply(&self, _request: &ReplyRequest) -> ApiResult<()> {
            Err(Error::new(ErrorKind::Internal))
        }

        fn remove_messages(&self, _request: &RemoveRequest) -> ApiResult<()> {
            Err(Error::new(ErrorKind::Internal))
        }
    }

    fn session(gateway: &Arc<Counting>) -> ListSession {
        ListSession::new(gateway.clone(), QueueIdentity::Current)
    }

    #[test]
    fn phases_follow_the_lifecycle() {
        let gateway = Arc::new(Counting::default());
        let session = session(&gateway);
        assert_eq!(session.phase(), SessionPhase::Unopened);
        session.close().expect("close unopened");
        assert_eq!(session.phase(), SessionPhase::Unopened);

        session.len().expect("len");
        assert_eq!(session.phase(), SessionPhase::Open);
        session.invalidate();
        assert_eq!(session.phase(), SessionPhase::Stale);
        assert_eq!(session.pending_close(), Some(ListHandle::from_u32(1)));
        assert!(gateway.closed.lock().expect("lock").is_empty());

        session.close().expect("close");
        assert_eq!(session.phase(), SessionPhase::Closed);
        assert_eq!(*gateway.closed.lock().expect("lock"), vec![1]);
    }

    #[test]
    fn equal_criteria_keep_the_list() {
        let gateway = Arc::new(Counting::default());
        let session = session(&gateway);
        session.len().expect("len");
        session.set_criteria(SelectionCriteria::default()).expect("same");
        assert_eq!(session.phase(), SessionPhase::Open);
        session
            .set_criteria(SelectionCriteria::default().with_severity(40))
            .expect("different");
        assert_eq!(session.phase(), SessionPhase::Stale);
        session.close().expect("close");
    }

    #[test]
    fn invalid_criteria_are_rejected_without_invalidating() {
        let gateway = Arc::new(Counting::default());
        let session = session(&gateway);
        session.len().expect("len");
        let err = session
            .set_criteria(SelectionCriteria::default().with_severity(120))
            .expect_err("severity");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(session.phase(), SessionPhase::Open);
        session.close().expect("close");
    }

    #[test]
    fn reading_after_close_opens_a_new_list() {
        let gateway = Arc::new(Counting::default());
        let session = session(&gateway);
        session.len().expect("len");
        session.close().expect("close");
        session.len().expect("reopen");
        assert_eq!(session.handle(), Some(ListHandle::from_u32(2)));
        session.close().expect("close");
        assert_eq!(*gateway.closed.lock().expect("lock"), vec![1, 2]);
    }

    #[test]
    fn empty_list_skips_the_fetch() {
        let gateway = Arc::new(Counting::default());
        let session = session(&gateway);
        assert!(session.all().expect("all").is_empty());
        assert!(session.is_empty().expect("empty"));
        session.close().expect("close");
    }
}
