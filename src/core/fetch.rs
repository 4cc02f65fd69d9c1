// Growth-retry fetching of list pages into a caller-sized buffer.
use crate::core::error::{Error, ErrorKind};
use crate::core::list_info::{check_list_info, ListInfo, ListStatus};
use crate::core::record::{decode_entries, ListEntry};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RecordCount {
    All,
    Exactly(u32),
}

impl RecordCount {
    pub fn to_wire(self) -> i32 {
        match self {
            RecordCount::All => -1,
            RecordCount::Exactly(count) => count.min(i32::MAX as u32) as i32,
        }
    }

    pub fn from_wire(value: i32) -> Result<Self, Error> {
        match value {
            -1 => Ok(RecordCount::All),
            count if count >= 0 => Ok(RecordCount::Exactly(count as u32)),
            other => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("invalid record count {other}"))),
        }
    }
}

/// Where a page starts: the server cursor, or a 1-based record number.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StartAt {
    Cursor,
    Record(u32),
}

impl StartAt {
    pub fn to_wire(self) -> i32 {
        match self {
            StartAt::Cursor => -1,
            StartAt::Record(record) => record.min(i32::MAX as u32) as i32,
        }
    }

    pub fn from_wire(value: i32) -> Result<Self, Error> {
        match value {
            -1 => Ok(StartAt::Cursor),
            record if record >= 1 => Ok(StartAt::Record(record as u32)),
            other => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("invalid starting record {other}"))
                .with_hint("Records are numbered from 1; use -1 for the list cursor.")),
        }
    }
}

/// Bounds on buffer growth; hosts can report arbitrary availability.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GrowthPolicy {
    pub initial_len: usize,
    pub max_len: usize,
    pub max_attempts: u32,
}

impl GrowthPolicy {
    pub fn new() -> Self {
        Self {
            initial_len: 16 * 1024,
            max_len: 64 * 1024 * 1024,
            max_attempts: 16,
        }
    }
}

impl Default for GrowthPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// One raw answer to a fetch call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FetchedPage {
    pub data: Vec<u8>,
    pub bytes_returned: usize,
    pub bytes_available: usize,
    pub info: ListInfo,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FetchResult {
    pub total_records: u32,
    pub records_returned: u32,
    pub data: Vec<u8>,
    pub status: ListStatus,
    pub buffer_len: usize,
    pub attempts: u32,
}

impl FetchResult {
    pub fn entries(&self) -> Result<Vec<ListEntry>, Error> {
        decode_entries(&self.data, self.records_returned as usize)
    }
}

/// Calls `call(buffer_len)` until the page fits.
///
/// Only `RecordCount::All` grows: a finite count is contracted to fit the
/// first sized response, so a short page is returned as is. Every page's
/// list information is checked before its counts are used.
pub fn fetch_with_growth<F>(
    policy: &GrowthPolicy,
    count: RecordCount,
    initial_len: usize,
    mut call: F,
) -> Result<FetchResult, Error>
where
    F: FnMut(usize) -> Result<FetchedPage, Error>,
{
    let mut len = initial_len.clamp(1, policy.max_len.max(1));
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let page = call(len)?;
        check_list_info(&page.info)?;

        let complete = page.bytes_returned >= page.bytes_available;
        if complete || count != RecordCount::All {
            if !complete {
                tracing::debug!(
                    handle = %page.info.handle,
                    returned = page.bytes_returned,
                    available = page.bytes_available,
                    "short page for a finite record count"
                );
            }
            return Ok(finish(page, len, attempts));
        }

        if attempts >= policy.max_attempts {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!(
                    "list page still incomplete after {attempts} attempts ({} of {} bytes)",
                    page.bytes_returned, page.bytes_available
                ))
                .with_hint("The host keeps reporting more data; check the list handle."));
        }
        if page.bytes_available > policy.max_len {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!(
                    "host reports {} bytes available, above the {} byte limit",
                    page.bytes_available, policy.max_len
                ))
                .with_hint("Fetch the list in smaller pages or raise the growth limit."));
        }

        let total = page.info.total_records as usize;
        let returned = page.info.records_returned as usize;
        let factor = 1 + total / (returned + 1);
        let grown = len
            .saturating_mul(factor)
            .max(page.bytes_available)
            .min(policy.max_len);
        tracing::debug!(
            handle = %page.info.handle,
            from = len,
            to = grown,
            available = page.bytes_available,
            "growing list receive buffer"
        );
        len = grown;
    }
}

fn finish(mut page: FetchedPage, buffer_len: usize, attempts: u32) -> FetchResult {
    let returned = page.bytes_returned.min(page.data.len());
    page.data.truncate(returned);
    FetchResult {
        total_records: page.info.total_records,
        records_returned: page.info.records_returned,
        status: page.info.status,
        data: page.data,
        buffer_len,
        attempts,
    }
}
