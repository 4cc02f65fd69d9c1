// List information block returned by every list call, and its status policy.
use crate::core::error::{Error, ErrorKind};
use crate::core::layout::{self, BLANK};
use crate::core::token::ListHandle;

pub const LIST_INFO_LEN: usize = 80;

const TOTAL_RECORDS: usize = 0;
const RECORDS_RETURNED: usize = 4;
const HANDLE: usize = 8;
const RECORD_LENGTH: usize = 12;
const COMPLETENESS: usize = 16;
const CREATED: usize = 17;
const BUILD_STATE: usize = 30;
const INFO_STATUS: usize = 31;
const INFO_LENGTH: usize = 32;
const FIRST_RECORD: usize = 36;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ListStatus {
    NoErrors,
    NoAuthority,
    Damaged,
    Locked,
    PartiallyDamaged,
    Incomplete,
    Complete,
    Partial,
}

impl ListStatus {
    /// Decodes the information-status byte.
    pub fn from_info_byte(value: u8) -> Result<Self, Error> {
        match value {
            BLANK | 0 => Ok(ListStatus::NoErrors),
            b'A' => Ok(ListStatus::NoAuthority),
            b'D' => Ok(ListStatus::Damaged),
            b'L' => Ok(ListStatus::Locked),
            b'P' => Ok(ListStatus::PartiallyDamaged),
            other => Err(unknown_byte("information status", other)),
        }
    }

    /// Decodes the information-complete indicator.
    pub fn from_completeness_byte(value: u8) -> Result<Self, Error> {
        match value {
            b'C' => Ok(ListStatus::Complete),
            b'I' => Ok(ListStatus::Incomplete),
            b'P' => Ok(ListStatus::Partial),
            other => Err(unknown_byte("completeness indicator", other)),
        }
    }

    pub fn info_byte(self) -> u8 {
        match self {
            ListStatus::NoAuthority => b'A',
            ListStatus::Damaged => b'D',
            ListStatus::Locked => b'L',
            ListStatus::PartiallyDamaged => b'P',
            _ => BLANK,
        }
    }

    pub fn completeness_byte(self) -> u8 {
        match self {
            ListStatus::Incomplete => b'I',
            ListStatus::Partial => b'P',
            _ => b'C',
        }
    }

    /// Hard failures yield no usable data.
    pub fn is_hard_failure(self) -> bool {
        matches!(self, ListStatus::NoAuthority | ListStatus::Locked)
    }

    pub fn is_warning(self) -> bool {
        matches!(self, ListStatus::Damaged | ListStatus::PartiallyDamaged)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BuildState {
    Pending,
    Building,
    Built,
    Failed,
}

impl BuildState {
    fn from_byte(value: u8) -> Result<Self, Error> {
        match value {
            b'0' => Ok(BuildState::Pending),
            b'1' => Ok(BuildState::Building),
            b'2' => Ok(BuildState::Built),
            b'3' => Ok(BuildState::Failed),
            other => Err(unknown_byte("list build state", other)),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            BuildState::Pending => b'0',
            BuildState::Building => b'1',
            BuildState::Built => b'2',
            BuildState::Failed => b'3',
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ListInfo {
    pub total_records: u32,
    pub records_returned: u32,
    pub handle: ListHandle,
    pub record_length: u32,
    pub completeness: ListStatus,
    pub created: String,
    pub build_state: BuildState,
    pub status: ListStatus,
    pub info_length: u32,
    pub first_record: u32,
}

impl ListInfo {
    pub fn new(handle: ListHandle) -> Self {
        Self {
            total_records: 0,
            records_returned: 0,
            handle,
            record_length: 0,
            completeness: ListStatus::Complete,
            created: String::new(),
            build_state: BuildState::Built,
            status: ListStatus::NoErrors,
            info_length: 0,
            first_record: 0,
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < LIST_INFO_LEN {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!("list information block too small ({} bytes)", buf.len())));
        }
        Ok(Self {
            total_records: layout::read_u32(buf, TOTAL_RECORDS)?,
            records_returned: layout::read_u32(buf, RECORDS_RETURNED)?,
            handle: ListHandle(layout::read_4(buf, HANDLE)?),
            record_length: layout::read_u32(buf, RECORD_LENGTH)?,
            completeness: ListStatus::from_completeness_byte(buf[COMPLETENESS])?,
            created: layout::read_text(buf, CREATED, 13)?,
            build_state: BuildState::from_byte(buf[BUILD_STATE])?,
            status: ListStatus::from_info_byte(buf[INFO_STATUS])?,
            info_length: layout::read_u32(buf, INFO_LENGTH)?,
            first_record: layout::read_u32(buf, FIRST_RECORD)?,
        })
    }

    pub fn encode(&self) -> [u8; LIST_INFO_LEN] {
        let mut buf = [0u8; LIST_INFO_LEN];
        layout::write_u32(&mut buf, TOTAL_RECORDS, self.total_records);
        layout::write_u32(&mut buf, RECORDS_RETURNED, self.records_returned);
        buf[HANDLE..HANDLE + 4].copy_from_slice(&self.handle.0);
        layout::write_u32(&mut buf, RECORD_LENGTH, self.record_length);
        buf[COMPLETENESS] = self.completeness.completeness_byte();
        layout::write_text(&mut buf, CREATED, 13, &self.created);
        buf[BUILD_STATE] = self.build_state.to_byte();
        buf[INFO_STATUS] = self.status.info_byte();
        layout::write_u32(&mut buf, INFO_LENGTH, self.info_length);
        layout::write_u32(&mut buf, FIRST_RECORD, self.first_record);
        buf
    }
}

/// Applies the status policy before any record count in `info` is trusted.
pub fn check_list_info(info: &ListInfo) -> Result<(), Error> {
    if info.build_state == BuildState::Failed {
        return Err(Error::new(ErrorKind::ListStatus)
            .with_message(format!("host failed to build list {}", info.handle))
            .with_status(info.completeness));
    }
    if info.status.is_hard_failure() {
        return Err(Error::new(ErrorKind::ListStatus)
            .with_message(format!("list {} is not readable", info.handle))
            .with_status(info.status)
            .with_hint(match info.status {
                ListStatus::NoAuthority => "The caller lacks authority to the message queue.",
                _ => "The message queue is locked by another job; retry later.",
            }));
    }
    if info.status.is_warning() {
        tracing::warn!(
            handle = %info.handle,
            status = ?info.status,
            "list reports damaged data; decoding what was returned"
        );
    }
    if info.completeness != ListStatus::Complete {
        tracing::debug!(
            handle = %info.handle,
            completeness = ?info.completeness,
            "list information is not complete"
        );
    }
    Ok(())
}

fn unknown_byte(what: &str, value: u8) -> Error {
    Error::new(ErrorKind::Corrupt).with_message(format!("unknown {what} byte 0x{value:02X}"))
}
