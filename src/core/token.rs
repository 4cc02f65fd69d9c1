// Opaque 4-byte host tokens: list handles and message keys.
use crate::core::error::{Error, ErrorKind};
use std::fmt;
use std::str::FromStr;

/// Server-issued identifier of a materialized list cursor.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ListHandle(pub [u8; 4]);

/// Correlation key identifying one message on a queue.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct MessageKey(pub [u8; 4]);

impl ListHandle {
    pub fn from_u32(value: u32) -> Self {
        Self(value.to_be_bytes())
    }

    pub fn as_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }
}

impl MessageKey {
    pub const OLDEST: MessageKey = MessageKey([0x00; 4]);
    pub const NEWEST: MessageKey = MessageKey([0xFF; 4]);
    pub const BLANK: MessageKey = MessageKey([b' '; 4]);

    pub fn from_u32(value: u32) -> Self {
        Self(value.to_be_bytes())
    }

    pub fn as_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    pub fn is_blank(self) -> bool {
        self == Self::BLANK
    }
}

impl fmt::Display for ListHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl FromStr for ListHandle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex(s, "list handle").map(Self)
    }
}

impl FromStr for MessageKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex(s, "message key").map(Self)
    }
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8; 4]) -> fmt::Result {
    for byte in bytes {
        write!(f, "{byte:02X}")?;
    }
    Ok(())
}

fn parse_hex(raw: &str, what: &str) -> Result<[u8; 4], Error> {
    let usage = || {
        Error::new(ErrorKind::Usage)
            .with_message(format!("invalid {what} {raw:?}"))
            .with_hint("Use exactly 8 hex digits, e.g. 0000002A.")
    };
    if raw.len() != 8 || !raw.is_ascii() {
        return Err(usage());
    }
    let mut out = [0u8; 4];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = u8::from_str_radix(&raw[i * 2..i * 2 + 2], 16).map_err(|_| usage())?;
    }
    Ok(out)
}
