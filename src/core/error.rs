// Error model shared by the codec, the list session, and the gateways.
use crate::core::list_info::ListStatus;
use std::error::Error as StdError;
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    Transport,
    ListStatus,
    Corrupt,
}

/// One diagnostic message reported by the host alongside a failed call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HostMessage {
    pub id: String,
    pub severity: i32,
    pub text: String,
}

impl HostMessage {
    pub fn new(id: impl Into<String>, severity: i32, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            severity,
            text: text.into(),
        }
    }
}

impl fmt::Display for HostMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (severity {}): {}", self.id, self.severity, self.text)
    }
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    status: Option<ListStatus>,
    offset: Option<usize>,
    host_messages: Vec<HostMessage>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            status: None,
            offset: None,
            host_messages: Vec::new(),
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn status(&self) -> Option<ListStatus> {
        self.status
    }

    pub fn offset(&self) -> Option<usize> {
        self.offset
    }

    pub fn host_messages(&self) -> &[HostMessage] {
        &self.host_messages
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_status(mut self, status: ListStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_host_message(mut self, message: HostMessage) -> Self {
        self.host_messages.push(message);
        self
    }

    pub fn with_host_messages(mut self, messages: impl IntoIterator<Item = HostMessage>) -> Self {
        self.host_messages.extend(messages);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(status) = self.status {
            write!(f, " (status: {status:?})")?;
        }
        if let Some(offset) = self.offset {
            write!(f, " (offset: {offset})")?;
        }
        for host_message in &self.host_messages {
            write!(f, " [{host_message}]")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::Transport => 3,
        ErrorKind::ListStatus => 4,
        ErrorKind::Corrupt => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::{to_exit_code, Error, ErrorKind, HostMessage};
    use crate::core::list_info::ListStatus;

    #[test]
    fn exit_code_mapping_is_stable() {
        let cases = [
            (ErrorKind::Internal, 1),
            (ErrorKind::Usage, 2),
            (ErrorKind::Transport, 3),
            (ErrorKind::ListStatus, 4),
            (ErrorKind::Corrupt, 5),
        ];

        for (kind, code) in cases {
            assert_eq!(to_exit_code(kind), code);
        }
    }

    #[test]
    fn display_includes_host_messages_verbatim() {
        let err = Error::new(ErrorKind::Transport)
            .with_message("open list failed")
            .with_host_message(HostMessage::new("CPF2403", 40, "Message queue PAYROLL not found."));
        let rendered = err.to_string();
        assert!(rendered.starts_with("Transport: open list failed"));
        assert!(rendered.contains("CPF2403 (severity 40): Message queue PAYROLL not found."));
    }

    #[test]
    fn status_is_carried() {
        let err = Error::new(ErrorKind::ListStatus).with_status(ListStatus::Locked);
        assert_eq!(err.status(), Some(ListStatus::Locked));
        assert!(err.to_string().contains("Locked"));
    }
}
