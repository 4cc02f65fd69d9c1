//! Purpose: Public API for listing and receiving host queue messages.
//! Exports: Gateway boundary, list session, queue facade, typed messages, HTTP gateway.
//! Role: What the CLI, the bridge server and library users build on.
//! Invariants: Codecs stay in `core`; everything here goes through `RemoteCallGateway`.

mod gateway;
mod message;
mod queue;
mod receive;
mod remote;
mod session;
pub mod wire;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::criteria::{
    FilterKeyword, HelpFormatting, ListDirection, SelectionCriteria,
};
pub use crate::core::error::{Error, ErrorKind, HostMessage};
pub use crate::core::fetch::{FetchResult, FetchedPage, GrowthPolicy, RecordCount, StartAt};
pub use crate::core::list_info::{BuildState, ListInfo, ListStatus};
pub use crate::core::record::{Field, FieldValue, ListEntry};
pub use crate::core::token::{ListHandle, MessageKey};
pub use gateway::{
    ApiResult, FetchRequest, OpenListRequest, OpenedList, QueueIdentity, ReceiveRequest,
    RemoteCallGateway, RemoveRequest, RemoveSelection, ReplyRequest, SendKind, SendRequest,
};
pub use message::{MessageType, QueuedMessage, ReceivedMessage, ReplyStatus};
pub use queue::MessageQueue;
pub use receive::{
    receive_message, ReceiveAction, ReceiveOptions, ReceiveSelection, Received, WaitTime,
};
pub use remote::HttpGateway;
pub use session::{ListSession, SessionPhase};
