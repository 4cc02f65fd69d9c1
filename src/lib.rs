//! Purpose: Library crate behind the `hostlist` CLI and bridge server.
//! Exports: `core` (codecs, fetch loop, errors), `api` (gateway, sessions, queues), `host`.
//! Role: Paginated list retrieval and direct receive against a remote message host.
//! Invariants: All host interaction goes through `api::RemoteCallGateway`.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
pub mod host;
