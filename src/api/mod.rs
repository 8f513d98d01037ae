//! Purpose: Define the stable public Rust API boundary for the Workers KV client.
//! Exports: Client, credentials, monitor, and verdict types needed by callers.
//! Role: Public, additive-only surface; hides internal pipeline modules.
//! Invariants: This module is the only public path to the request/response pipeline.
//! Invariants: Everything exported here is safe to hold across operations.

mod client;
mod monitor;

pub use crate::core::command::{CommandInput, CommandKind, CommandRecord};
pub use crate::core::config::Credentials;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::request::{ContentType, HttpMethod, HttpOptions, TransportRequest};
pub use crate::core::response::{CanonicalResponse, Payload};
pub use crate::core::verdict::{ApiError, FetchOutcome, ValidationMode, Verdict, WellFormed};
pub use client::{
    BulkWriteEntry, KeyEntry, KeyListPage, KvResult, ListKeysParams, ListNamespacesParams,
    NamespaceInfo, ResultInfo, WorkersKv, WriteParams,
};
pub use monitor::{
    ActivityMessage, KvMonitor, MonitorEvent, MonitorStream, OperationOutcome, OutcomeHandler,
};
