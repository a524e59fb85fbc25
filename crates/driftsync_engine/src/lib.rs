//! # DriftSync Engine
//!
//! Mutation-queue sync engine for offline-first clients.
//!
//! This crate provides:
//! - The per-record sync state machine (attempt → ack/conflict/failure)
//! - Retry scheduling with jittered exponential backoff
//! - Conflict-resolution strategy dispatch
//! - Batched reconciliation of pending records on reconnect
//! - Aggregate status monitoring with subscriptions
//! - The `RemoteStore` contract and a scripted mock
//!
//! ## Architecture
//!
//! Local edits enter [`SyncEngine`], which persists them as mutation
//! records and, while online, pushes each record through the remote
//! contract. The outcome of every attempt is folded back into the record:
//! an ack marks it synced, a conflict runs the configured policy, a
//! failure feeds the retry scheduler. The authority itself stays behind
//! [`RemoteStore`]; the engine never sees a transport.
//!
//! ## Key Invariants
//!
//! - The engine is the single writer of the record store
//! - Read-modify-persist sequences are serialized per record ID; distinct
//!   IDs proceed fully concurrently
//! - Every sync attempt resolves into a well-defined persisted state;
//!   routine sync traffic never surfaces as an error
//! - Reconnect fan-out is bounded to one batch of records at a time

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod monitor;
mod remote;
mod resolver;
mod retry;

pub use config::{MergeFn, SyncConfig};
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use monitor::{StatusMonitor, SubscriptionId, SyncSummary};
pub use remote::{MockRemoteStore, RemoteStore};
pub use resolver::ConflictResolver;
pub use retry::{RetryScheduler, MAX_BACKOFF};

pub use driftsync_types::{
    now_millis, ConflictPolicy, ConflictSnapshot, ManualResolution, MemoryRecordStore, Mutation,
    MutationRecord, Operation, RecordId, RecordStore, RemoteAck, RemoteOutcome, StoreError,
    SyncStatus,
};
