//! # DriftSync Types
//!
//! Shared vocabulary for the DriftSync mutation-queue engine.
//!
//! This crate provides:
//! - The mutation-record model (one record per locally known entity)
//! - The pending-change union: a tombstone carries no payload
//! - Conflict snapshots and resolution policies
//! - Remote write outcomes (ack / conflict / failure)
//! - The `RecordStore` contract and an in-memory implementation
//!
//! ## Key Invariants
//!
//! - Exactly one record exists per `RecordId`; local edits overwrite the
//!   prior record rather than appending
//! - A record carries a conflict snapshot if and only if its status is
//!   `Conflict`
//! - The version token advances only on a confirmed remote acknowledgment
//! - An acknowledged delete removes the record entirely; it never becomes
//!   `Synced`

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod policy;
mod record;
mod remote;
mod store;

pub use error::{StoreError, StoreResult};
pub use policy::{ConflictPolicy, ManualResolution};
pub use record::{
    now_millis, ConflictSnapshot, Mutation, MutationRecord, Operation, RecordId, SyncStatus,
};
pub use remote::{RemoteAck, RemoteOutcome};
pub use store::{MemoryRecordStore, RecordStore};
