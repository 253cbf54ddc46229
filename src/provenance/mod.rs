//! Provenance: BLAKE3 graph hashing, synthesis event log, input drift.

pub mod drift;
pub mod eventlog;
pub mod hasher;
