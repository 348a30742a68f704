//! Policies applied around platform attestation calls.

pub mod retry;
