//! Anonymous installation identity and its durable storage.

pub mod anonymous;
pub mod store;
