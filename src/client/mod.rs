//! Client layer: gateway headers and provider services.

pub mod headers;
pub mod service;
