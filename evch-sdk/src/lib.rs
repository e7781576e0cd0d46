//! Shared types for the event channel lifecycle daemon.
//!
//! - [`objects`]: identifiers, scheduled events, feed payloads and the
//!   persisted per-guild state layout.
//! - [`config`]: per-guild configuration and its validation rules.

#![forbid(unsafe_code)]

pub mod config;
pub mod objects;
