#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod attendance;
pub mod backend;
pub mod clock;
pub mod config;
pub mod divider;
pub mod events;
pub mod naming;
pub mod orchestrator;
pub mod processors;
pub mod registry;
pub mod scheduler;
pub mod storage;
#[cfg(test)]
mod testing;
pub mod utils;
