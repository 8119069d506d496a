// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared test doubles and fixtures for gpuval crates.
#![forbid(unsafe_code)]
//!
//! # Modules
//!
//! - [`batch`] - Wire batch builders for resource bounds messages
//! - [`config`] - In-memory config store fake for testing without filesystem
//! - [`resolver`] - Location resolver that records enqueues
//! - [`sink`] - Recording publication sink and inline dispatcher

pub mod batch;
pub mod config;
pub mod resolver;
pub mod sink;

pub use batch::{
    batch_header, message, texture_write_key, unchunked_batch, BoundsBatchBuilder, BOUNDS_KIND,
};
pub use config::InMemoryConfigStore;
pub use resolver::RecordingResolver;
pub use sink::{events_of, recording_dispatcher, InlineDispatcher, RecordingSink, SinkEvent};
