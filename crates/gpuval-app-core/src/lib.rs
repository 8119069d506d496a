// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared application services for gpuval tools (config storage port, feature prefs).
//! Keeps feature engines free of any storage or UI framework.

pub mod config;
pub mod prefs;
