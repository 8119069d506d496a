// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Saved preferences for the resource bounds feature.

use serde::{Deserialize, Serialize};

/// Store key for [`BoundsPrefs`].
pub const BOUNDS_PREFS_KEY: &str = "resource_bounds";

/// Tunables for resource bounds aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundsPrefs {
    /// Build the per-resource detail index from detail chunks.
    pub collect_details: bool,
    /// Hand new records to the location resolver.
    pub resolve_locations: bool,
    /// Upper bound on unique instances kept per resource. `None` keeps everything.
    pub max_instances_per_resource: Option<usize>,
}

impl Default for BoundsPrefs {
    fn default() -> Self {
        Self {
            collect_details: true,
            resolve_locations: true,
            max_instances_per_resource: None,
        }
    }
}
