//! Outbound change notifications
//!
//! | Notification | Meaning for subscribers |
//! |--------------|-------------------------|
//! | `ListChanged` | re-fetch the full scene listing |
//! | `ResourceUpdated { uri }` | re-fetch exactly one resource |

use serde::{Deserialize, Serialize};

/// URI scheme for resources exposed by the agent
pub const RESOURCE_SCHEME: &str = "studio";

/// Resource type segment for scenes
pub const SCENE_RESOURCE_TYPE: &str = "scene";

/// Change notification emitted to host subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    ListChanged,
    ResourceUpdated { uri: String },
}

/// Build the resource URI for a scene: `studio://scene/<name>`
///
/// The name is inserted verbatim; escaping is up to the caller.
pub fn scene_uri(name: &str) -> String {
    format!("{RESOURCE_SCHEME}://{SCENE_RESOURCE_TYPE}/{name}")
}
