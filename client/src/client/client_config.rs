use std::default::Default;

/// Contains Config properties which will be used by a Client
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    /// Level of detail threshold reported to the server along with the
    /// client position. Smaller values request finer data further away.
    pub lod_threshold: f32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            lod_threshold: 0.01,
        }
    }
}
