use serde::{Deserialize, Serialize};

/// Kind of modification carried by a change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Change {
    /// An enable flag was toggled.
    Enable,
    /// Scale, rotation or translation changed.
    Transform,
    /// Shape geometry changed.
    Geometry,
    /// Children or shapes were added, removed or replaced.
    Graph,
    /// Only material values changed; bounds are unaffected.
    Appearance,
}

impl Change {
    /// Returns true if the change can alter bounds.
    pub fn affects_bounds(self) -> bool {
        self != Change::Appearance
    }
}
