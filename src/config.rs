use thiserror::Error;

/// Split and containment policy of an [`Octree`](crate::Octree)
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Config {
    /// Number of faces a leaf may hold directly before it splits
    pub capacity: usize,
    /// Depth below which nodes are never split
    pub max_depth: u32,
    /// Factor applied to a node's edge width to obtain the width used for containment tests
    ///
    /// Must be greater than one. Larger values let faces move further before they have to be
    /// relocated, at the cost of more overlap between sibling nodes.
    pub looseness: f32,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if !(self.looseness.is_finite() && self.looseness > 1.0) {
            return Err(ConfigError::Looseness(self.looseness));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: 8,
            max_depth: 10,
            looseness: 2.0,
        }
    }
}

/// Reasons a [`Config`] is rejected
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("node capacity must be at least one face")]
    ZeroCapacity,
    #[error("looseness must be finite and greater than one, got {0}")]
    Looseness(f32),
}
