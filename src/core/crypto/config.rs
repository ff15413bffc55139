/*!
Cryptor configuration.
*/

#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

use crate::core::constants::MAX_BUFFER_SIZE;
use crate::core::session::state::Role;

/// Configuration for a Cryptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde-support", serde(default))]
pub struct CryptorConfig {
    /// Accept (server) or connect (client) behavior
    pub role: Role,
    /// Capacity attached to each memory buffer
    pub max_buffer_size: usize,
}

impl Default for CryptorConfig {
    fn default() -> Self {
        Self {
            role: Role::Client,
            max_buffer_size: MAX_BUFFER_SIZE,
        }
    }
}

impl CryptorConfig {
    /// Client configuration with default settings
    pub fn client() -> Self {
        Self::default()
    }

    /// Server configuration with default settings
    pub fn server() -> Self {
        Self {
            role: Role::Server,
            ..Self::default()
        }
    }

    /// Override the memory buffer capacity; zero is raised to one byte
    pub fn with_buffer_size(mut self, max_buffer_size: usize) -> Self {
        self.max_buffer_size = max_buffer_size.max(1);
        self
    }
}
