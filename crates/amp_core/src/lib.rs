//! # AMP Core
//!
//! This crate provides core error handling and utilities for the AMP Game Engine.
//! It defines the primary error types and result aliases used throughout the engine.

/// A specialized `Result` type for operations that may fail within the AMP engine.
///
/// This type is used as the return type for functions that may encounter errors
/// during execution. It provides a convenient way to handle both successful
/// results and error conditions.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the AMP Game Engine.
///
/// This enum represents all possible errors that can occur within the engine.
/// It uses `thiserror` for automatic error trait implementations and provides
/// structured error handling across all engine components.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// I/O related errors (file operations, network, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// Resource loading errors
    #[error("Failed to load resource '{resource}': {reason}")]
    ResourceLoad {
        /// Resource name
        resource: String,
        /// Failure reason
        reason: String,
    },

    /// Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        /// Error message
        message: String,
    },

    /// Invalid state errors
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Error message
        message: String,
    },

    /// GPU-related errors
    #[error("GPU error: {message}")]
    Gpu {
        /// Error message
        message: String,
    },

    /// Configuration-specific errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Worldgen-specific errors (layer topology, chunk lifecycle, pools)
    #[error("Worldgen error: {0}")]
    Worldgen(#[from] WorldgenError),

    /// Generic error for cases not covered by specific variants
    #[error("Internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },
}

/// Errors specific to the worldgen engine's layer graph, chunk
/// lifecycle, and resource pools.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum WorldgenError {
    /// A layer graph mutation would introduce a duplicate name, a
    /// dangling dependency, or a cycle. Fatal, rejected at
    /// graph-mutation time.
    #[error("layer topology error: {message}")]
    Topology {
        /// Description of the rejected mutation
        message: String,
    },

    /// A query for a world position whose layer has no loaded chunk.
    /// Surfaced to the caller as "not yet available"; never retried
    /// internally.
    #[error("no loaded chunk covers the queried position in layer '{layer}'")]
    MissingChunk {
        /// Name of the layer queried
        layer: String,
    },

    /// A texture-pool acquire during build returned none. The chunk
    /// skips store; the manager does not retry automatically.
    #[error("texture-slot pool '{pool}' is exhausted")]
    PoolExhausted {
        /// Name or identifier of the exhausted pool
        pool: String,
    },

    /// A per-pixel heightmap task could not find biome weights for a
    /// point expected to be inside a triangulation. The offending
    /// pixel defaults to zero; the chunk stores normally. This variant
    /// exists for the log/observe path, not as a hard failure.
    #[error("generation error at ({x}, {y}): {message}")]
    Generation {
        /// World-space x coordinate of the offending sample
        x: f32,
        /// World-space y coordinate of the offending sample
        y: f32,
        /// Description of the failure
        message: String,
    },

    /// A §3 invariant was violated. Fatal; callers should treat this
    /// as unrecoverable and let it abort rather than catch it.
    #[error("invariant violated: {message}")]
    Assertion {
        /// Description of the violated invariant
        message: String,
    },
}

impl WorldgenError {
    /// Create a new topology error.
    pub fn topology<S: Into<String>>(message: S) -> Self {
        Self::Topology {
            message: message.into(),
        }
    }

    /// Create a new missing-chunk error.
    pub fn missing_chunk<S: Into<String>>(layer: S) -> Self {
        Self::MissingChunk {
            layer: layer.into(),
        }
    }

    /// Create a new pool-exhausted error.
    pub fn pool_exhausted<S: Into<String>>(pool: S) -> Self {
        Self::PoolExhausted { pool: pool.into() }
    }

    /// Create a new generation error.
    pub fn generation<S: Into<String>>(x: f32, y: f32, message: S) -> Self {
        Self::Generation {
            x,
            y,
            message: message.into(),
        }
    }

    /// Create a new assertion-failure error.
    ///
    /// Per §7, an `AssertionFailure` is fatal and never caught; callers
    /// are expected to `panic!` with this value rather than propagate
    /// it through a `Result` chain that might be swallowed.
    pub fn assertion<S: Into<String>>(message: S) -> Self {
        Self::Assertion {
            message: message.into(),
        }
    }
}

/// Configuration-specific error types for the config_core crate
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file
        path: String,
    },

    /// Configuration parsing error
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Error message
        message: String,
    },

    /// Invalid configuration format
    #[error("Invalid configuration format: {message}")]
    InvalidFormat {
        /// Error message
        message: String,
    },

    /// I/O error during configuration operations
    #[error("I/O error in configuration: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Create a new serialization error
    pub fn serialization<S: Into<String>>(message: S) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new resource loading error
    pub fn resource_load<R: Into<String>, S: Into<String>>(resource: R, reason: S) -> Self {
        Self::ResourceLoad {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new invalid state error
    pub fn invalid_state<S: Into<String>>(message: S) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a new GPU error
    pub fn gpu<S: Into<String>>(message: S) -> Self {
        Self::Gpu {
            message: message.into(),
        }
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl ConfigError {
    /// Create a new file not found error
    pub fn file_not_found<S: Into<String>>(path: S) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Create a new parse error
    pub fn parse_error<S: Into<String>>(message: S) -> Self {
        Self::ParseError {
            message: message.into(),
        }
    }

    /// Create a new invalid format error
    pub fn invalid_format<S: Into<String>>(message: S) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }
}
