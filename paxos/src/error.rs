//! Error contexts for [`error_stack::Report`]

use std::fmt;

/// Invalid cluster configuration
#[derive(Debug)]
pub struct ConfigError;

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid cluster configuration")
    }
}

impl std::error::Error for ConfigError {}

/// A message could not be handed to the transport
#[derive(Debug)]
pub struct TransportError;

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("failed to send message")
    }
}

impl std::error::Error for TransportError {}

/// The node task is not running
#[derive(Debug)]
pub struct NodeError;

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("node is no longer running")
    }
}

impl std::error::Error for NodeError {}
