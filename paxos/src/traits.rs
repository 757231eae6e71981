//! Transport seam between a node and the network.

use error_stack::Report;

use crate::error::TransportError;
use crate::messages::Envelope;

/// Delivers envelopes to other cluster members.
///
/// Sends are fire-and-forget: success means the envelope was handed off, not
/// that it was processed. Implementations MUST deliver each envelope at most
/// once and keep per-sender FIFO order.
pub trait Transport<V>: Send + Sync + 'static {
    /// # Errors
    ///
    /// Returns [`TransportError`] if the recipient is unknown or unreachable.
    fn send(&self, envelope: Envelope<V>) -> Result<(), Report<TransportError>>;
}
