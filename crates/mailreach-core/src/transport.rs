//! Outbound email transport boundary.
//!
//! The engine never speaks SMTP or a provider API itself; it hands each
//! recipient's finished message to an [`EmailTransport`] implementation and
//! records the outcome. One logical call per recipient; batching, if any,
//! belongs behind this interface.

use std::future::Future;

/// Errors a transport can report for one message.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Provider rejected the message.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Connection to the provider failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Recipient address was not accepted.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

/// A fully rendered, personalized message ready for delivery.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    /// Recipient address.
    pub to: String,
    /// Personalized subject line.
    pub subject: String,
    /// Tracked, personalized HTML body.
    pub html: String,
    /// Personalized plain-text body.
    pub text: String,
    /// Sender address.
    pub from: String,
}

/// Provider acknowledgement for an accepted message.
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    /// Provider-assigned message id, recorded on the send row.
    pub message_id: String,
}

/// Outbound delivery collaborator.
///
/// Implementations must be shareable across dispatch workers.
pub trait EmailTransport: Send + Sync {
    /// Deliver one message.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the provider does not accept the
    /// message; the orchestrator records it on the send row and continues
    /// the run.
    fn send_email(
        &self,
        email: OutboundEmail,
    ) -> impl Future<Output = Result<DeliveryReceipt, TransportError>> + Send;
}
