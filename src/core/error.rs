//! Error types for the LLCP transport.

use thiserror::Error;

use crate::transport::DmReason;

/// Errors reported by the link-layer send primitive.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// A frame is already in flight on the link.
    #[error("link busy")]
    Busy,

    /// The link has been deactivated.
    #[error("link closed")]
    Closed,

    /// The link layer refused or failed the transmission.
    #[error("link send failed: {0}")]
    Rejected(String),
}

/// Errors returned by socket operations and delivered to socket callbacks.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LlcpError {
    /// Malformed caller input (bad SAP, option out of range, stale handle).
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// Operation not valid in the socket's current state.
    #[error("invalid state for {0}")]
    InvalidState(&'static str),

    /// Working buffer cannot hold the negotiated MIU x RW layout.
    #[error("working buffer too small: need {needed} bytes, got {actual}")]
    BufferTooSmall {
        /// Bytes required by the layout.
        needed: usize,
        /// Bytes supplied.
        actual: usize,
    },

    /// Generic transport failure, e.g. the link rejected a frame or the peer
    /// tore the connection down.
    #[error("operation failed")]
    Failed,

    /// Operation cancelled by a concurrent close or disconnect.
    #[error("operation aborted")]
    Aborted,

    /// Unsupported parameter combination.
    #[error("not supported: {0}")]
    NotSupported(&'static str),

    /// No free socket slot or SAP.
    #[error("insufficient resources")]
    InsufficientResources,

    /// SAP or service name already bound by another socket.
    #[error("already registered")]
    AlreadyRegistered,

    /// An operation of the same kind is already pending on this socket.
    #[error("operation already pending")]
    OperationPending,

    /// Peer answered the connection attempt with a DM frame.
    #[error("connection refused: {0:?}")]
    ConnectRefused(DmReason),

    /// Peer rejected one of our frames with FRMR.
    #[error("frame rejected by peer")]
    FrameRejected,

    /// Link-layer failure.
    #[error("link error: {0}")]
    Link(#[from] LinkError),
}

impl LlcpError {
    /// Check if this is a teardown status (operation cancelled rather than
    /// rejected up front).
    pub fn is_abort(&self) -> bool {
        matches!(self, LlcpError::Aborted | LlcpError::Failed)
    }

    /// Check if retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlcpError::OperationPending
                | LlcpError::InsufficientResources
                | LlcpError::Link(LinkError::Busy)
        )
    }
}

/// Result type for socket operations.
pub type LlcpResult<T> = Result<T, LlcpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_errors() {
        assert!(LlcpError::Aborted.is_abort());
        assert!(LlcpError::Failed.is_abort());

        assert!(!LlcpError::InvalidState("send").is_abort());
        assert!(!LlcpError::ConnectRefused(DmReason::SapNotFound).is_abort());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(LlcpError::OperationPending.is_retryable());
        assert!(LlcpError::Link(LinkError::Busy).is_retryable());

        assert!(!LlcpError::Link(LinkError::Closed).is_retryable());
        assert!(!LlcpError::AlreadyRegistered.is_retryable());
    }

    #[test]
    fn test_link_error_conversion() {
        let err: LlcpError = LinkError::Closed.into();
        assert_eq!(err, LlcpError::Link(LinkError::Closed));
        assert_eq!(err.to_string(), "link error: link closed");
    }

    #[test]
    fn test_buffer_too_small_message() {
        let err = LlcpError::BufferTooSmall {
            needed: 384,
            actual: 200,
        };
        assert_eq!(
            err.to_string(),
            "working buffer too small: need 384 bytes, got 200"
        );
    }
}
