//! Errors raised while decoding shared types.

use crate::work::TargetType;
use thiserror::Error;

/// Failure to turn stored payload bytes back into a typed [`crate::WorkPayload`]
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Payload for {target} is malformed: {source}")]
    Malformed {
        target: TargetType,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode payload for {target}: {source}")]
    Encode {
        target: TargetType,
        #[source]
        source: serde_json::Error,
    },
}
