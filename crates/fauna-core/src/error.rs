//! Error types for device ports and configuration

use thiserror::Error;

/// Failures reported by the AR device port.
///
/// Every variant is recoverable: the controller logs it and degrades to the
/// next-best behaviour instead of propagating it to the user.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum XrError {
    #[error("reference space unavailable: {0}")]
    ReferenceSpaceUnavailable(String),
    #[error("hit-test source unavailable: {0}")]
    HitTestUnavailable(String),
    #[error("hit result does not support anchors")]
    AnchorUnsupported,
    #[error("anchor creation failed: {0}")]
    AnchorFailed(String),
    #[error("failed to register {channel} listener: {reason}")]
    ListenerFailed { channel: String, reason: String },
    #[error("JS error: {0}")]
    Js(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
