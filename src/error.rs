use thiserror::Error;

/// Operational error types
///
/// These are fatal for the message that produced them: the message is
/// rejected and the session aborted.
#[derive(Debug, Error)]
pub enum Error {
    #[error("athens: signature error: {0}")]
    SignatureError(#[from] ed25519_dalek::SignatureError),

    #[error("athens: envelope is not addressed to this key or is corrupted")]
    DecryptionFailed,

    #[error("athens: envelope too short to be well-formed")]
    EnvelopeTooShort,

    #[error("athens: message truncated - length prefix overruns the payload")]
    TruncatedMessage,

    #[error("athens: field name is not valid utf-8")]
    FieldNameBadUtf8,

    #[error("athens: message carries more fields than its format defines")]
    UnexpectedField,

    #[error("athens: missing field: {0}")]
    MissingField(&'static str),

    #[error("athens: field has the wrong length: {0}")]
    FieldBadLen(&'static str),

    #[error("athens: unknown or unexpected message kind")]
    UnexpectedMessageKind,

    #[error("athens: session identifiers do not match across channels")]
    SessionMismatch,

    #[error("athens: identity is not valid utf-8")]
    IdentityBadUtf8,

    #[error("athens: ballot digest must be 64 bytes")]
    DigestBadLen,

    #[error("athens: CBOR error deserializing message: {0}")]
    CBORDeserialization(#[from] serde_cbor::Error),

    #[error("athens: JSON error deserializing message: {0}")]
    JSONDeserialization(#[from] serde_json::Error),

    #[error("athens: error deserializing message: unknown format")]
    DeserializationUnknownFormat,
}

/// Protocol verification errors
///
/// Each variant names the check that failed, never the offending field
/// content. The rejecting party logs the detail on its own side.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("athens verification: voter identity signature invalid")]
    AuthenticationFailed,

    #[error("athens verification: voter is not eligible to cast a ballot")]
    VoterNotEligible,

    #[error("athens verification: official attestation invalid")]
    AuthorizationFailed,

    #[error("athens verification: ballot commitment was not signed by the voter")]
    VoterBindingFailed,

    #[error("athens verification: ballot does not match the authorized digest")]
    DigestMismatch,

    #[error("athens verification: receipt does not belong to this voting session")]
    ReceiptSessionMismatch,

    #[error("athens verification: {0}")]
    Message(#[from] Error),
}
