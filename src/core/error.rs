use crate::core::codec::CodecError;

/// Failure of a resolution call.
///
/// Every public resolver operation either yields a complete
/// [ResolvedBundle](crate::core::bundle::ResolvedBundle) or fails with one of these variants,
/// never a partial result. [Error::SignatureVerificationFailed] is the only kind the resolver
/// downgrades (to `verified = false`) instead of propagating.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The Health Link manifest is missing, undecodable, or lacks a required field.
    #[error("invalid health link manifest: {0}")]
    InvalidManifest(String),

    /// The gateway returned no usable health card file.
    #[error("health link did not contain any embedded health card")]
    NoPayload,

    /// Authenticated decryption of a link payload failed.
    #[error("failed to decrypt health link payload: {0}")]
    DecryptionFailed(String),

    /// A decrypted payload did not carry a `verifiableCredential` array.
    #[error("malformed health link plaintext: {0}")]
    MalformedPlaintext(String),

    /// The credential is not a decodable health card.
    #[error("malformed health card: {0}")]
    MalformedCredential(String),

    /// The issuer's key set could not be obtained.
    #[error("unable to discover keys for issuer `{issuer}`: {reason}")]
    KeyDiscoveryFailed { issuer: String, reason: String },

    /// The compact signature did not verify against the issuer's key set.
    #[error("signature verification failed: {0}")]
    SignatureVerificationFailed(String),

    /// The link requires a passcode and none was supplied.
    #[error("health link requires a passcode")]
    PasscodeRequired,

    /// The retrieval gateway failed or answered with a non-success status.
    #[error("health link retrieval failed: {0}")]
    RetrievalFailed(String),

    /// The caller abandoned the resolution.
    #[error("resolution was cancelled")]
    Cancelled,
}

/// Fieldless discriminant of [Error].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidManifest,
    NoPayload,
    DecryptionFailed,
    MalformedPlaintext,
    MalformedCredential,
    KeyDiscoveryFailed,
    SignatureVerificationFailed,
    PasscodeRequired,
    RetrievalFailed,
    Cancelled,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidManifest(_) => ErrorKind::InvalidManifest,
            Error::NoPayload => ErrorKind::NoPayload,
            Error::DecryptionFailed(_) => ErrorKind::DecryptionFailed,
            Error::MalformedPlaintext(_) => ErrorKind::MalformedPlaintext,
            Error::MalformedCredential(_) => ErrorKind::MalformedCredential,
            Error::KeyDiscoveryFailed { .. } => ErrorKind::KeyDiscoveryFailed,
            Error::SignatureVerificationFailed(_) => ErrorKind::SignatureVerificationFailed,
            Error::PasscodeRequired => ErrorKind::PasscodeRequired,
            Error::RetrievalFailed(_) => ErrorKind::RetrievalFailed,
            Error::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// The input is not a health artifact at all (bad base64url, JSON, or deflate data).
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            Error::InvalidManifest(_) | Error::MalformedPlaintext(_) | Error::MalformedCredential(_)
        )
    }

    /// The input is a health artifact whose decryption or signature failed.
    pub fn is_cryptographic(&self) -> bool {
        matches!(
            self,
            Error::DecryptionFailed(_) | Error::SignatureVerificationFailed(_)
        )
    }

    pub(crate) fn manifest(e: impl ToString) -> Self {
        Self::InvalidManifest(e.to_string())
    }

    pub(crate) fn credential(e: impl ToString) -> Self {
        Self::MalformedCredential(e.to_string())
    }

    pub(crate) fn decryption(e: impl ToString) -> Self {
        Self::DecryptionFailed(e.to_string())
    }

    pub(crate) fn plaintext(e: impl ToString) -> Self {
        Self::MalformedPlaintext(e.to_string())
    }
}

impl From<CodecError> for Error {
    /// Codec failures outside of a more specific stage mean the credential is malformed.
    fn from(e: CodecError) -> Self {
        Self::credential(e)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
