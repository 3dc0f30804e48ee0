//! # Error Types
//!
//! Every failure that can reach a client carries a numeric [`StatusCode`]
//! and a human readable reason. The numeric value is what travels in the
//! `code` header of an error `resp` frame.

use std::fmt;
use thiserror::Error;

/// Numeric status codes.
///
/// `2xx` are success codes, `4xx` are router-side rejections and `5xx`
/// originate from the registry backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum StatusCode {
    Okay = 200,
    OkayAsResolved = 201,

    Unresolvable = 401,
    InvalidDOT = 402,
    InvalidSig = 403,
    TTLExpired = 404,
    BadPermissions = 405,
    OriginVKMismatch = 406,
    NoOrigin = 407,
    BadURI = 408,
    BadOperation = 409,
    MVKMismatch = 410,
    MalformedMessage = 411,
    AffinityMismatch = 412,
    PeerError = 413,
    ExpiredDOT = 414,
    ExpiredEntity = 415,
    RevokedDOT = 416,
    RevokedEntity = 417,
    ChainOriginNotMVK = 418,
    InvalidEntity = 419,
    NotAccessRO = 420,
    BadLink = 421,
    OverconstrainedURI = 422,
    NoEntity = 423,
    InvalidOOBCommand = 424,
    MalformedOOBCommand = 425,
    ChainBuildFailed = 426,
    InvalidCoding = 427,
    ResolutionFailed = 428,
    BadChainBuildParams = 429,
    InvalidSlice = 430,
    BadView = 431,
    ViewError = 432,
    UnsubscribeError = 433,
    ExpiredMessage = 434,
    InvalidRevocation = 435,

    RegistryEntityResolutionFailed = 500,
    RegistryDOTResolutionFailed = 501,
    RegistryChainResolutionFailed = 502,
    RegistryEntityInvalid = 503,
    RegistryDOTInvalid = 504,
    RegistryChainInvalid = 505,
    BlockChainGenericError = 506,
    UFIInvocationError = 507,
    InvalidUFI = 508,
    InvalidAccountNumber = 509,
    TransactionTimeout = 510,
    TransactionConfirmationTimeout = 511,
    ChainStale = 512,
    UnresolvedAlias = 513,
    AliasExists = 514,
    AliasError = 515,
    NotRevokable = 516,
}

impl StatusCode {
    const ALL: [StatusCode; 54] = [
        Self::Okay,
        Self::OkayAsResolved,
        Self::Unresolvable,
        Self::InvalidDOT,
        Self::InvalidSig,
        Self::TTLExpired,
        Self::BadPermissions,
        Self::OriginVKMismatch,
        Self::NoOrigin,
        Self::BadURI,
        Self::BadOperation,
        Self::MVKMismatch,
        Self::MalformedMessage,
        Self::AffinityMismatch,
        Self::PeerError,
        Self::ExpiredDOT,
        Self::ExpiredEntity,
        Self::RevokedDOT,
        Self::RevokedEntity,
        Self::ChainOriginNotMVK,
        Self::InvalidEntity,
        Self::NotAccessRO,
        Self::BadLink,
        Self::OverconstrainedURI,
        Self::NoEntity,
        Self::InvalidOOBCommand,
        Self::MalformedOOBCommand,
        Self::ChainBuildFailed,
        Self::InvalidCoding,
        Self::ResolutionFailed,
        Self::BadChainBuildParams,
        Self::InvalidSlice,
        Self::BadView,
        Self::ViewError,
        Self::UnsubscribeError,
        Self::ExpiredMessage,
        Self::InvalidRevocation,
        Self::RegistryEntityResolutionFailed,
        Self::RegistryDOTResolutionFailed,
        Self::RegistryChainResolutionFailed,
        Self::RegistryEntityInvalid,
        Self::RegistryDOTInvalid,
        Self::RegistryChainInvalid,
        Self::BlockChainGenericError,
        Self::UFIInvocationError,
        Self::InvalidUFI,
        Self::InvalidAccountNumber,
        Self::TransactionTimeout,
        Self::TransactionConfirmationTimeout,
        Self::ChainStale,
        Self::UnresolvedAlias,
        Self::AliasExists,
        Self::AliasError,
        Self::NotRevokable,
    ];

    /// Numeric wire value.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Reverse lookup from the wire value.
    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }

    /// True for the 2xx family.
    pub fn is_okay(self) -> bool {
        matches!(self, Self::Okay | Self::OkayAsResolved)
    }

    /// Short description used when no reason is supplied.
    pub fn describe(self) -> &'static str {
        match self {
            Self::Okay => "okay",
            Self::OkayAsResolved => "okay (resolved)",
            Self::Unresolvable => "unresolvable",
            Self::InvalidDOT => "invalid DOT",
            Self::InvalidSig => "invalid signature",
            Self::TTLExpired => "TTL expired",
            Self::BadPermissions => "bad permissions",
            Self::OriginVKMismatch => "origin VK mismatch",
            Self::NoOrigin => "no origin",
            Self::BadURI => "bad URI",
            Self::BadOperation => "bad operation",
            Self::MVKMismatch => "MVK mismatch",
            Self::MalformedMessage => "malformed message",
            Self::AffinityMismatch => "affinity mismatch",
            Self::PeerError => "peer error",
            Self::ExpiredDOT => "expired DOT",
            Self::ExpiredEntity => "expired entity",
            Self::RevokedDOT => "revoked DOT",
            Self::RevokedEntity => "revoked entity",
            Self::ChainOriginNotMVK => "chain origin is not MVK",
            Self::InvalidEntity => "invalid entity",
            Self::NotAccessRO => "not an access routing object",
            Self::BadLink => "bad link",
            Self::OverconstrainedURI => "overconstrained URI",
            Self::NoEntity => "no entity",
            Self::InvalidOOBCommand => "invalid OOB command",
            Self::MalformedOOBCommand => "malformed OOB command",
            Self::ChainBuildFailed => "chain build failed",
            Self::InvalidCoding => "invalid coding",
            Self::ResolutionFailed => "resolution failed",
            Self::BadChainBuildParams => "bad chain build parameters",
            Self::InvalidSlice => "invalid slice",
            Self::BadView => "bad view",
            Self::ViewError => "view error",
            Self::UnsubscribeError => "unsubscribe error",
            Self::ExpiredMessage => "expired message",
            Self::InvalidRevocation => "invalid revocation",
            Self::RegistryEntityResolutionFailed => "registry entity resolution failed",
            Self::RegistryDOTResolutionFailed => "registry DOT resolution failed",
            Self::RegistryChainResolutionFailed => "registry chain resolution failed",
            Self::RegistryEntityInvalid => "registry entity invalid",
            Self::RegistryDOTInvalid => "registry DOT invalid",
            Self::RegistryChainInvalid => "registry chain invalid",
            Self::BlockChainGenericError => "registry backend error",
            Self::UFIInvocationError => "UFI invocation error",
            Self::InvalidUFI => "invalid UFI",
            Self::InvalidAccountNumber => "invalid account number",
            Self::TransactionTimeout => "transaction timeout",
            Self::TransactionConfirmationTimeout => "transaction confirmation timeout",
            Self::ChainStale => "registry chain is stale",
            Self::UnresolvedAlias => "unresolved alias",
            Self::AliasExists => "alias exists",
            Self::AliasError => "alias error",
            Self::NotRevokable => "not revokable",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code(), self.describe())
    }
}

/// The error every fallible router operation returns.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct BwError {
    /// Status code sent to the client.
    pub code: StatusCode,
    /// Human readable reason.
    pub message: String,
}

impl BwError {
    /// Error with an explicit reason.
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Error whose reason is the code description.
    pub fn from_code(code: StatusCode) -> Self {
        Self::new(code, code.describe())
    }

    /// Error that embeds an underlying cause in the reason.
    pub fn wrap(code: StatusCode, message: &str, cause: impl fmt::Display) -> Self {
        Self::new(code, format!("{message}: {cause}"))
    }
}

impl From<StatusCode> for BwError {
    fn from(code: StatusCode) -> Self {
        Self::from_code(code)
    }
}

/// Shorthand result type.
pub type BwResult<T> = Result<T, BwError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip() {
        for code in StatusCode::ALL {
            assert_eq!(StatusCode::from_code(code.code()), Some(code));
        }
        assert_eq!(StatusCode::from_code(999), None);
    }

    #[test]
    fn test_known_values() {
        assert_eq!(StatusCode::BadPermissions.code(), 405);
        assert_eq!(StatusCode::OverconstrainedURI.code(), 422);
        assert_eq!(StatusCode::ChainStale.code(), 512);
        assert_eq!(StatusCode::NotRevokable.code(), 516);
    }

    #[test]
    fn test_error_display_carries_code() {
        let err = BwError::new(StatusCode::BadURI, "empty cell");
        assert_eq!(err.to_string(), "[408] bad URI: empty cell");
    }
}
