use serde::Serialize;

use crate::TunnelError;

/// IKEv2 notify type for AUTHENTICATION_FAILED.
pub const IKE_NOTIFY_AUTHENTICATION_FAILED: u32 = 24;
/// IKEv2 notify type for INTERNAL_ADDRESS_FAILURE.
pub const IKE_NOTIFY_INTERNAL_ADDRESS_FAILURE: u32 = 36;

/// Stable failure cause reported to the data-service framework.
///
/// Protocol rows are bit-exact against the carrier-facing table; changing a
/// mapping is a wire-compatibility break.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum FailCause {
    None,
    ErrorUnspecified,
    Ikev2AuthFailure,
    EpdgInternalAddressFailure,
    PdnConnectionRejection,
    MaxConnectionReached,
    SemanticErrorInTft,
    SyntacticalErrorInTft,
    SemanticErrorsInPacketFilters,
    SyntacticalErrorsInPacketFilters,
    #[serde(rename = "NON_3GPP_ACCESS_TO_EPC_NOT_ALLOWED")]
    Non3gppAccessToEpcNotAllowed,
    UserUnknown,
    NoApnSubscription,
    AuthorizationRejected,
    IllegalMe,
    NetworkFailure,
    RatTypeNotAllowed,
    ImeiNotAccepted,
    PlmnNotAllowed,
    UnauthenticatedEmergencyNotSupported,
    Congestion,
    PrivateProtocolError,
    DnsResolutionNameFailure,
    OnlyIpv4Allowed,
    OnlyIpv6Allowed,
    Ikev2MsgTimeout,
    SimCardChanged,
    TunnelNotFound,
    IkeInitTimeout,
    IkeMobilityTimeout,
    IkeDpdTimeout,
    TunnelTransformFailed,
    IkeNetworkLostException,
    IkeSessionClosedBeforeChildOpened,
}

impl FailCause {
    /// Maps a reported tunnel error to its public cause. Total: every error
    /// lands on a row, unknown shapes land on `ErrorUnspecified`.
    pub const fn from_error(error: &TunnelError) -> Self {
        match error {
            TunnelError::NoError => Self::None,
            TunnelError::IkeProtocol { code } => Self::from_ike_code(*code),
            TunnelError::ServerSelectionFailed => Self::DnsResolutionNameFailure,
            TunnelError::OnlyIpv4Allowed => Self::OnlyIpv4Allowed,
            TunnelError::OnlyIpv6Allowed => Self::OnlyIpv6Allowed,
            TunnelError::IkeIo => Self::Ikev2MsgTimeout,
            TunnelError::SimCardChanged => Self::SimCardChanged,
            TunnelError::TunnelNotFound => Self::TunnelNotFound,
            TunnelError::IkeInitTimeout => Self::IkeInitTimeout,
            TunnelError::IkeMobilityTimeout => Self::IkeMobilityTimeout,
            TunnelError::IkeDpdTimeout => Self::IkeDpdTimeout,
            TunnelError::TunnelTransformFailed => Self::TunnelTransformFailed,
            TunnelError::IkeNetworkLost => Self::IkeNetworkLostException,
            TunnelError::IkeSessionClosedBeforeChildOpened => {
                Self::IkeSessionClosedBeforeChildOpened
            }
            TunnelError::Timeout => Self::ErrorUnspecified,
        }
    }

    /// Maps an IKEv2 notify code to its public cause.
    pub const fn from_ike_code(code: u32) -> Self {
        match code {
            IKE_NOTIFY_AUTHENTICATION_FAILED => Self::Ikev2AuthFailure,
            IKE_NOTIFY_INTERNAL_ADDRESS_FAILURE => Self::EpdgInternalAddressFailure,
            8192 => Self::PdnConnectionRejection,
            8193 => Self::MaxConnectionReached,
            8241 => Self::SemanticErrorInTft,
            8242 => Self::SyntacticalErrorInTft,
            8244 => Self::SemanticErrorsInPacketFilters,
            8245 => Self::SyntacticalErrorsInPacketFilters,
            9000 => Self::Non3gppAccessToEpcNotAllowed,
            9001 => Self::UserUnknown,
            9002 => Self::NoApnSubscription,
            9003 => Self::AuthorizationRejected,
            9006 => Self::IllegalMe,
            10500 => Self::NetworkFailure,
            11001 => Self::RatTypeNotAllowed,
            11005 => Self::ImeiNotAccepted,
            11011 => Self::PlmnNotAllowed,
            11055 => Self::UnauthenticatedEmergencyNotSupported,
            15500 => Self::Congestion,
            _ => Self::PrivateProtocolError,
        }
    }
}
