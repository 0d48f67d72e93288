use std::fmt;

/// Outcome of a tunnel bring-up or teardown reported by the IKEv2 engine.
///
/// `NoError` is a valid report: it tells the throttling layer the APN is
/// healthy again and any stored retry state can be dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TunnelError {
    /// Successful outcome, clears stored retry state for the APN.
    NoError,
    /// The peer rejected the exchange with an IKEv2 notify payload.
    IkeProtocol {
        /// Notify message type carried by the payload.
        code: u32,
    },
    /// I/O failure inside the IKE session transport.
    IkeIo,
    /// The engine gave up waiting for an internal operation.
    Timeout,
    /// ePDG server selection produced no usable address.
    ServerSelectionFailed,
    /// IPsec transforms could not be applied to the tunnel interface.
    TunnelTransformFailed,
    /// The underlying network disappeared mid-exchange.
    IkeNetworkLost,
    /// Discovery returned only IPv4 ePDG addresses but IPv6 was required.
    OnlyIpv4Allowed,
    /// Discovery returned only IPv6 ePDG addresses but IPv4 was required.
    OnlyIpv6Allowed,
    /// IKE_SA_INIT timed out.
    IkeInitTimeout,
    /// MOBIKE exchange timed out.
    IkeMobilityTimeout,
    /// Dead-peer detection timed out.
    IkeDpdTimeout,
    /// The SIM card changed underneath an established session.
    SimCardChanged,
    /// A teardown was requested for a tunnel that no longer exists.
    TunnelNotFound,
    /// The IKE session closed before the first child SA opened.
    IkeSessionClosedBeforeChildOpened,
}

impl TunnelError {
    /// Returns `true` for the successful outcome.
    pub const fn is_no_error(&self) -> bool {
        matches!(self, Self::NoError)
    }

    /// Returns `true` when the error carries an IKEv2 notify code.
    pub const fn is_ike_protocol(&self) -> bool {
        matches!(self, Self::IkeProtocol { .. })
    }

    /// Notify code for protocol errors.
    pub const fn ike_code(&self) -> Option<u32> {
        match self {
            Self::IkeProtocol { code } => Some(*code),
            _ => None,
        }
    }

    /// Fieldless discriminant, used as part of the retry-cause key.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NoError => ErrorKind::NoError,
            Self::IkeProtocol { .. } => ErrorKind::IkeProtocol,
            Self::IkeIo => ErrorKind::IkeIo,
            Self::Timeout => ErrorKind::Timeout,
            Self::ServerSelectionFailed => ErrorKind::ServerSelectionFailed,
            Self::TunnelTransformFailed => ErrorKind::TunnelTransformFailed,
            Self::IkeNetworkLost => ErrorKind::IkeNetworkLost,
            Self::OnlyIpv4Allowed => ErrorKind::OnlyIpv4Allowed,
            Self::OnlyIpv6Allowed => ErrorKind::OnlyIpv6Allowed,
            Self::IkeInitTimeout => ErrorKind::IkeInitTimeout,
            Self::IkeMobilityTimeout => ErrorKind::IkeMobilityTimeout,
            Self::IkeDpdTimeout => ErrorKind::IkeDpdTimeout,
            Self::SimCardChanged => ErrorKind::SimCardChanged,
            Self::TunnelNotFound => ErrorKind::TunnelNotFound,
            Self::IkeSessionClosedBeforeChildOpened => {
                ErrorKind::IkeSessionClosedBeforeChildOpened
            }
        }
    }

    /// Generic policy-detail token this error corresponds to, if any.
    ///
    /// Errors without a token can only be matched by wildcard details or a
    /// fallback clause.
    pub const fn generic_detail(&self) -> Option<GenericDetail> {
        match self {
            Self::IkeIo => Some(GenericDetail::IoException),
            Self::Timeout => Some(GenericDetail::TimeoutException),
            Self::ServerSelectionFailed => Some(GenericDetail::ServerSelectionFailed),
            Self::TunnelTransformFailed => Some(GenericDetail::TunnelTransformFailed),
            Self::IkeNetworkLost => Some(GenericDetail::IkeNetworkLostException),
            Self::OnlyIpv4Allowed => Some(GenericDetail::EpdgAddressOnlyIpv4Allowed),
            Self::OnlyIpv6Allowed => Some(GenericDetail::EpdgAddressOnlyIpv6Allowed),
            Self::IkeInitTimeout => Some(GenericDetail::IkeInitTimeout),
            Self::IkeMobilityTimeout => Some(GenericDetail::IkeMobilityTimeout),
            Self::IkeDpdTimeout => Some(GenericDetail::IkeDpdTimeout),
            _ => None,
        }
    }
}

impl fmt::Display for TunnelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoError => write!(f, "NO_ERROR"),
            Self::IkeProtocol { code } => write!(f, "IKE_PROTOCOL_ERROR_{code}"),
            Self::SimCardChanged => write!(f, "SIM_CARD_CHANGED"),
            Self::TunnelNotFound => write!(f, "TUNNEL_NOT_FOUND"),
            Self::IkeSessionClosedBeforeChildOpened => {
                write!(f, "IKE_SESSION_CLOSED_BEFORE_CHILD_OPENED")
            }
            other => match other.generic_detail() {
                Some(detail) => write!(f, "{}", detail.as_str()),
                None => write!(f, "{other:?}"),
            },
        }
    }
}

/// Discriminant of [`TunnelError`] without payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ErrorKind {
    NoError,
    IkeProtocol,
    IkeIo,
    Timeout,
    ServerSelectionFailed,
    TunnelTransformFailed,
    IkeNetworkLost,
    OnlyIpv4Allowed,
    OnlyIpv6Allowed,
    IkeInitTimeout,
    IkeMobilityTimeout,
    IkeDpdTimeout,
    SimCardChanged,
    TunnelNotFound,
    IkeSessionClosedBeforeChildOpened,
}

/// Key under which retry actions accumulate inside a per-APN store.
///
/// Protocol errors throttle per notify code; everything else throttles per
/// error kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCause {
    /// One cause per distinct IKEv2 notify code.
    IkeProtocol(u32),
    /// One cause per non-protocol error kind.
    Kind(ErrorKind),
}

impl From<&TunnelError> for ErrorCause {
    fn from(error: &TunnelError) -> Self {
        match error.ike_code() {
            Some(code) => Self::IkeProtocol(code),
            None => Self::Kind(error.kind()),
        }
    }
}

/// Detail tokens accepted by `GENERIC_ERROR_TYPE` policy clauses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum GenericDetail {
    IoException,
    TimeoutException,
    ServerSelectionFailed,
    TunnelTransformFailed,
    IkeNetworkLostException,
    EpdgAddressOnlyIpv4Allowed,
    EpdgAddressOnlyIpv6Allowed,
    IkeInitTimeout,
    IkeMobilityTimeout,
    IkeDpdTimeout,
}

impl GenericDetail {
    /// Token spelling used in policy documents.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::IoException => "IO_EXCEPTION",
            Self::TimeoutException => "TIMEOUT_EXCEPTION",
            Self::ServerSelectionFailed => "SERVER_SELECTION_FAILED",
            Self::TunnelTransformFailed => "TUNNEL_TRANSFORM_FAILED",
            Self::IkeNetworkLostException => "IKE_NETWORK_LOST_EXCEPTION",
            Self::EpdgAddressOnlyIpv4Allowed => "EPDG_ADDRESS_ONLY_IPV4_ALLOWED",
            Self::EpdgAddressOnlyIpv6Allowed => "EPDG_ADDRESS_ONLY_IPV6_ALLOWED",
            Self::IkeInitTimeout => "IKE_INIT_TIMEOUT",
            Self::IkeMobilityTimeout => "IKE_MOBILITY_TIMEOUT",
            Self::IkeDpdTimeout => "IKE_DPD_TIMEOUT",
        }
    }

    /// Parses a policy-document token, `None` for anything outside the
    /// closed set.
    pub fn from_token(s: &str) -> Option<Self> {
        match s {
            "IO_EXCEPTION" => Some(Self::IoException),
            "TIMEOUT_EXCEPTION" => Some(Self::TimeoutException),
            "SERVER_SELECTION_FAILED" => Some(Self::ServerSelectionFailed),
            "TUNNEL_TRANSFORM_FAILED" => Some(Self::TunnelTransformFailed),
            "IKE_NETWORK_LOST_EXCEPTION" => Some(Self::IkeNetworkLostException),
            "EPDG_ADDRESS_ONLY_IPV4_ALLOWED" => Some(Self::EpdgAddressOnlyIpv4Allowed),
            "EPDG_ADDRESS_ONLY_IPV6_ALLOWED" => Some(Self::EpdgAddressOnlyIpv6Allowed),
            "IKE_INIT_TIMEOUT" => Some(Self::IkeInitTimeout),
            "IKE_MOBILITY_TIMEOUT" => Some(Self::IkeMobilityTimeout),
            "IKE_DPD_TIMEOUT" => Some(Self::IkeDpdTimeout),
            _ => None,
        }
    }
}
