use std::fmt;

/// External events that may unthrottle stored retry state.
///
/// Policy documents reference these by name in `UnthrottlingEvents`; the
/// set is closed and unknown names are rejected at parse time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnthrottleEvent {
    /// Carrier configuration was replaced; clears every APN store.
    CarrierConfigChanged,
    /// Wi-Fi was disabled.
    WifiDisable,
    /// Airplane mode was disabled.
    ApmDisable,
    /// Airplane mode was enabled.
    ApmEnable,
    /// The device attached to a different Wi-Fi access point.
    WifiApChanged,
    /// Wi-Fi calling was enabled.
    WifiCallingEnable,
    /// Wi-Fi calling was disabled.
    WifiCallingDisable,
    /// Cross-SIM calling was enabled.
    CrossSimCallingEnable,
    /// Cross-SIM calling was disabled.
    CrossSimCallingDisable,
    /// Carrier configuration loaded for an unknown carrier.
    CarrierConfigUnknownCarrier,
    /// Serving-cell information changed.
    CellInfoChanged,
    /// The preferred network type changed.
    PreferredNetworkTypeChanged,
}

impl UnthrottleEvent {
    /// Event name as spelled in policy documents.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CarrierConfigChanged => "CARRIER_CONFIG_CHANGED_EVENT",
            Self::WifiDisable => "WIFI_DISABLE_EVENT",
            Self::ApmDisable => "APM_DISABLE_EVENT",
            Self::ApmEnable => "APM_ENABLE_EVENT",
            Self::WifiApChanged => "WIFI_AP_CHANGED_EVENT",
            Self::WifiCallingEnable => "WIFI_CALLING_ENABLE_EVENT",
            Self::WifiCallingDisable => "WIFI_CALLING_DISABLE_EVENT",
            Self::CrossSimCallingEnable => "CROSS_SIM_CALLING_ENABLE_EVENT",
            Self::CrossSimCallingDisable => "CROSS_SIM_CALLING_DISABLE_EVENT",
            Self::CarrierConfigUnknownCarrier => "CARRIER_CONFIG_UNKNOWN_CARRIER_EVENT",
            Self::CellInfoChanged => "CELLINFO_CHANGED_EVENT",
            Self::PreferredNetworkTypeChanged => "PREFERRED_NETWORK_TYPE_CHANGED_EVENT",
        }
    }

    /// Parses a policy-document event name, `None` for unknown names.
    pub fn from_token(s: &str) -> Option<Self> {
        match s {
            "CARRIER_CONFIG_CHANGED_EVENT" => Some(Self::CarrierConfigChanged),
            "WIFI_DISABLE_EVENT" => Some(Self::WifiDisable),
            "APM_DISABLE_EVENT" => Some(Self::ApmDisable),
            "APM_ENABLE_EVENT" => Some(Self::ApmEnable),
            "WIFI_AP_CHANGED_EVENT" => Some(Self::WifiApChanged),
            "WIFI_CALLING_ENABLE_EVENT" => Some(Self::WifiCallingEnable),
            "WIFI_CALLING_DISABLE_EVENT" => Some(Self::WifiCallingDisable),
            "CROSS_SIM_CALLING_ENABLE_EVENT" => Some(Self::CrossSimCallingEnable),
            "CROSS_SIM_CALLING_DISABLE_EVENT" => Some(Self::CrossSimCallingDisable),
            "CARRIER_CONFIG_UNKNOWN_CARRIER_EVENT" => Some(Self::CarrierConfigUnknownCarrier),
            "CELLINFO_CHANGED_EVENT" => Some(Self::CellInfoChanged),
            "PREFERRED_NETWORK_TYPE_CHANGED_EVENT" => Some(Self::PreferredNetworkTypeChanged),
            _ => None,
        }
    }

    /// All events, in document-name order.
    pub const ALL: [Self; 12] = [
        Self::CarrierConfigChanged,
        Self::WifiDisable,
        Self::ApmDisable,
        Self::ApmEnable,
        Self::WifiApChanged,
        Self::WifiCallingEnable,
        Self::WifiCallingDisable,
        Self::CrossSimCallingEnable,
        Self::CrossSimCallingDisable,
        Self::CarrierConfigUnknownCarrier,
        Self::CellInfoChanged,
        Self::PreferredNetworkTypeChanged,
    ];
}

impl fmt::Display for UnthrottleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
