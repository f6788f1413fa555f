//! Common types for the NAT classifier

use super::stun::{DecodeError, StunError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use thiserror::Error;

/// How the NAT picks an external port for one internal endpoint
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum MappingBehavior {
    /// Not determined
    #[default]
    Unknown,
    /// Same external endpoint regardless of destination
    EndpointIndependent,
    /// External endpoint changes per destination IP
    AddressDependent,
    /// External endpoint changes per destination IP and port
    AddressAndPortDependent,
}

/// Which inbound packets the NAT admits back to an existing mapping
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum FilteringBehavior {
    /// Not determined
    #[default]
    Unknown,
    /// Any remote endpoint may reach the mapping
    EndpointIndependent,
    /// Only remote IPs we have sent to may reach the mapping
    AddressDependent,
    /// Only remote IP:port pairs we have sent to may reach the mapping
    AddressAndPortDependent,
}

/// Coarse classification derived from the mapping behavior
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum NatClassification {
    /// Could not be determined
    #[default]
    Unknown,
    /// Endpoint-independent mapping
    Cone,
    /// Address and port-dependent mapping
    Symmetric,
    /// The first STUN server never answered
    Blocked,
}

/// Rating used by presentation layers to color a behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalOutlook {
    /// Hole punching is expected to work
    Favorable,
    /// Hole punching may need coordination from both sides
    Caution,
    /// Hole punching is unlikely to work, a relay is needed
    Unfavorable,
    /// Nothing was observed
    Undetermined,
}

impl MappingBehavior {
    /// Rate this mapping behavior for peer-to-peer traversal
    pub fn outlook(&self) -> TraversalOutlook {
        match self {
            Self::EndpointIndependent => TraversalOutlook::Favorable,
            Self::AddressAndPortDependent => TraversalOutlook::Unfavorable,
            Self::AddressDependent | Self::Unknown => TraversalOutlook::Caution,
        }
    }
}

impl FilteringBehavior {
    /// Rate this filtering behavior for peer-to-peer traversal
    pub fn outlook(&self) -> TraversalOutlook {
        match self {
            Self::EndpointIndependent => TraversalOutlook::Favorable,
            Self::AddressDependent | Self::AddressAndPortDependent => TraversalOutlook::Caution,
            Self::Unknown => TraversalOutlook::Undetermined,
        }
    }
}

impl NatClassification {
    /// Map a mapping behavior onto the coarse classification
    pub fn from_mapping(mapping: MappingBehavior) -> Self {
        match mapping {
            MappingBehavior::EndpointIndependent => Self::Cone,
            MappingBehavior::AddressDependent | MappingBehavior::AddressAndPortDependent => {
                Self::Symmetric
            }
            MappingBehavior::Unknown => Self::Unknown,
        }
    }

    /// One-line explanation suitable for a status screen
    pub fn description(&self) -> &'static str {
        match self {
            Self::Cone => "Same external port for all destinations, hole punching works",
            Self::Symmetric => "External port changes per destination, hole punching is difficult",
            Self::Blocked => "UDP traffic is blocked, peer-to-peer connections may not work",
            Self::Unknown => "Could not determine NAT type",
        }
    }

    /// Whether direct UDP hole punching is expected to succeed
    pub fn supports_hole_punching(&self) -> bool {
        matches!(self, Self::Cone)
    }
}

impl fmt::Display for MappingBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::EndpointIndependent => "Endpoint-Independent",
            Self::AddressDependent => "Address-Dependent",
            Self::AddressAndPortDependent => "Address and Port-Dependent",
            Self::Unknown => "Unknown",
        };
        f.write_str(text)
    }
}

impl fmt::Display for FilteringBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::EndpointIndependent => "Endpoint-Independent",
            Self::AddressDependent => "Address-Dependent",
            Self::AddressAndPortDependent => "Address and Port-Dependent",
            Self::Unknown => "Unknown",
        };
        f.write_str(text)
    }
}

impl fmt::Display for NatClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Cone => "Endpoint-Independent Mapping",
            Self::Symmetric => "Address & Port-Dependent Mapping",
            Self::Blocked => "UDP Blocked",
            Self::Unknown => "Unknown",
        };
        f.write_str(text)
    }
}

/// External `(ip, port)` pair observed by a STUN server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedEndpoint {
    /// External IP address
    pub ip: IpAddr,
    /// External port
    pub port: u16,
}

impl fmt::Display for MappedEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip {
            IpAddr::V4(ip) => write!(f, "{}:{}", ip, self.port),
            IpAddr::V6(ip) => write!(f, "[{}]:{}", ip, self.port),
        }
    }
}

/// Errors produced by a single STUN probe
#[derive(Debug, Error)]
pub enum ProbeError {
    /// No response before the read deadline
    #[error("STUN request timed out")]
    Timeout,

    /// Socket error while sending or receiving
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Server name did not resolve to an IPv4 endpoint
    #[error("Failed to resolve {0}")]
    Resolve(String),

    /// Request could not be encoded
    #[error("Encode error: {0}")]
    Encode(#[from] StunError),

    /// Response could not be decoded
    #[error("Invalid response: {0}")]
    Decode(#[from] DecodeError),

    /// Response lacked an attribute the probe needs
    #[error("Response is missing {0}")]
    MissingAttribute(&'static str),

    /// Candidate server list was unusable
    #[error("Server list error: {0}")]
    ServerList(String),

    /// HTTP failure while fetching the server list
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Reason a detection produced no usable classification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
pub enum DetectionFailure {
    /// The local UDP socket could not be created
    #[error("Failed to bind UDP socket: {0}")]
    Bind(String),

    /// The first mapping server never produced a usable answer
    #[error("No response from {server}: {reason}")]
    NoResponse {
        /// Server that was contacted
        server: String,
        /// Underlying probe error
        reason: String,
    },
}

/// Complete result of one NAT detection run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionResult {
    /// Observed mapping behavior
    pub mapping: MappingBehavior,
    /// Observed filtering behavior
    pub filtering: FilteringBehavior,
    /// Coarse classification for display
    pub classification: NatClassification,
    /// External IP reported by the first mapping server
    pub external_address: Option<IpAddr>,
    /// External port reported by the first mapping server
    pub external_port: Option<u16>,
    /// Candidate server that produced the filtering verdict
    pub filtering_server: Option<String>,
    /// Set only when no coarse classification could be produced
    pub error: Option<DetectionFailure>,
    /// Completion timestamp (Unix milliseconds)
    pub detected_at_ms: i64,
}

impl DetectionResult {
    /// Create an empty result with every behavior unknown
    pub fn new() -> Self {
        Self {
            mapping: MappingBehavior::Unknown,
            filtering: FilteringBehavior::Unknown,
            classification: NatClassification::Unknown,
            external_address: None,
            external_port: None,
            filtering_server: None,
            error: None,
            detected_at_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Result for a run that failed before any classification
    pub fn failed(classification: NatClassification, failure: DetectionFailure) -> Self {
        Self {
            classification,
            error: Some(failure),
            ..Self::new()
        }
    }

    /// Check whether a coarse classification was produced
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Get a summary string of the result (for log lines)
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("NAT: {}", self.classification)];

        if let Some(ip) = self.external_address {
            match self.external_port {
                Some(port) => parts.push(format!("external: {}", MappedEndpoint { ip, port })),
                None => parts.push(format!("external: {}", ip)),
            }
        }

        parts.push(format!("mapping: {}", self.mapping));

        match &self.filtering_server {
            Some(server) => parts.push(format!("filtering: {} (via {})", self.filtering, server)),
            None => parts.push(format!("filtering: {}", self.filtering)),
        }

        if let Some(e) = &self.error {
            parts.push(format!("error: {}", e));
        }

        parts.join(" → ")
    }
}

impl Default for DetectionResult {
    fn default() -> Self {
        Self::new()
    }
}
