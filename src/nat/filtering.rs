//! Filtering behavior probe using CHANGE-REQUEST
//!
//! Each candidate server is first asked a plain Binding Request. Only servers
//! that advertise an alternate address (OTHER-ADDRESS) are trusted to produce a
//! verdict; the rest are disqualified and the next candidate is tried.
//!
//! A trusted server is then asked to answer from its alternate IP and port.
//! Whether that answer makes it through the NAT tells us how the NAT filters
//! inbound packets:
//!
//! | Second reply                          | Filtering            |
//! |---------------------------------------|----------------------|
//! | none before the deadline, or an error | Address-Dependent    |
//! | arrives but does not decode           | Address-Dependent    |
//! | decodes, from a different IP          | Endpoint-Independent |
//! | decodes, from the contacted IP        | Address-Dependent    |

use super::stun::{decode_response, ChangeRequest, StunAttribute};
use super::transport::{
    binding_round_trip, recv_datagram, resolve_before, send_binding, StunTransport,
};
use super::types::{FilteringBehavior, ProbeError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Read deadlines used for each candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilteringTimeouts {
    /// Deadline for the plain discovery request
    pub probe: Duration,
    /// Deadline for the CHANGE-REQUEST reply
    pub change_request: Duration,
}

impl Default for FilteringTimeouts {
    fn default() -> Self {
        Self {
            probe: Duration::from_secs(3),
            change_request: Duration::from_secs(2),
        }
    }
}

/// Result of filtering discovery
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilteringOutcome {
    /// Observed filtering behavior
    pub behavior: FilteringBehavior,
    /// Candidate that produced the verdict
    pub server: Option<String>,
}

/// Walk `candidates` in order until one yields a filtering verdict
///
/// Never fails: exhausting the list (or an empty list) yields `Unknown`.
pub async fn probe_filtering<T: StunTransport>(
    transport: &T,
    candidates: &[String],
    timeouts: FilteringTimeouts,
) -> FilteringOutcome {
    info!(
        "Probing filtering behavior ({} candidate servers)",
        candidates.len()
    );

    for server in candidates {
        match probe_candidate(transport, server, timeouts).await {
            Ok(behavior) => {
                info!("Filtering behavior via {}: {}", server, behavior);
                return FilteringOutcome {
                    behavior,
                    server: Some(server.clone()),
                };
            }
            Err(e) => {
                debug!("Candidate {} disqualified: {}", server, e);
            }
        }
    }

    warn!("No candidate server supports behavior discovery, filtering unknown");
    FilteringOutcome::default()
}

/// Run the two-request filtering test against one server
///
/// `Err` means the server is disqualified, not that the NAT filters.
pub async fn probe_candidate<T: StunTransport>(
    transport: &T,
    server: &str,
    timeouts: FilteringTimeouts,
) -> Result<FilteringBehavior, ProbeError> {
    let deadline = Instant::now() + timeouts.probe;
    let target = resolve_before(transport, server, deadline).await?;
    let socket = transport.bind().await?;

    let (message, _) = binding_round_trip(&socket, target, &[], deadline).await?;
    let other = message
        .other_address()
        .ok_or(ProbeError::MissingAttribute("OTHER-ADDRESS"))?;
    debug!("{} advertises alternate address {}", server, other);

    let change = StunAttribute::change_request(ChangeRequest::ip_and_port());
    send_binding(&socket, target, &[change]).await?;

    let deadline = Instant::now() + timeouts.change_request;
    let (bytes, from) = match recv_datagram(&socket, deadline).await {
        Ok(reply) => reply,
        Err(e) => {
            debug!("No reply to CHANGE-REQUEST from {} ({})", server, e);
            return Ok(FilteringBehavior::AddressDependent);
        }
    };

    if let Err(e) = decode_response(&bytes) {
        debug!("Undecodable CHANGE-REQUEST reply from {}: {}", from, e);
        return Ok(FilteringBehavior::AddressDependent);
    }

    if from.ip() != target.ip() {
        debug!("CHANGE-REQUEST reply arrived from {} (asked {})", from, target);
        Ok(FilteringBehavior::EndpointIndependent)
    } else {
        debug!("CHANGE-REQUEST reply came back from the contacted address {}", from);
        Ok(FilteringBehavior::AddressDependent)
    }
}
