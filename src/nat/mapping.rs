//! Mapping behavior probe
//!
//! Sends plain Binding Requests from one local socket to two different STUN
//! servers and compares the external ports they observe. The socket must be
//! shared by both queries: the test asks whether a single local endpoint maps
//! differently depending on the destination.

use super::transport::{binding_round_trip, resolve_before, StunTransport};
use super::types::{MappedEndpoint, MappingBehavior, NatClassification, ProbeError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of a successful mapping probe
#[derive(Debug, Clone, PartialEq)]
pub struct MappingObservation {
    /// Endpoint observed by the first server
    pub primary: MappedEndpoint,
    /// Endpoint observed by the second server, if it answered
    pub secondary: Option<MappedEndpoint>,
    /// Derived mapping behavior
    pub behavior: MappingBehavior,
    /// Derived coarse classification
    pub classification: NatClassification,
}

/// Classify mapping behavior from the two observations
///
/// A missing second observation is not enough evidence to prove a symmetric
/// mapping, so the endpoint-independent classification is assumed.
pub fn classify_mapping(
    primary: MappedEndpoint,
    secondary: Option<MappedEndpoint>,
) -> (MappingBehavior, NatClassification) {
    let behavior = match secondary {
        Some(second) if second.port != primary.port => MappingBehavior::AddressAndPortDependent,
        _ => MappingBehavior::EndpointIndependent,
    };
    (behavior, NatClassification::from_mapping(behavior))
}

/// Probe mapping behavior against `server_a` then `server_b` on `socket`
///
/// Each query, name resolution included, gets `timeout` but never runs past
/// `overall`. Returns `Err` only when `server_a` cannot be used; in that case
/// `server_b` is never contacted.
pub async fn probe_mapping<T: StunTransport>(
    transport: &T,
    socket: &T::Socket,
    server_a: &str,
    server_b: &str,
    timeout: Duration,
    overall: Instant,
) -> Result<MappingObservation, ProbeError> {
    info!("Probing mapping behavior via {} and {}", server_a, server_b);

    let primary = query_mapped_endpoint(transport, socket, server_a, timeout, overall).await?;
    info!("{} reports external endpoint {}", server_a, primary);

    let secondary = match query_mapped_endpoint(transport, socket, server_b, timeout, overall).await
    {
        Ok(endpoint) => {
            info!("{} reports external endpoint {}", server_b, endpoint);
            Some(endpoint)
        }
        Err(e) => {
            warn!(
                "Second mapping server {} failed ({}), assuming endpoint-independent mapping",
                server_b, e
            );
            None
        }
    };

    let (behavior, classification) = classify_mapping(primary, secondary);
    debug!("Mapping behavior: {} ({})", behavior, classification);

    Ok(MappingObservation {
        primary,
        secondary,
        behavior,
        classification,
    })
}

async fn query_mapped_endpoint<T: StunTransport>(
    transport: &T,
    socket: &T::Socket,
    server: &str,
    timeout: Duration,
    overall: Instant,
) -> Result<MappedEndpoint, ProbeError> {
    let deadline = (Instant::now() + timeout).min(overall);
    let target = resolve_before(transport, server, deadline).await?;

    let (message, _) = binding_round_trip(socket, target, &[], deadline).await?;
    message
        .mapped_address()
        .ok_or(ProbeError::MissingAttribute("XOR-MAPPED-ADDRESS"))
}
