//! Detection orchestrator - runs the mapping probe, then filtering discovery

use super::filtering::{probe_filtering, FilteringOutcome, FilteringTimeouts};
use super::mapping::probe_mapping;
use super::server_list::{HttpServerList, ServerListSource, StaticServerList};
use super::transport::{StunTransport, UdpTransport};
use super::types::{DetectionFailure, DetectionResult, NatClassification};
use crate::config::DetectorConfig;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, warn};

/// Detect NAT behavior with the default configuration
///
/// # Example
///
/// ```no_run
/// use natprobe::nat::detect_nat;
///
/// # async fn example() {
/// let result = detect_nat().await;
/// println!("{} ({})", result.classification, result.classification.description());
/// if let Some(ip) = result.external_address {
///     println!("External IP: {}", ip);
/// }
/// # }
/// ```
pub async fn detect_nat() -> DetectionResult {
    detect_nat_with_config(&DetectorConfig::default()).await
}

/// Detect NAT behavior over real UDP sockets using `config`
///
/// Candidates for filtering discovery come from `config.filtering_servers`
/// when set, otherwise from the remote list at `config.server_list_url`.
pub async fn detect_nat_with_config(config: &DetectorConfig) -> DetectionResult {
    if config.filtering_servers.is_empty() {
        let servers = HttpServerList::new(&config.server_list_url, config.server_list_timeout());
        detect_nat_with(&UdpTransport, &servers, config).await
    } else {
        let servers = StaticServerList::new(config.filtering_servers.clone());
        detect_nat_with(&UdpTransport, &servers, config).await
    }
}

/// Detect NAT behavior over an arbitrary transport and server list source
///
/// 1. Bind one UDP socket and probe mapping behavior against both servers.
/// 2. If the first server never answered, stop with `Blocked`.
/// 3. Fetch filtering candidates and probe filtering behavior.
///
/// The whole run is bounded by `config.overall_timeout_ms`. Mapping queries are
/// clamped to that deadline, so running out of time there still yields
/// `Blocked` or `Cone`. Running out of time during filtering keeps the mapping
/// result and leaves filtering `Unknown`.
pub async fn detect_nat_with<T, L>(transport: &T, server_list: &L, config: &DetectorConfig) -> DetectionResult
where
    T: StunTransport,
    L: ServerListSource,
{
    info!(
        "Starting NAT detection (mapping via {} and {})",
        config.primary_server, config.secondary_server
    );
    let deadline = Instant::now() + config.overall_timeout();

    let socket = match transport.bind().await {
        Ok(socket) => socket,
        Err(e) => {
            error!("Failed to bind UDP socket: {}", e);
            return DetectionResult::failed(
                NatClassification::Unknown,
                DetectionFailure::Bind(e.to_string()),
            );
        }
    };

    let mapping = probe_mapping(
        transport,
        &socket,
        &config.primary_server,
        &config.secondary_server,
        config.mapping_timeout(),
        deadline,
    )
    .await;
    drop(socket);

    let observation = match mapping {
        Ok(observation) => observation,
        Err(e) => {
            warn!("UDP appears blocked, {} did not answer: {}", config.primary_server, e);
            return DetectionResult::failed(
                NatClassification::Blocked,
                DetectionFailure::NoResponse {
                    server: config.primary_server.clone(),
                    reason: e.to_string(),
                },
            );
        }
    };

    let mut result = DetectionResult::new();
    result.mapping = observation.behavior;
    result.classification = observation.classification;
    result.external_address = Some(observation.primary.ip);
    result.external_port = Some(observation.primary.port);

    match timeout_at(
        deadline,
        discover_filtering(transport, server_list, config.filtering_timeouts()),
    )
    .await
    {
        Ok(outcome) => {
            result.filtering = outcome.behavior;
            result.filtering_server = outcome.server;
        }
        Err(_) => {
            warn!("Detection deadline passed during filtering discovery, filtering unknown");
        }
    }

    result.detected_at_ms = chrono::Utc::now().timestamp_millis();
    info!("NAT detection complete: {}", result.summary());
    result
}

async fn discover_filtering<T, L>(
    transport: &T,
    server_list: &L,
    timeouts: FilteringTimeouts,
) -> FilteringOutcome
where
    T: StunTransport,
    L: ServerListSource,
{
    let candidates = match server_list.fetch().await {
        Ok(candidates) => candidates,
        Err(e) => {
            warn!("Could not obtain filtering candidates: {}", e);
            return FilteringOutcome::default();
        }
    };

    probe_filtering(transport, &candidates, timeouts).await
}
