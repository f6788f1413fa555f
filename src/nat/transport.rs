//! UDP transport used by the STUN probes
//!
//! Probers are generic over [`StunTransport`] so the same logic runs against
//! real sockets and against scripted responders in tests.

use super::stun::{build_binding_request, decode_response, StunAttribute, StunMessage};
use super::types::ProbeError;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

/// Receive buffer size for STUN responses
const RECV_BUFFER_SIZE: usize = 1024;

/// A bound UDP socket able to exchange datagrams with STUN servers
pub trait ProbeSocket: Send + Sync {
    /// Send one datagram to `target`
    fn send_to(
        &self,
        buf: &[u8],
        target: SocketAddr,
    ) -> impl Future<Output = Result<(), ProbeError>> + Send;

    /// Wait for the next datagram, returning its length and source
    fn recv_from(
        &self,
        buf: &mut [u8],
    ) -> impl Future<Output = Result<(usize, SocketAddr), ProbeError>> + Send;
}

/// Factory for probe sockets plus name resolution
pub trait StunTransport: Send + Sync {
    /// Socket type produced by [`StunTransport::bind`]
    type Socket: ProbeSocket;

    /// Bind a fresh ephemeral UDP/IPv4 socket
    fn bind(&self) -> impl Future<Output = Result<Self::Socket, ProbeError>> + Send;

    /// Resolve `host:port` to an IPv4 UDP endpoint
    fn resolve(&self, server: &str) -> impl Future<Output = Result<SocketAddr, ProbeError>> + Send;
}

/// Transport backed by `tokio::net::UdpSocket`
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpTransport;

impl ProbeSocket for UdpSocket {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<(), ProbeError> {
        UdpSocket::send_to(self, buf, target).await?;
        Ok(())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), ProbeError> {
        Ok(UdpSocket::recv_from(self, buf).await?)
    }
}

impl StunTransport for UdpTransport {
    type Socket = UdpSocket;

    async fn bind(&self) -> Result<UdpSocket, ProbeError> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)).await?;
        debug!("Bound probe socket on {}", socket.local_addr()?);
        Ok(socket)
    }

    async fn resolve(&self, server: &str) -> Result<SocketAddr, ProbeError> {
        let mut addrs = tokio::net::lookup_host(server)
            .await
            .map_err(|e| ProbeError::Resolve(format!("{}: {}", server, e)))?;

        addrs
            .find(SocketAddr::is_ipv4)
            .ok_or_else(|| ProbeError::Resolve(format!("{}: no IPv4 address", server)))
    }
}

/// Resolve `server`, giving up with [`ProbeError::Timeout`] at `deadline`
pub async fn resolve_before<T: StunTransport>(
    transport: &T,
    server: &str,
    deadline: Instant,
) -> Result<SocketAddr, ProbeError> {
    timeout_at(deadline, transport.resolve(server))
        .await
        .map_err(|_| {
            debug!("Resolving {} did not finish before the deadline", server);
            ProbeError::Timeout
        })?
}

/// Send a Binding Request carrying `extra` attributes to `target`
pub async fn send_binding<S: ProbeSocket>(
    socket: &S,
    target: SocketAddr,
    extra: &[StunAttribute],
) -> Result<(), ProbeError> {
    let request = build_binding_request(extra)?;

    socket.send_to(&request.bytes, target).await?;
    debug!(
        "Sent Binding Request {} to {} ({} attributes)",
        hex::encode(request.transaction_id),
        target,
        extra.len()
    );
    Ok(())
}

/// Receive one datagram before `deadline`, returning the raw bytes and source
pub async fn recv_datagram<S: ProbeSocket>(
    socket: &S,
    deadline: Instant,
) -> Result<(Vec<u8>, SocketAddr), ProbeError> {
    let mut buf = [0u8; RECV_BUFFER_SIZE];
    let (len, from) = timeout_at(deadline, socket.recv_from(&mut buf))
        .await
        .map_err(|_| ProbeError::Timeout)??;

    debug!("Received {} bytes from {}", len, from);
    Ok((buf[..len].to_vec(), from))
}

/// Full request/response exchange: send, wait until `deadline`, decode
pub async fn binding_round_trip<S: ProbeSocket>(
    socket: &S,
    target: SocketAddr,
    extra: &[StunAttribute],
    deadline: Instant,
) -> Result<(StunMessage, SocketAddr), ProbeError> {
    send_binding(socket, target, extra).await?;
    let (bytes, from) = recv_datagram(socket, deadline).await?;
    let message = decode_response(&bytes)?;
    Ok((message, from))
}
