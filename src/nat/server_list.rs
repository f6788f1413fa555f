//! Candidate server list for filtering discovery
//!
//! The list of servers supporting OTHER-ADDRESS/CHANGE-REQUEST is maintained
//! remotely and fetched fresh on every detection. Entries are untrusted and
//! are validated before use.

use super::types::ProbeError;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Versioned list of public STUN servers that pass behavior-discovery checks
pub const DEFAULT_SERVER_LIST_URL: &str =
    "https://raw.githubusercontent.com/pradt2/always-online-stun/master/valid_nat_testing_hosts.txt";

/// Source of candidate `host:port` entries
pub trait ServerListSource: Send + Sync {
    /// Fetch the ordered candidate list
    fn fetch(&self) -> impl Future<Output = Result<Vec<String>, ProbeError>> + Send;
}

/// Server list fetched over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpServerList {
    url: String,
    timeout: Duration,
}

impl HttpServerList {
    /// Create a fetcher for `url` with a request timeout
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }
}

impl ServerListSource for HttpServerList {
    async fn fetch(&self) -> Result<Vec<String>, ProbeError> {
        info!("Fetching candidate STUN servers from {}", self.url);

        let client = reqwest::Client::builder().timeout(self.timeout).build()?;

        let response = client.get(&self.url).send().await?.error_for_status()?;
        let text = response.text().await?;

        let servers = parse_server_list(&text)?;
        info!("Fetched {} candidate servers", servers.len());
        Ok(servers)
    }
}

/// Fixed server list, e.g. from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticServerList {
    servers: Vec<String>,
}

impl StaticServerList {
    /// Wrap a fixed list of `host:port` entries
    pub fn new(servers: Vec<String>) -> Self {
        Self { servers }
    }
}

impl ServerListSource for StaticServerList {
    async fn fetch(&self) -> Result<Vec<String>, ProbeError> {
        let text = self.servers.join("\n");
        parse_server_list(&text)
    }
}

/// Parse a newline-delimited `host:port` list
///
/// Blank lines and `#` comments are skipped, malformed entries are dropped.
/// An empty result is an error.
pub fn parse_server_list(text: &str) -> Result<Vec<String>, ProbeError> {
    let mut servers = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if is_valid_endpoint(line) {
            servers.push(line.to_string());
        } else {
            debug!("Skipping malformed server entry: {}", line);
        }
    }

    if servers.is_empty() {
        warn!("Server list contained no usable entries");
        return Err(ProbeError::ServerList("no usable servers found".to_string()));
    }

    Ok(servers)
}

/// Check that an entry looks like `host:port` with a non-zero numeric port
pub fn is_valid_endpoint(entry: &str) -> bool {
    let Some((host, port)) = entry.rsplit_once(':') else {
        return false;
    };

    if host.is_empty() || host.chars().any(char::is_whitespace) {
        return false;
    }

    matches!(port.parse::<u16>(), Ok(p) if p != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let text = "# RFC 5780 capable hosts\n\nstun.example.org:3478\n  \n# trailing\nstun2.example.org:19302\n";
        let servers = parse_server_list(text).unwrap();
        assert_eq!(servers, vec!["stun.example.org:3478", "stun2.example.org:19302"]);
    }

    #[test]
    fn test_parse_trims_whitespace_and_crlf() {
        let servers = parse_server_list("  stun.example.org:3478 \r\n").unwrap();
        assert_eq!(servers, vec!["stun.example.org:3478"]);
    }

    #[test]
    fn test_parse_drops_malformed_entries() {
        let text = "no-port\nhost:notaport\nhost:0\n:3478\nhost:70000\nbad host:3478\n192.0.2.1:3478\n";
        let servers = parse_server_list(text).unwrap();
        assert_eq!(servers, vec!["192.0.2.1:3478"]);
    }

    #[test]
    fn test_parse_preserves_order() {
        let servers = parse_server_list("c.example:1\na.example:2\nb.example:3").unwrap();
        assert_eq!(servers, vec!["c.example:1", "a.example:2", "b.example:3"]);
    }

    #[test]
    fn test_empty_list_is_error() {
        assert!(matches!(parse_server_list(""), Err(ProbeError::ServerList(_))));
        assert!(matches!(
            parse_server_list("# only comments\n\n"),
            Err(ProbeError::ServerList(_))
        ));
    }

    #[test]
    fn test_is_valid_endpoint() {
        assert!(is_valid_endpoint("stun.example.org:3478"));
        assert!(is_valid_endpoint("[2001:db8::1]:3478"));
        assert!(!is_valid_endpoint("stun.example.org"));
        assert!(!is_valid_endpoint("stun.example.org:"));
    }

    #[tokio::test]
    async fn test_static_server_list() {
        let source = StaticServerList::new(vec!["a.example:3478".into(), "bogus".into()]);
        assert_eq!(source.fetch().await.unwrap(), vec!["a.example:3478"]);

        let empty = StaticServerList::default();
        assert!(empty.fetch().await.is_err());
    }
}
