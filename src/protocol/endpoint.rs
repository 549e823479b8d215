//! Worker endpoint addresses
//!
//! An endpoint has the form `nsw://<host>:<port>/<worker-id>`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;

/// URI scheme of worker endpoints
pub const SCHEME: &str = "nsw";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    host: String,
    port: u16,
    worker_id: String,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, worker_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            worker_id: worker_id.into(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// `host:port` suitable for `TcpStream::connect`
    pub fn socket_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Whether a line of text looks like an endpoint
    pub fn is_endpoint_line(line: &str) -> bool {
        line.trim().starts_with(&format!("{}://", SCHEME))
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let url = Url::parse(s).map_err(|e| Error::invalid_endpoint(s, e.to_string()))?;

        if url.scheme() != SCHEME {
            return Err(Error::invalid_endpoint(
                s,
                format!("expected scheme '{}', got '{}'", SCHEME, url.scheme()),
            ));
        }

        let host = url
            .host_str()
            .ok_or_else(|| Error::invalid_endpoint(s, "missing host"))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = url
            .port()
            .ok_or_else(|| Error::invalid_endpoint(s, "missing port"))?;
        let worker_id = url.path().trim_matches('/').to_string();
        if worker_id.is_empty() || worker_id.contains('/') {
            return Err(Error::invalid_endpoint(s, "expected a single worker id path segment"));
        }

        Ok(Self {
            host,
            port,
            worker_id,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", SCHEME, self.socket_addr(), self.worker_id)
    }
}

impl TryFrom<String> for Endpoint {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let ep: Endpoint = "nsw://127.0.0.1:7400/w-abc".parse().unwrap();
        assert_eq!(ep.host(), "127.0.0.1");
        assert_eq!(ep.port(), 7400);
        assert_eq!(ep.worker_id(), "w-abc");
        assert_eq!(ep.to_string(), "nsw://127.0.0.1:7400/w-abc");
        assert_eq!(ep.socket_addr(), "127.0.0.1:7400");
    }

    #[test]
    fn test_hostname_and_ipv6() {
        let ep: Endpoint = "nsw://node-3.local:9000/w1".parse().unwrap();
        assert_eq!(ep.host(), "node-3.local");

        let v6: Endpoint = "nsw://[::1]:9000/w1".parse().unwrap();
        assert_eq!(v6.host(), "::1");
        assert_eq!(v6.socket_addr(), "[::1]:9000");
        assert_eq!(v6.to_string(), "nsw://[::1]:9000/w1");
    }

    #[test]
    fn test_rejects_malformed() {
        assert!("http://127.0.0.1:80/w".parse::<Endpoint>().is_err());
        assert!("nsw://127.0.0.1/w".parse::<Endpoint>().is_err());
        assert!("nsw://127.0.0.1:80/".parse::<Endpoint>().is_err());
        assert!("not a uri".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_endpoint_lines() {
        assert!(Endpoint::is_endpoint_line("  nsw://h:1/w"));
        assert!(!Endpoint::is_endpoint_line("# comment"));
        assert!(!Endpoint::is_endpoint_line(""));
    }

    #[test]
    fn test_serde_as_string() {
        let ep = Endpoint::new("10.0.0.2", 81, "w9");
        let json = serde_json::to_string(&ep).unwrap();
        assert_eq!(json, "\"nsw://10.0.0.2:81/w9\"");
        let back: Endpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ep);
    }
}
