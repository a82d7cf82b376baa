// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Host input validation.
//!
//! Users advertise their server through a raw string like `100.64.0.7`,
//! `my-pc:9000`, or `server.tailnet.ts.net`. Before such a string is allowed
//! anywhere near a URL, environment file, or compose manifest it must be
//! classified as a __host specification__: either a strict IPv4 dotted-quad,
//! or an RFC 1123 hostname, with an optional port.
//!
//! # Grammar
//!
//! The raw input is split on its _last_ colon. Whatever sits to the right of
//! that colon must be a decimal port in `1..=65535`, otherwise the entire
//! input is rejected. The left side is checked against the IPv4 grammar
//! first, and only when that fails against the hostname grammar:
//!
//! - Hostnames are at most 253 characters long, not counting one optional
//!   trailing dot.
//! - Each dot separated label is 1 to 63 ASCII alphanumerics or hyphens, and
//!   never starts or ends with a hyphen.
//!
//! Validation is pure. Empty input is always rejected, substituting a
//! fallback like `localhost` is up to the caller.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
    sync::LazyLock,
};

/// Port used when raw input does not carry one.
pub const DEFAULT_PORT: u16 = 8080;

const MAX_HOSTNAME_LEN: usize = 253;

static IPV4: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^((25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)$",
    )
    .unwrap()
});

static LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$").unwrap());

/// Grammar that a validated host matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostKind {
    /// Dotted-quad IPv4 address.
    Ipv4,

    /// RFC 1123 hostname.
    Hostname,
}

/// Validated host and port pair.
///
/// Only constructed through [`HostSpec::parse`], so holding one means the
/// host is safe to embed into URLs and configuration files. Serializes as a
/// `host:port` string, and deserialization validates like [`FromStr`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HostSpec {
    host: String,
    port: u16,
    kind: HostKind,
}

impl HostSpec {
    /// Validate raw user input into a host specification.
    ///
    /// Uses `default_port` when the input carries no `:port` suffix.
    ///
    /// # Errors
    ///
    /// - Return [`HostError::Empty`] if `raw` is empty.
    /// - Return [`HostError::InvalidPort`] if the port suffix is not a number
    ///   in `1..=65535`.
    /// - Return [`HostError::InvalidHost`] if the host matches neither the
    ///   IPv4 nor hostname grammar.
    pub fn parse(raw: &str, default_port: u16) -> Result<Self> {
        if raw.is_empty() {
            return Err(HostError::Empty);
        }

        let (host, port) = match raw.rsplit_once(':') {
            Some((host, port)) => (host, parse_port(port)?),
            None => (raw, default_port),
        };

        if IPV4.is_match(host) {
            return Ok(Self {
                host: host.to_owned(),
                port,
                kind: HostKind::Ipv4,
            });
        }

        let name = host.strip_suffix('.').unwrap_or(host);
        if is_hostname(name) {
            return Ok(Self {
                host: name.to_owned(),
                port,
                kind: HostKind::Hostname,
            });
        }

        Err(HostError::InvalidHost(host.to_owned()))
    }

    /// Host specification pointing at the local machine.
    pub fn localhost(port: u16) -> Self {
        Self {
            host: "localhost".into(),
            port,
            kind: HostKind::Hostname,
        }
    }

    pub fn host(&self) -> &str {
        self.host.as_str()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn kind(&self) -> HostKind {
        self.kind
    }

    /// Externally visible URL of the server, e.g., `http://localhost:8080`.
    pub fn url(&self) -> String {
        format!("http://{self}")
    }
}

impl Display for HostSpec {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}:{}", self.host, self.port)
    }
}

impl FromStr for HostSpec {
    type Err = HostError;

    fn from_str(raw: &str) -> Result<Self> {
        Self::parse(raw, DEFAULT_PORT)
    }
}

impl TryFrom<String> for HostSpec {
    type Error = HostError;

    fn try_from(raw: String) -> Result<Self> {
        raw.parse()
    }
}

impl From<HostSpec> for String {
    fn from(spec: HostSpec) -> Self {
        spec.to_string()
    }
}

fn parse_port(raw: &str) -> Result<u16> {
    if raw.is_empty() || !raw.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(HostError::InvalidPort(raw.to_owned()));
    }

    raw.parse::<u16>()
        .ok()
        .filter(|port| *port != 0)
        .ok_or_else(|| HostError::InvalidPort(raw.to_owned()))
}

fn is_hostname(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_HOSTNAME_LEN
        && name.split('.').all(|label| LABEL.is_match(label))
}

/// Host validation error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// Nothing was given to validate.
    #[error("host input is empty")]
    Empty,

    /// Port suffix is not a number in the valid port range.
    #[error("invalid port {0:?}, expected a number between 1 and 65535")]
    InvalidPort(String),

    /// Host is neither an IPv4 address nor a valid hostname.
    #[error("invalid host {0:?}, expected an IPv4 address or hostname")]
    InvalidHost(String),
}

/// Friendly result alias :3
type Result<T, E = HostError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    #[test_case("192.168.1.10", "192.168.1.10", 8080; "plain address")]
    #[test_case("100.64.0.7:9000", "100.64.0.7", 9000; "address with port")]
    #[test_case("0.0.0.0", "0.0.0.0", 8080; "all zeroes")]
    #[test_case("255.255.255.255:1", "255.255.255.255", 1; "broadcast lowest port")]
    #[test]
    fn parse_ipv4(raw: &str, host: &str, port: u16) {
        let spec = HostSpec::parse(raw, DEFAULT_PORT).unwrap();
        assert_eq!(spec.host(), host);
        assert_eq!(spec.port(), port);
        assert_eq!(spec.kind(), HostKind::Ipv4);
    }

    #[test_case("my-host.example.com", "my-host.example.com", 8080; "dashed fqdn")]
    #[test_case("localhost", "localhost", 8080; "single label")]
    #[test_case("server.tailnet.ts.net:443", "server.tailnet.ts.net", 443; "with port")]
    #[test_case("example.com.", "example.com", 8080; "trailing dot")]
    #[test_case("a1", "a1", 8080; "short label")]
    #[test]
    fn parse_hostname(raw: &str, host: &str, port: u16) {
        let spec = HostSpec::parse(raw, DEFAULT_PORT).unwrap();
        assert_eq!(spec.host(), host);
        assert_eq!(spec.port(), port);
        assert_eq!(spec.kind(), HostKind::Hostname);
    }

    #[test_case("256.1.1.1"; "octet too large")]
    #[test_case("1.2.3.999"; "last octet too large")]
    #[test_case("1.2.3"; "three octets")]
    #[test_case("10.0.0.a"; "non numeric octet")]
    #[test]
    fn non_ipv4_falls_through_to_hostname(raw: &str) {
        let spec = HostSpec::parse(raw, DEFAULT_PORT).unwrap();
        assert_eq!(spec.kind(), HostKind::Hostname);
    }

    #[test_case("host:99999"; "port out of range")]
    #[test_case("host:0"; "port zero")]
    #[test_case("host:"; "empty port")]
    #[test_case("host:80a"; "non digit port")]
    #[test_case("host:+80"; "signed port")]
    #[test_case("10.0.0.1:123456789012345678901"; "port overflow")]
    #[test_case("http://example.com"; "scheme")]
    #[test]
    fn reject_bad_port(raw: &str) {
        assert!(matches!(
            HostSpec::parse(raw, DEFAULT_PORT),
            Err(HostError::InvalidPort(_))
        ));
    }

    #[test_case("-leading.example.com"; "leading hyphen")]
    #[test_case("trailing-.example.com"; "trailing hyphen")]
    #[test_case("double..dot"; "empty label")]
    #[test_case("under_score"; "underscore")]
    #[test_case("space host"; "whitespace")]
    #[test_case(":8080"; "missing host")]
    #[test_case("."; "lone dot")]
    #[test]
    fn reject_bad_host(raw: &str) {
        assert!(matches!(
            HostSpec::parse(raw, DEFAULT_PORT),
            Err(HostError::InvalidHost(_))
        ));
    }

    #[test]
    fn reject_empty_input() {
        assert_eq!(HostSpec::parse("", DEFAULT_PORT), Err(HostError::Empty));
    }

    #[test]
    fn label_length_limits() {
        let longest = "a".repeat(63);
        assert!(HostSpec::parse(&longest, DEFAULT_PORT).is_ok());

        let too_long = "a".repeat(64);
        assert!(HostSpec::parse(&too_long, DEFAULT_PORT).is_err());
    }

    #[test]
    fn hostname_length_limits() {
        // 4 labels of 63 plus 3 dots is 255 characters.
        let label = "a".repeat(63);
        let too_long = [label.as_str(); 4].join(".");
        assert!(HostSpec::parse(&too_long, DEFAULT_PORT).is_err());

        let fits = format!("{}.{}.{}.{}", label, label, label, "a".repeat(61));
        assert_eq!(fits.len(), 253);
        assert!(HostSpec::parse(&fits, DEFAULT_PORT).is_ok());
        assert!(HostSpec::parse(&format!("{fits}."), DEFAULT_PORT).is_ok());
    }

    #[test]
    fn split_on_last_colon() {
        assert!(matches!(
            HostSpec::parse("a:b:80", DEFAULT_PORT),
            Err(HostError::InvalidHost(host)) if host == "a:b"
        ));
    }

    #[test]
    fn default_port_is_respected() {
        let spec = HostSpec::parse("example.com", 3000).unwrap();
        assert_eq!(spec.to_string(), "example.com:3000");
        assert_eq!(spec.url(), "http://example.com:3000");
    }

    #[test]
    fn from_str_uses_default_port() {
        let spec: HostSpec = "my-host.example.com".parse().unwrap();
        assert_eq!(spec, HostSpec::parse("my-host.example.com:8080", 1).unwrap());
    }

    #[test]
    fn serde_uses_host_port_string() -> anyhow::Result<()> {
        let spec = HostSpec::parse("100.64.0.7:9000", DEFAULT_PORT)?;
        assert_eq!(serde_yaml::to_string(&spec)?, "100.64.0.7:9000\n");

        let result: HostSpec = serde_yaml::from_str("my-host.example.com")?;
        assert_eq!(result, HostSpec::parse("my-host.example.com:8080", 1)?);

        assert!(serde_yaml::from_str::<HostSpec>("bad_host!").is_err());
        Ok(())
    }
}
