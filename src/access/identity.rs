//! # Caller Identity
//!
//! How a deployment recognizes its callers: by peer address or by a device
//! token header. Both compare by exact string equality against the allow-list.

use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Identity of the caller for one request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallerIdentity {
    /// Peer network address
    Address(String),
    /// Opaque device token
    Token(String),
}

impl CallerIdentity {
    pub fn as_str(&self) -> &str {
        match self {
            CallerIdentity::Address(s) | CallerIdentity::Token(s) => s,
        }
    }

    /// Human label used in warnings and rejection bodies.
    pub fn kind_label(&self) -> &'static str {
        match self {
            CallerIdentity::Address(_) => "IP",
            CallerIdentity::Token(_) => "device",
        }
    }
}

impl fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw, untrusted request inputs the guard inspects.
#[derive(Debug, Clone, Default)]
pub struct RequestCredentials {
    /// `X-Api-Key` header
    pub api_key: Option<String>,
    /// `X-Device-ID` header
    pub device_id: Option<String>,
    /// Peer socket address
    pub peer: Option<IpAddr>,
}

impl RequestCredentials {
    /// Best available description of who sent the request, for logs.
    pub fn peer_label(&self) -> String {
        self.peer
            .map(|ip| ip.to_canonical().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Deployment-selected identity source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IdentityMode {
    #[default]
    Address,
    Token,
}

/// Extracts the caller identity from a request.
pub trait IdentityStrategy: Send + Sync + fmt::Debug {
    /// `None` when the request carries no usable identity.
    fn identify(&self, credentials: &RequestCredentials) -> Option<CallerIdentity>;

    fn mode(&self) -> IdentityMode;

    /// Caller description used when the secret check fails.
    fn describe(&self, credentials: &RequestCredentials) -> String {
        self.identify(credentials)
            .map(|id| id.to_string())
            .unwrap_or_else(|| credentials.peer_label())
    }
}

/// Identity is the peer IP address.
#[derive(Debug, Default)]
pub struct AddressIdentity;

impl IdentityStrategy for AddressIdentity {
    fn identify(&self, credentials: &RequestCredentials) -> Option<CallerIdentity> {
        // IPv4 callers on a dual-stack listener arrive as ::ffff:a.b.c.d
        credentials
            .peer
            .map(|ip| CallerIdentity::Address(ip.to_canonical().to_string()))
    }

    fn mode(&self) -> IdentityMode {
        IdentityMode::Address
    }
}

/// Identity is the `X-Device-ID` header.
#[derive(Debug, Default)]
pub struct TokenIdentity;

impl IdentityStrategy for TokenIdentity {
    fn identify(&self, credentials: &RequestCredentials) -> Option<CallerIdentity> {
        credentials
            .device_id
            .as_deref()
            .filter(|token| !token.is_empty())
            .map(|token| CallerIdentity::Token(token.to_string()))
    }

    fn mode(&self) -> IdentityMode {
        IdentityMode::Token
    }
}

/// Strategy for a configured mode.
pub fn strategy_for(mode: IdentityMode) -> Box<dyn IdentityStrategy> {
    match mode {
        IdentityMode::Address => Box::new(AddressIdentity),
        IdentityMode::Token => Box::new(TokenIdentity),
    }
}

/// Fixed set of recognized identities, read-only after startup.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    entries: HashSet<String>,
}

impl AllowList {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, identity: &CallerIdentity) -> bool {
        self.entries.contains(identity.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(device: Option<&str>, peer: Option<&str>) -> RequestCredentials {
        RequestCredentials {
            api_key: None,
            device_id: device.map(String::from),
            peer: peer.map(|p| p.parse().unwrap()),
        }
    }

    #[test]
    fn test_address_identity_uses_peer() {
        let id = AddressIdentity.identify(&creds(Some("tablet"), Some("192.168.0.22")));
        assert_eq!(id, Some(CallerIdentity::Address("192.168.0.22".into())));
    }

    #[test]
    fn test_address_identity_unmaps_ipv4_in_ipv6() {
        let id = AddressIdentity.identify(&creds(None, Some("::ffff:127.0.0.1")));
        assert_eq!(id, Some(CallerIdentity::Address("127.0.0.1".into())));
    }

    #[test]
    fn test_token_identity_requires_header() {
        assert_eq!(TokenIdentity.identify(&creds(None, Some("127.0.0.1"))), None);
        assert_eq!(TokenIdentity.identify(&creds(Some(""), Some("127.0.0.1"))), None);
        assert_eq!(
            TokenIdentity.identify(&creds(Some("phone-1"), None)),
            Some(CallerIdentity::Token("phone-1".into()))
        );
    }

    #[test]
    fn test_describe_falls_back_to_peer() {
        assert_eq!(TokenIdentity.describe(&creds(None, Some("10.1.1.1"))), "10.1.1.1");
        assert_eq!(TokenIdentity.describe(&creds(None, None)), "unknown");
    }

    #[test]
    fn test_allow_list_exact_match() {
        let list = AllowList::new(["127.0.0.1", "phone-1"]);
        assert!(list.contains(&CallerIdentity::Address("127.0.0.1".into())));
        assert!(list.contains(&CallerIdentity::Token("phone-1".into())));
        assert!(!list.contains(&CallerIdentity::Token("Phone-1".into())));
        assert!(!list.contains(&CallerIdentity::Address("127.0.0.10".into())));
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(CallerIdentity::Address("10.0.0.1".into()).kind_label(), "IP");
        assert_eq!(CallerIdentity::Token("phone-1".into()).kind_label(), "device");
    }

    #[test]
    fn test_identity_mode_serde() {
        let mode: IdentityMode = serde_json::from_str("\"token\"").unwrap();
        assert_eq!(mode, IdentityMode::Token);
        assert_eq!(strategy_for(mode).mode(), IdentityMode::Token);
    }
}
