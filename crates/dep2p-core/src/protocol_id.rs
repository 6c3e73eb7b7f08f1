//! Namespaced protocol identifiers.
//!
//! Every stream-multiplexed protocol in dep2p is identified by a slash
//! path. System protocols (dial scheduler, path-health probes, realm
//! auth, liveness) live under `/dep2p/sys/...` and are reachable before a
//! node has joined any Realm. Application protocols are additionally
//! scoped by the joined Realm's id: `/dep2p/app/<realmID>/<name>/<version>`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolIdError;
use crate::realm_id::RealmId;

/// Which of the two namespaces a [`ProtocolId`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolNamespace {
    /// `/dep2p/sys/<name>/<version>`
    System,
    /// `/dep2p/app/<realmID>/<name>/<version>`
    App,
}

/// A fully-qualified protocol identifier, e.g.
/// `/dep2p/sys/realm-auth/1.0.0` or
/// `/dep2p/app/3f1c.../chat/1.0.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtocolId(String);

const SYS_PREFIX: &str = "/dep2p/sys/";
const APP_PREFIX: &str = "/dep2p/app/";

impl ProtocolId {
    /// Construct a system protocol id: `/dep2p/sys/<name>/<version>`.
    pub fn system(name: &str, version: &str) -> Result<Self, ProtocolIdError> {
        validate_segment(name)?;
        validate_segment(version)?;
        Ok(Self(format!("{SYS_PREFIX}{name}/{version}")))
    }

    /// Construct an application protocol id, scoped to a joined Realm:
    /// `/dep2p/app/<realmID>/<name>/<version>`.
    pub fn app(realm: &RealmId, name: &str, version: &str) -> Result<Self, ProtocolIdError> {
        validate_segment(name)?;
        validate_segment(version)?;
        Ok(Self(format!("{APP_PREFIX}{realm}/{name}/{version}")))
    }

    /// Parse an already-formed protocol id string, validating the
    /// namespace prefix and rejecting anything malformed.
    pub fn parse(s: &str) -> Result<Self, ProtocolIdError> {
        if s.is_empty() {
            return Err(ProtocolIdError::Empty);
        }
        if s.chars().any(|c| c.is_whitespace()) {
            return Err(ProtocolIdError::ContainsWhitespace(s.to_string()));
        }
        if let Some(rest) = s.strip_prefix(SYS_PREFIX) {
            let parts: Vec<&str> = rest.split('/').collect();
            if parts.len() != 2 || parts.iter().any(|p| p.is_empty()) {
                return Err(ProtocolIdError::MalformedApp(s.to_string()));
            }
            return Ok(Self(s.to_string()));
        }
        if let Some(rest) = s.strip_prefix(APP_PREFIX) {
            let parts: Vec<&str> = rest.split('/').collect();
            if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
                return Err(ProtocolIdError::MalformedApp(s.to_string()));
            }
            return Ok(Self(s.to_string()));
        }
        Err(ProtocolIdError::MissingNamespace(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn namespace(&self) -> ProtocolNamespace {
        if self.0.starts_with(SYS_PREFIX) {
            ProtocolNamespace::System
        } else {
            ProtocolNamespace::App
        }
    }

    /// The Realm id embedded in an App-namespace protocol id, if any.
    pub fn realm_id(&self) -> Option<RealmId> {
        let rest = self.0.strip_prefix(APP_PREFIX)?;
        let realm_str = rest.split('/').next()?;
        RealmId::parse(realm_str).ok()
    }
}

fn validate_segment(segment: &str) -> Result<(), ProtocolIdError> {
    if segment.is_empty() {
        return Err(ProtocolIdError::Empty);
    }
    if segment.chars().any(|c| c.is_whitespace() || c == '/') {
        return Err(ProtocolIdError::ContainsWhitespace(segment.to_string()));
    }
    Ok(())
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_protocol_round_trips() {
        let id = ProtocolId::system("realm-auth", "1.0.0").unwrap();
        assert_eq!(id.as_str(), "/dep2p/sys/realm-auth/1.0.0");
        assert_eq!(id.namespace(), ProtocolNamespace::System);
        let reparsed = ProtocolId::parse(id.as_str()).unwrap();
        assert_eq!(id, reparsed);
    }

    #[test]
    fn app_protocol_embeds_realm_id() {
        let key = crate::realm_id::RealmKey::generate();
        let realm = crate::realm_id::derive_realm_id(&key);
        let id = ProtocolId::app(&realm, "chat", "1.0.0").unwrap();
        assert_eq!(id.namespace(), ProtocolNamespace::App);
        assert_eq!(id.realm_id(), Some(realm));
    }

    #[test]
    fn rejects_empty() {
        assert!(matches!(ProtocolId::parse(""), Err(ProtocolIdError::Empty)));
    }

    #[test]
    fn rejects_whitespace() {
        assert!(matches!(
            ProtocolId::system("chat room", "1.0.0"),
            Err(ProtocolIdError::ContainsWhitespace(_))
        ));
    }

    #[test]
    fn rejects_missing_namespace() {
        assert!(matches!(
            ProtocolId::parse("/foo/bar"),
            Err(ProtocolIdError::MissingNamespace(_))
        ));
    }

    #[test]
    fn rejects_malformed_app_path() {
        assert!(matches!(
            ProtocolId::parse("/dep2p/app/only-one-segment"),
            Err(ProtocolIdError::MalformedApp(_))
        ));
    }
}
