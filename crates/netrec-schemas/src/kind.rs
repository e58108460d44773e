use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Attributes;

/// Entity kinds known to the telemetry source.
///
/// Anything else deserializes into [`EntityKind::Other`] and is keyed by
/// hostname only.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityKind {
    Interface,
    IpAddress,
    Vlan,
    BgpPeer,
    Device,
    Cable,
    Route,
    Other(String),
}

impl EntityKind {
    /// Every kind with a dedicated natural key, in canonical order.
    pub const KNOWN: [EntityKind; 7] = [
        EntityKind::Interface,
        EntityKind::IpAddress,
        EntityKind::Vlan,
        EntityKind::BgpPeer,
        EntityKind::Device,
        EntityKind::Cable,
        EntityKind::Route,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            EntityKind::Interface => "interface",
            EntityKind::IpAddress => "ipAddress",
            EntityKind::Vlan => "vlan",
            EntityKind::BgpPeer => "bgpPeer",
            EntityKind::Device => "device",
            EntityKind::Cable => "cable",
            EntityKind::Route => "route",
            EntityKind::Other(s) => s.as_str(),
        }
    }

    /// Attribute names that, after the hostname, identify one real-world
    /// entity of this kind across observations.
    pub fn key_fields(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Interface => &["ifName"],
            EntityKind::IpAddress => &["ifName", "ipAddress"],
            EntityKind::Vlan => &["vlan"],
            EntityKind::BgpPeer => &["peerAddress", "addressFamily"],
            EntityKind::Device => &[],
            EntityKind::Cable => &["ifName"],
            EntityKind::Route => &["vrf", "prefix"],
            EntityKind::Other(_) => &[],
        }
    }

    /// `true` for kinds without a dedicated key (hostname-only fallback).
    pub fn is_other(&self) -> bool {
        matches!(self, EntityKind::Other(_))
    }
}

impl From<&str> for EntityKind {
    fn from(raw: &str) -> Self {
        match raw.trim() {
            "interface" | "interfaces" => EntityKind::Interface,
            "ipAddress" | "ip_address" | "address" => EntityKind::IpAddress,
            "vlan" | "vlans" => EntityKind::Vlan,
            "bgpPeer" | "bgp_peer" | "bgp" => EntityKind::BgpPeer,
            "device" | "devices" => EntityKind::Device,
            "cable" | "cables" => EntityKind::Cable,
            "route" | "routes" => EntityKind::Route,
            other => EntityKind::Other(other.to_string()),
        }
    }
}

impl From<String> for EntityKind {
    fn from(raw: String) -> Self {
        EntityKind::from(raw.as_str())
    }
}

impl From<EntityKind> for String {
    fn from(kind: EntityKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dedup key: hostname followed by the kind's key fields, in order.
///
/// Ordering is lexicographic over the parts, which is what makes resolver
/// and comparison output stable.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NaturalKey(Vec<String>);

impl NaturalKey {
    /// Derive the key for `kind` from a hostname and an attribute map.
    ///
    /// A missing key attribute contributes an empty part rather than failing;
    /// such entities still dedup consistently among themselves.
    pub fn derive(kind: &EntityKind, hostname: &str, attrs: &Attributes) -> Self {
        let mut parts = Vec::with_capacity(1 + kind.key_fields().len());
        parts.push(hostname.to_string());
        for field in kind.key_fields() {
            parts.push(attrs.get(*field).map(key_part).unwrap_or_default());
        }
        NaturalKey(parts)
    }

    /// Key from already-derived parts, hostname first.
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        NaturalKey(parts.into_iter().map(Into::into).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    pub fn hostname(&self) -> &str {
        self.0.first().map(String::as_str).unwrap_or("")
    }

    /// Human-facing identifier, e.g. `R1.Gi0/0` or `R1.default.10.0.0.0/24`.
    /// Not unique when parts contain dots; compare keys, not identifiers.
    pub fn identifier(&self) -> String {
        self.0.join(".")
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier())
    }
}

fn key_part(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(v: Value) -> Attributes {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn interface_key_is_hostname_plus_ifname() {
        let k = NaturalKey::derive(
            &EntityKind::Interface,
            "R1",
            &attrs(json!({"ifName": "Gi0/0", "mtu": 1500})),
        );
        assert_eq!(k.parts(), &["R1".to_string(), "Gi0/0".to_string()]);
        assert_eq!(k.identifier(), "R1.Gi0/0");
    }

    #[test]
    fn route_key_uses_vrf_and_prefix() {
        let k = NaturalKey::derive(
            &EntityKind::Route,
            "R2",
            &attrs(json!({"vrf": "default", "prefix": "10.0.0.0/24", "nexthop": "10.0.0.1"})),
        );
        assert_eq!(k.identifier(), "R2.default.10.0.0.0/24");
    }

    #[test]
    fn unknown_kind_falls_back_to_hostname() {
        let kind = EntityKind::from("lldp");
        assert!(kind.is_other());
        let k = NaturalKey::derive(&kind, "R3", &attrs(json!({"ifName": "Gi0/1"})));
        assert_eq!(k.parts(), &["R3".to_string()]);
    }

    #[test]
    fn dotted_parts_share_an_identifier_but_not_a_key() {
        let a = NaturalKey::derive(&EntityKind::Interface, "R1.a", &attrs(json!({"ifName": "b"})));
        let b = NaturalKey::derive(&EntityKind::Interface, "R1", &attrs(json!({"ifName": "a.b"})));
        assert_eq!(a.identifier(), b.identifier());
        assert_ne!(a, b);
        assert_eq!(a, NaturalKey::from_parts(["R1.a", "b"]));
    }

    #[test]
    fn missing_key_attribute_is_empty_part() {
        let k = NaturalKey::derive(&EntityKind::BgpPeer, "R1", &attrs(json!({"peerAddress": "10.1.1.1"})));
        assert_eq!(k.parts().len(), 3);
        assert_eq!(k.parts()[2], "");
    }

    #[test]
    fn kind_serializes_as_camel_case_string() {
        let s = serde_json::to_string(&EntityKind::BgpPeer).unwrap();
        assert_eq!(s, "\"bgpPeer\"");
        let back: EntityKind = serde_json::from_str("\"ipAddress\"").unwrap();
        assert_eq!(back, EntityKind::IpAddress);
    }
}
