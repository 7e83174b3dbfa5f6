use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Stable identifier of one egress endpoint. Unique and immutable for the
/// process lifetime; selection tie-breaks rely on its ordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(String);

impl EndpointId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EndpointId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Pool class of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    Datacenter,
    Residential,
    Mobile,
    /// Static ISP endpoints.
    Static,
}

impl EndpointKind {
    /// Default per-request cost in USD for the pool class.
    pub fn default_cost(self) -> f64 {
        match self {
            EndpointKind::Residential => 0.001,
            EndpointKind::Datacenter => 0.0001,
            EndpointKind::Mobile => 0.01,
            EndpointKind::Static => 0.0005,
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointKind::Datacenter => write!(f, "datacenter"),
            EndpointKind::Residential => write!(f, "residential"),
            EndpointKind::Mobile => write!(f, "mobile"),
            EndpointKind::Static => write!(f, "static"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyCredentials {
    pub username: String,
    pub password: String,
}

/// One egress endpoint as loaded from inventory. Immutable after pool load;
/// replaced only by an explicit reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub id: EndpointId,
    /// `host:port` of the egress proxy.
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<ProxyCredentials>,
    pub kind: EndpointKind,
    /// ISO country code, when known.
    #[serde(default)]
    pub geo: Option<String>,
    pub cost_per_request: f64,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl Endpoint {
    pub fn new<I: Into<EndpointId>, A: Into<String>>(id: I, address: A, kind: EndpointKind) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            credentials: None,
            kind,
            geo: None,
            cost_per_request: kind.default_cost(),
            tags: BTreeSet::new(),
        }
    }

    pub fn with_geo<S: Into<String>>(mut self, geo: S) -> Self {
        self.geo = Some(geo.into());
        self
    }

    pub fn with_credentials<S: Into<String>>(mut self, username: S, password: S) -> Self {
        self.credentials = Some(ProxyCredentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost_per_request = cost;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// True when every required tag is carried by this endpoint.
    pub fn satisfies_tags(&self, required: &BTreeSet<String>) -> bool {
        required.is_subset(&self.tags)
    }

    /// True when the endpoint's geography matches the requested one.
    /// No request geography means any endpoint matches.
    pub fn matches_geo(&self, requested: Option<&str>) -> bool {
        match requested {
            None => true,
            Some(geo) => self
                .geo
                .as_deref()
                .map(|g| g.eq_ignore_ascii_case(geo))
                .unwrap_or(false),
        }
    }
}

impl From<EndpointId> for String {
    fn from(id: EndpointId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cost_follows_kind() {
        let ep = Endpoint::new("mob-1", "198.51.100.7:8080", EndpointKind::Mobile);
        assert!((ep.cost_per_request - 0.01).abs() < f64::EPSILON);
        let ep = Endpoint::new("dc-1", "198.51.100.8:8080", EndpointKind::Datacenter);
        assert!((ep.cost_per_request - 0.0001).abs() < f64::EPSILON);
    }

    #[test]
    fn tag_matching_requires_superset() {
        let ep = Endpoint::new("res-1", "198.51.100.9:8080", EndpointKind::Residential)
            .with_tags(["sticky", "ipv4"]);
        let mut required = BTreeSet::new();
        required.insert("sticky".to_string());
        assert!(ep.satisfies_tags(&required));
        required.insert("ipv6".to_string());
        assert!(!ep.satisfies_tags(&required));
    }

    #[test]
    fn geo_matching_is_case_insensitive_and_open_by_default() {
        let ep = Endpoint::new("res-2", "198.51.100.10:8080", EndpointKind::Residential)
            .with_geo("US");
        assert!(ep.matches_geo(None));
        assert!(ep.matches_geo(Some("us")));
        assert!(!ep.matches_geo(Some("DE")));

        let bare = Endpoint::new("dc-2", "198.51.100.11:8080", EndpointKind::Datacenter);
        assert!(bare.matches_geo(None));
        assert!(!bare.matches_geo(Some("US")));
    }

    #[test]
    fn endpoint_id_orders_lexicographically() {
        let a = EndpointId::new("dc-1");
        let b = EndpointId::new("dc-2");
        assert!(a < b);
        assert_eq!(a.as_str(), "dc-1");
    }
}
