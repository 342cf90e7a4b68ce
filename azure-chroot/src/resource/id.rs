//! Azure resource identifiers.
//!
//! A resource id has the shape
//! `/subscriptions/{sub}/resourceGroups/{rg}/providers/{namespace}/{type}/{name}[/{type}/{name}...]`.
//! The fixed keywords are matched case-insensitively, the way ARM accepts them.

use azure_chroot_shared::ChrootError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceIdError {
    #[error("resource id is empty")]
    Empty,

    #[error("resource id '{0}' must start with '/'")]
    NotAbsolute(String),

    #[error("resource id '{id}' is missing the '{segment}' segment")]
    MissingSegment { id: String, segment: &'static str },

    #[error("resource id '{0}' contains an empty segment")]
    EmptySegment(String),

    #[error("resource id '{0}' does not end in a type/name pair")]
    UnpairedSegment(String),
}

impl From<ResourceIdError> for ChrootError {
    fn from(err: ResourceIdError) -> Self {
        ChrootError::Config(err.to_string())
    }
}

/// Parsed, immutable Azure resource identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId {
    subscription: String,
    resource_group: String,
    provider: String,
    /// (type, name) pairs, outermost first. Never empty.
    segments: Vec<(String, String)>,
}

impl ResourceId {
    /// Id of a top-level resource. Nested resources are built with [`ResourceId::child`].
    pub fn new(
        subscription: impl Into<String>,
        resource_group: impl Into<String>,
        provider: impl Into<String>,
        resource_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            subscription: subscription.into(),
            resource_group: resource_group.into(),
            provider: provider.into(),
            segments: vec![(resource_type.into(), name.into())],
        }
    }

    /// Build a `Microsoft.Compute/<type>/<name>` id.
    pub fn compute(
        subscription: &str,
        resource_group: &str,
        resource_type: &str,
        name: &str,
    ) -> Self {
        Self::new(
            subscription,
            resource_group,
            "Microsoft.Compute",
            resource_type,
            name,
        )
    }

    pub fn subscription(&self) -> &str {
        &self.subscription
    }

    pub fn resource_group(&self) -> &str {
        &self.resource_group
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Full type path, e.g. `Microsoft.Compute/galleries/images/versions`.
    pub fn resource_type(&self) -> String {
        let mut out = self.provider.clone();
        for (t, _) in &self.segments {
            out.push('/');
            out.push_str(t);
        }
        out
    }

    /// Name of the innermost resource.
    pub fn name(&self) -> &str {
        &self.segments[self.segments.len() - 1].1
    }

    /// Names of every resource in the chain, outermost first.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(|(_, n)| n.as_str())
    }

    /// True when the full type path matches (case-insensitive).
    pub fn is_type(&self, resource_type: &str) -> bool {
        self.resource_type().eq_ignore_ascii_case(resource_type)
    }

    /// Drop the innermost type/name pair. `None` for a top-level resource.
    pub fn parent(&self) -> Option<ResourceId> {
        if self.segments.len() < 2 {
            return None;
        }
        let mut parent = self.clone();
        parent.segments.pop();
        Some(parent)
    }

    /// Append a type/name pair.
    pub fn child(&self, resource_type: impl Into<String>, name: impl Into<String>) -> ResourceId {
        let mut child = self.clone();
        child.segments.push((resource_type.into(), name.into()));
        child
    }

    /// Compare the way ARM does: ids are case-insensitive.
    pub fn eq_ignore_case(&self, other: &ResourceId) -> bool {
        self.to_string().eq_ignore_ascii_case(&other.to_string())
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/subscriptions/{}/resourceGroups/{}/providers/{}",
            self.subscription, self.resource_group, self.provider
        )?;
        for (t, n) in &self.segments {
            write!(f, "/{}/{}", t, n)?;
        }
        Ok(())
    }
}

impl FromStr for ResourceId {
    type Err = ResourceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ResourceIdError::Empty);
        }
        let Some(rest) = s.strip_prefix('/') else {
            return Err(ResourceIdError::NotAbsolute(s.to_string()));
        };

        let parts: Vec<&str> = rest.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(ResourceIdError::EmptySegment(s.to_string()));
        }

        let expect = |idx: usize, keyword: &'static str| -> Result<(), ResourceIdError> {
            match parts.get(idx) {
                Some(p) if p.eq_ignore_ascii_case(keyword) && parts.len() > idx + 1 => Ok(()),
                _ => Err(ResourceIdError::MissingSegment {
                    id: s.to_string(),
                    segment: keyword,
                }),
            }
        };

        expect(0, "subscriptions")?;
        expect(2, "resourceGroups")?;
        expect(4, "providers")?;

        let chain = &parts[6..];
        if chain.is_empty() || chain.len() % 2 != 0 {
            return Err(ResourceIdError::UnpairedSegment(s.to_string()));
        }

        Ok(Self {
            subscription: parts[1].to_string(),
            resource_group: parts[3].to_string(),
            provider: parts[5].to_string(),
            segments: chain
                .chunks(2)
                .map(|pair| (pair[0].to_string(), pair[1].to_string()))
                .collect(),
        })
    }
}

impl TryFrom<String> for ResourceId {
    type Error = ResourceIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERSION_ID: &str = "/subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.Compute/galleries/gal/images/img/versions/1.0.0";

    #[test]
    fn parses_nested_chain() {
        let id: ResourceId = VERSION_ID.parse().unwrap();
        assert_eq!(id.subscription(), "sub1");
        assert_eq!(id.resource_group(), "rg1");
        assert_eq!(id.provider(), "Microsoft.Compute");
        assert_eq!(
            id.resource_type(),
            "Microsoft.Compute/galleries/images/versions"
        );
        assert_eq!(id.name(), "1.0.0");
        assert_eq!(id.names().collect::<Vec<_>>(), vec!["gal", "img", "1.0.0"]);
    }

    #[test]
    fn round_trips_to_canonical_form() {
        let id: ResourceId = "/SUBSCRIPTIONS/s/resourcegroups/rg/PROVIDERS/Microsoft.Compute/disks/d1"
            .parse()
            .unwrap();
        assert_eq!(
            id.to_string(),
            "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/disks/d1"
        );
        let again: ResourceId = id.to_string().parse().unwrap();
        assert_eq!(again, id);
    }

    #[test]
    fn parent_drops_last_pair() {
        let id: ResourceId = VERSION_ID.parse().unwrap();
        let image = id.parent().unwrap();
        assert_eq!(image.resource_type(), "Microsoft.Compute/galleries/images");
        assert_eq!(image.name(), "img");
        let gallery = image.parent().unwrap();
        assert_eq!(gallery.name(), "gal");
        assert!(gallery.parent().is_none());
    }

    #[test]
    fn child_appends_pair() {
        let gallery = ResourceId::compute("s", "rg", "galleries", "gal");
        let image = gallery.child("images", "img");
        assert!(image.is_type("microsoft.compute/galleries/images"));
        assert_eq!(image.parent().unwrap(), gallery);
    }

    #[test]
    fn new_builds_top_level_resource() {
        let gallery = ResourceId::new("s", "rg", "Microsoft.Compute", "galleries", "gal");
        assert_eq!(
            gallery.to_string(),
            "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/galleries/gal"
        );
        assert_eq!(gallery.name(), "gal");
        assert!(gallery.parent().is_none());

        let version = gallery.child("images", "img").child("versions", "1.0.0");
        assert_eq!(
            version.to_string(),
            "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/galleries/gal/images/img/versions/1.0.0"
        );
    }

    #[test]
    fn rejects_malformed_ids() {
        assert_eq!("".parse::<ResourceId>(), Err(ResourceIdError::Empty));
        assert!(matches!(
            "subscriptions/s".parse::<ResourceId>(),
            Err(ResourceIdError::NotAbsolute(_))
        ));
        assert!(matches!(
            "/subscriptions/s/resourceGroups/rg".parse::<ResourceId>(),
            Err(ResourceIdError::MissingSegment { segment: "providers", .. })
        ));
        assert!(matches!(
            "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/disks".parse::<ResourceId>(),
            Err(ResourceIdError::UnpairedSegment(_))
        ));
        assert!(matches!(
            "/subscriptions//resourceGroups/rg/providers/p/t/n".parse::<ResourceId>(),
            Err(ResourceIdError::EmptySegment(_))
        ));
    }

    #[test]
    fn eq_ignore_case_matches_arm_semantics() {
        let a: ResourceId = "/subscriptions/S/resourceGroups/RG/providers/Microsoft.Compute/disks/D"
            .parse()
            .unwrap();
        let b: ResourceId = "/subscriptions/s/resourceGroups/rg/providers/microsoft.compute/disks/d"
            .parse()
            .unwrap();
        assert_ne!(a, b);
        assert!(a.eq_ignore_case(&b));
    }

    #[test]
    fn serde_uses_string_form() {
        let id: ResourceId = VERSION_ID.parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", VERSION_ID));
        let back: ResourceId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<ResourceId>("\"/nope\"").is_err());
    }
}
