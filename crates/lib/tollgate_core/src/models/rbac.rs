//! Role and permission models.

use serde::{Deserialize, Serialize};

/// An atomic capability grantable to a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Display name; not used for authorization decisions.
    pub name: String,
    pub resource: String,
    pub http_method: String,
}

impl Permission {
    /// The identity used for authorization.
    pub fn key(&self) -> PermissionKey {
        PermissionKey {
            resource: self.resource.clone(),
            http_method: self.http_method.clone(),
        }
    }

    /// Exact `(resource, http_method)` match.
    pub fn allows(&self, resource: &str, http_method: &str) -> bool {
        self.resource == resource && self.http_method == http_method
    }
}

/// `(resource, http_method)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermissionKey {
    pub resource: String,
    pub http_method: String,
}

impl PermissionKey {
    pub fn new(resource: impl Into<String>, http_method: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            http_method: http_method.into(),
        }
    }
}

/// Role with its associated permissions loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub permissions: Vec<Permission>,
}

impl Role {
    pub fn grants(&self, resource: &str, http_method: &str) -> bool {
        self.permissions
            .iter()
            .any(|p| p.allows(resource, http_method))
    }
}
