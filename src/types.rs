/// Shared types used across the codebase

use serde::{Deserialize, Serialize};

/// Client platform a token is issued for. Each platform owns its own route tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Admin,
    Device,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Admin => "admin",
            Platform::Device => "device",
        }
    }

    /// Route prefix of the tier served to this platform
    pub fn route_prefix(&self) -> &'static str {
        match self {
            Platform::Admin => "/admin",
            Platform::Device => "/device/api/v1",
        }
    }

    /// Roles allowed through the permission check on this tier
    pub fn allowed_roles(&self) -> &'static [&'static str] {
        match self {
            Platform::Admin => &["admin", "system_user"],
            Platform::Device => &["user", "admin", "system_user"],
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(Platform::Admin),
            "device" => Ok(Platform::Device),
            other => Err(format!("unknown platform '{}'", other)),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
