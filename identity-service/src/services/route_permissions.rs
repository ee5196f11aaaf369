//! Versioned route-permission table.
//!
//! Lists every privileged route template with the permission that guards it.
//! An embedded default ships with the binary; `ROUTE_PERMISSIONS_PATH`
//! points at a replacement file read at startup.

use serde::Deserialize;
use service_core::error::AppError;
use std::collections::HashSet;

use crate::models::HttpMethod;

const DEFAULT_TABLE: &str = include_str!("../../config/route_permissions.json");

#[derive(Debug, Clone, Deserialize)]
pub struct RoutePermission {
    pub name: String,
    #[serde(default)]
    pub category: String,
    pub method: HttpMethod,
    /// Route template as registered with the router, e.g. `/roles/:id`.
    pub path: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoutePermissionTable {
    pub version: u32,
    pub routes: Vec<RoutePermission>,
}

impl RoutePermissionTable {
    pub fn embedded() -> Result<Self, AppError> {
        Self::parse(DEFAULT_TABLE)
    }

    /// Read the table from `path`, or the embedded default when unset.
    pub fn load(path: Option<&str>) -> Result<Self, AppError> {
        let table = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    AppError::ConfigError(anyhow::anyhow!(
                        "Failed to read route permissions from {}: {}",
                        path,
                        e
                    ))
                })?;
                Self::parse(&raw)?
            }
            None => Self::embedded()?,
        };

        tracing::info!(
            version = table.version,
            routes = table.routes.len(),
            source = path.unwrap_or("embedded"),
            "Route permission table loaded"
        );
        Ok(table)
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let table: Self = serde_json::from_str(raw).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("Invalid route permission table: {}", e))
        })?;
        table.validate()?;
        Ok(table)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.version == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Route permission table version must be at least 1"
            )));
        }

        let mut seen = HashSet::new();
        for route in &self.routes {
            if route.name.trim().is_empty() {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Route permission for {} {} has no name",
                    route.method,
                    route.path
                )));
            }
            if !route.path.starts_with('/') {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Route permission path must start with '/': {}",
                    route.path
                )));
            }
            if !seen.insert((route.method, route.path.as_str())) {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Duplicate route permission: {} {}",
                    route.method,
                    route.path
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn embedded_table_covers_admin_routes() {
        let table = RoutePermissionTable::embedded().unwrap();
        assert!(table.version >= 1);
        assert!(table
            .routes
            .iter()
            .any(|r| r.method == HttpMethod::Delete && r.path == "/roles/:id"));
        assert!(table
            .routes
            .iter()
            .any(|r| r.method == HttpMethod::Put && r.path == "/users/:id/role"));
    }

    #[test]
    fn duplicate_routes_are_rejected() {
        let raw = r#"{"version":1,"routes":[
            {"name":"a","method":"GET","path":"/roles"},
            {"name":"b","method":"GET","path":"/roles"}
        ]}"#;
        assert!(RoutePermissionTable::parse(raw).is_err());
    }

    #[test]
    fn relative_paths_and_unknown_methods_are_rejected() {
        let relative = r#"{"version":1,"routes":[{"name":"a","method":"GET","path":"roles"}]}"#;
        assert!(RoutePermissionTable::parse(relative).is_err());

        let method = r#"{"version":1,"routes":[{"name":"a","method":"TRACE","path":"/roles"}]}"#;
        assert!(RoutePermissionTable::parse(method).is_err());
    }

    #[test]
    fn table_can_be_replaced_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"version":2,"routes":[{{"name":"Reports","category":"reports","method":"GET","path":"/reports"}}]}}"#
        )
        .unwrap();

        let table = RoutePermissionTable::load(file.path().to_str()).unwrap();
        assert_eq!(table.version, 2);
        assert_eq!(table.routes.len(), 1);
        assert_eq!(table.routes[0].path, "/reports");
    }
}
