//! Permission model - one authorizable (route template, method) pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(format!("Invalid HTTP method: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    /// Free-form grouping, e.g. "roles".
    pub category: String,
    pub method: HttpMethod,
    /// Route template such as `/roles/:id`, never a resolved URL.
    pub path: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_utc: DateTime<Utc>,
}

impl Permission {
    pub fn new(
        name: String,
        category: String,
        method: HttpMethod,
        path: String,
        description: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            category,
            method,
            path,
            description,
            created_utc: Utc::now(),
        }
    }

    /// Exact comparison against a route template and request method.
    pub fn matches(&self, route_template: &str, method: &str) -> bool {
        self.path == route_template && self.method.as_str().eq_ignore_ascii_case(method)
    }

    pub fn same_triple(&self, other: &Permission) -> bool {
        self.name == other.name && self.path == other.path && self.method == other.method
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_roles() -> Permission {
        Permission::new(
            "List roles".to_string(),
            "roles".to_string(),
            HttpMethod::Get,
            "/roles".to_string(),
            String::new(),
        )
    }

    #[test]
    fn matches_exact_template_and_method() {
        let permission = list_roles();
        assert!(permission.matches("/roles", "GET"));
        assert!(!permission.matches("/roles", "POST"));
        assert!(!permission.matches("/roles/", "GET"));
    }

    #[test]
    fn resolved_urls_never_match_templates() {
        let permission = Permission::new(
            "Get role".to_string(),
            "roles".to_string(),
            HttpMethod::Get,
            "/roles/:id".to_string(),
            String::new(),
        );
        assert!(permission.matches("/roles/:id", "get"));
        assert!(!permission.matches("/roles/42", "GET"));
    }

    #[test]
    fn parses_known_methods_only() {
        assert_eq!("patch".parse::<HttpMethod>(), Ok(HttpMethod::Patch));
        assert!("OPTIONS".parse::<HttpMethod>().is_err());
    }
}
