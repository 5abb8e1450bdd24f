//! MAUS endpoint resolution.
//!
//! A CP with a MAUS keeps one log tree per endpoint. Endpoints are a
//! fixed pair; each maps to a directory name that replaces the
//! `{endpoint}` placeholder in a descriptor's sub-path.

use crate::error::LogError;

/// Selector value that broadcasts a command to every endpoint.
pub const ALL: &str = "all";

/// One logical MAUS endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// Name accepted on the command line.
    pub name: &'static str,

    /// Directory name under the CP's `maus/` tree.
    pub sub_path: &'static str,
}

const ENDPOINTS: &[Endpoint] = &[
    Endpoint {
        name: "mau-a",
        sub_path: "maus1",
    },
    Endpoint {
        name: "mau-b",
        sub_path: "maus2",
    },
];

/// Every endpoint, in declaration order.
pub fn all_endpoints() -> &'static [Endpoint] {
    ENDPOINTS
}

/// Resolves an endpoint by name (case-insensitive).
pub fn resolve(name: &str) -> Result<&'static Endpoint, LogError> {
    ENDPOINTS
        .iter()
        .find(|e| e.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| LogError::UnknownEndpoint(name.to_string()))
}

/// Expands a selector into endpoints: a single name, or [`ALL`].
pub fn select(selector: &str) -> Result<Vec<&'static Endpoint>, LogError> {
    if selector.eq_ignore_ascii_case(ALL) {
        return Ok(ENDPOINTS.iter().collect());
    }
    Ok(vec![resolve(selector)?])
}
