// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! Ownership scope: the domain / project / access-key triple that quotas
//! and concurrency counters are keyed on.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccessKey(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DomainName(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectName(pub String);

impl std::fmt::Display for AccessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for DomainName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for ProjectName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccessKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&str> for DomainName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&str> for ProjectName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The owner scope used for quota lookups and reuse checks (§4.4, §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerScope {
    pub domain: DomainName,
    pub project: ProjectName,
    pub access_key: AccessKey,
    pub user_id: uuid::Uuid,
}

/// Whether a concurrency slot belongs to a compute session or a system
/// (e.g. inference/admin) session — `destroy_session` decrements exactly
/// one of the two keypair counters (SPEC_FULL §Supplemented features 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConcurrencyKind {
    Compute,
    System,
}
