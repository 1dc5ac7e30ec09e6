//! Desired-state hashing for plan fingerprints.
//!
//! The fingerprint identifies exactly what a plan was computed from, so two
//! plans can be compared without diffing them.

use sha2::{Digest, Sha256};

use crate::planner::Target;

/// Hasher for computing desired-state fingerprints.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new configuration hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a fingerprint over every target, in order.
    #[must_use]
    pub fn hash_targets(&self, targets: &[Target]) -> String {
        let mut hasher = Sha256::new();

        for target in targets {
            hasher.update(self.hash_target(target).as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a fingerprint of one target.
    ///
    /// Object keys are hashed in sorted order and grants in key order, so
    /// the result does not depend on how the YAML was written.
    #[must_use]
    pub fn hash_target(&self, target: &Target) -> String {
        let mut hasher = Sha256::new();

        hasher.update(target.id.to_string().to_uppercase().as_bytes());
        hasher.update([0u8]);
        hasher.update(target.desired.to_json().to_string().as_bytes());
        hasher.update([0u8]);

        for entry in target.grants.iter() {
            hasher.update(entry.role_type.keyword().as_bytes());
            hasher.update(entry.role_name.to_uppercase().as_bytes());
            hasher.update(entry.privilege.as_str().as_bytes());
            hasher.update([0u8]);
        }

        hex::encode(hasher.finalize())
    }

    /// Returns a short form of a hash (first 12 characters).
    #[must_use]
    pub fn short_hash(hash: &str) -> &str {
        if hash.len() >= 12 { &hash[..12] } else { hash }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{GrantEntry, Privilege, RoleType};
    use crate::service::AgentId;
    use crate::tree::ConfigTree;
    use serde_json::json;

    fn target(spec: serde_json::Value, role: &str) -> Target {
        Target {
            id: AgentId::new("AI", "AGENTS", "SALES"),
            desired: ConfigTree::from(spec),
            grants: [GrantEntry::new(Privilege::Usage, RoleType::AccountRole, role)]
                .into_iter()
                .collect(),
        }
    }

    #[test]
    fn test_hash_is_deterministic() {
        let hasher = ConfigHasher::new();
        let a = target(json!({"comment": "c", "models": {"orchestration": "auto"}}), "R1");
        let b = target(json!({"models": {"orchestration": "auto"}, "comment": "c"}), "r1");

        assert_eq!(hasher.hash_target(&a), hasher.hash_target(&b));
        assert_eq!(hasher.hash_targets(&[a]).len(), 64);
    }

    #[test]
    fn test_hash_changes_with_spec_and_grants() {
        let hasher = ConfigHasher::new();
        let base = target(json!({"comment": "c"}), "R1");
        let spec = target(json!({"comment": "d"}), "R1");
        let grants = target(json!({"comment": "c"}), "R2");

        assert_ne!(hasher.hash_target(&base), hasher.hash_target(&spec));
        assert_ne!(hasher.hash_target(&base), hasher.hash_target(&grants));
    }

    #[test]
    fn test_short_hash() {
        assert_eq!(ConfigHasher::short_hash("abcdef1234567890"), "abcdef123456");
        assert_eq!(ConfigHasher::short_hash("abc"), "abc");
    }
}
