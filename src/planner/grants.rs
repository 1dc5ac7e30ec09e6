//! Grant state and grant diffing.
//!
//! Grants are compared as atomic `(privilege, role type, role name)` keys,
//! case-insensitively. `ALL` is expanded to its concrete privileges before
//! comparison, and the platform-managed `OWNERSHIP` grant never takes part.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::service::ObservedGrant;

/// Privilege held by the platform on every agent; never diffed.
pub const BOOTSTRAP_PRIVILEGE: &str = "OWNERSHIP";

/// A privilege this tool manages on an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Privilege {
    /// Use the agent.
    Usage,
    /// Change the agent.
    Modify,
    /// Inspect the agent's activity.
    Monitor,
    /// Shorthand for every concrete privilege.
    All,
}

static CONCRETE_PRIVILEGES: [Privilege; 3] = [Privilege::Usage, Privilege::Modify, Privilege::Monitor];

impl Privilege {
    /// SQL keyword for this privilege.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Usage => "USAGE",
            Self::Modify => "MODIFY",
            Self::Monitor => "MONITOR",
            Self::All => "ALL",
        }
    }

    /// Concrete privileges this privilege stands for.
    #[must_use]
    pub fn expand(self) -> &'static [Self] {
        match self {
            Self::All => &CONCRETE_PRIVILEGES,
            Self::Usage => &CONCRETE_PRIVILEGES[0..1],
            Self::Modify => &CONCRETE_PRIVILEGES[1..2],
            Self::Monitor => &CONCRETE_PRIVILEGES[2..3],
        }
    }
}

impl FromStr for Privilege {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USAGE" => Ok(Self::Usage),
            "MODIFY" => Ok(Self::Modify),
            "MONITOR" => Ok(Self::Monitor),
            "ALL" | "ALL PRIVILEGES" => Ok(Self::All),
            _ => Err(ConfigError::InvalidPrivilege {
                privilege: s.to_string(),
            }),
        }
    }
}

/// Kind of role a grant is made to.
///
/// Account and database roles use different grant statements and are never
/// conflated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleType {
    /// Account-level role.
    AccountRole,
    /// Database-scoped role.
    DatabaseRole,
}

impl RoleType {
    /// Keyword used after `TO` / `FROM` in grant statements.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::AccountRole => "ROLE",
            Self::DatabaseRole => "DATABASE ROLE",
        }
    }
}

impl FromStr for RoleType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace(' ', "_").as_str() {
            "ROLE" | "ACCOUNT_ROLE" => Ok(Self::AccountRole),
            "DATABASE_ROLE" => Ok(Self::DatabaseRole),
            other => Err(ConfigError::validation(
                format!("Unsupported grantee type '{other}'"),
                "granted_to",
            )),
        }
    }
}

/// A single privilege grant to a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrantEntry {
    /// Granted privilege.
    pub privilege: Privilege,
    /// Kind of grantee role.
    pub role_type: RoleType,
    /// Grantee role name as written.
    pub role_name: String,
}

/// Case-insensitive comparison key of a [`GrantEntry`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GrantKey {
    role_type: RoleType,
    role_name: String,
    privilege: Privilege,
}

impl GrantEntry {
    /// Creates a grant entry.
    #[must_use]
    pub fn new(privilege: Privilege, role_type: RoleType, role_name: impl Into<String>) -> Self {
        Self {
            privilege,
            role_type,
            role_name: role_name.into(),
        }
    }

    /// Returns the comparison key.
    #[must_use]
    pub fn key(&self) -> GrantKey {
        GrantKey {
            role_type: self.role_type,
            role_name: self.role_name.to_uppercase(),
            privilege: self.privilege,
        }
    }

    fn expanded(&self) -> impl Iterator<Item = Self> + '_ {
        self.privilege
            .expand()
            .iter()
            .map(|p| Self::new(*p, self.role_type, self.role_name.clone()))
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl fmt::Display for GrantEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {} {}", self.privilege, self.role_type, self.role_name)
    }
}

/// An unordered set of grants on one agent.
#[derive(Debug, Clone, Default)]
pub struct GrantState {
    entries: BTreeMap<GrantKey, GrantEntry>,
}

impl GrantState {
    /// Creates an empty grant state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Adds an entry; a case-insensitive duplicate keeps the first spelling.
    pub fn insert(&mut self, entry: GrantEntry) {
        self.entries.entry(entry.key()).or_insert(entry);
    }

    /// Builds the observed state from `SHOW GRANTS` rows.
    ///
    /// The bootstrap ownership grant is dropped, as are grants to principals
    /// that are not roles.
    #[must_use]
    pub fn from_observed(rows: &[ObservedGrant]) -> Self {
        let mut state = Self::new();
        for row in rows {
            if row.privilege.eq_ignore_ascii_case(BOOTSTRAP_PRIVILEGE) {
                debug!("Ignoring {} held by {}", row.privilege, row.grantee_name);
                continue;
            }
            let privilege = match row.privilege.parse::<Privilege>() {
                Ok(p) => p,
                Err(e) => {
                    warn!("Skipping observed grant to {}: {e}", row.grantee_name);
                    continue;
                }
            };
            let role_type = match row.granted_to.parse::<RoleType>() {
                Ok(t) => t,
                Err(e) => {
                    warn!("Skipping observed grant to {}: {e}", row.grantee_name);
                    continue;
                }
            };
            state.insert(GrantEntry::new(privilege, role_type, row.grantee_name.clone()));
        }
        state
    }

    /// Number of entries as written (before `ALL` expansion).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = &GrantEntry> {
        self.entries.values()
    }

    /// Returns the state with every `ALL` replaced by concrete privileges.
    fn expanded(&self) -> BTreeMap<GrantKey, GrantEntry> {
        let mut out = BTreeMap::new();
        for entry in self.entries.values().flat_map(GrantEntry::expanded) {
            out.entry(entry.key()).or_insert(entry);
        }
        out
    }
}

impl FromIterator<GrantEntry> for GrantState {
    fn from_iter<I: IntoIterator<Item = GrantEntry>>(iter: I) -> Self {
        let mut state = Self::new();
        for entry in iter {
            state.insert(entry);
        }
        state
    }
}

/// Grants to add and remove to converge an agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GrantDiff {
    /// Desired grants that are missing.
    pub to_grant: Vec<GrantEntry>,
    /// Current grants that are not desired.
    pub to_revoke: Vec<GrantEntry>,
}

impl GrantDiff {
    /// Returns true when nothing needs to change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_grant.is_empty() && self.to_revoke.is_empty()
    }

    /// Total number of grant operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.to_grant.len() + self.to_revoke.len()
    }
}

/// Computes set differences between grant states.
#[derive(Debug, Default, Clone, Copy)]
pub struct GrantDiffer;

impl GrantDiffer {
    /// Creates a grant differ.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes `desired - current` and `current - desired`.
    #[must_use]
    pub fn compute_diff(&self, desired: &GrantState, current: &GrantState) -> GrantDiff {
        let desired = desired.expanded();
        let current = current.expanded();

        let to_grant = desired
            .iter()
            .filter(|(key, _)| !current.contains_key(*key))
            .map(|(_, entry)| entry.clone())
            .collect();
        let to_revoke = current
            .iter()
            .filter(|(key, _)| !desired.contains_key(*key))
            .map(|(_, entry)| entry.clone())
            .collect();

        GrantDiff { to_grant, to_revoke }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(privilege: Privilege, name: &str) -> GrantEntry {
        GrantEntry::new(privilege, RoleType::AccountRole, name)
    }

    fn observed(privilege: &str, granted_to: &str, grantee: &str) -> ObservedGrant {
        ObservedGrant {
            privilege: privilege.to_string(),
            granted_to: granted_to.to_string(),
            grantee_name: grantee.to_string(),
        }
    }

    #[test]
    fn test_same_state_has_empty_diff() {
        let state: GrantState = [
            role(Privilege::Usage, "R1"),
            role(Privilege::All, "R2"),
            GrantEntry::new(Privilege::Monitor, RoleType::DatabaseRole, "AI.R3"),
        ]
        .into_iter()
        .collect();

        let diff = GrantDiffer::new().compute_diff(&state, &state);
        assert!(diff.is_empty());
    }

    #[test]
    fn test_all_matches_concrete_privileges() {
        let desired: GrantState = [role(Privilege::All, "R1")].into_iter().collect();
        let current: GrantState = [
            role(Privilege::Usage, "R1"),
            role(Privilege::Modify, "R1"),
            role(Privilege::Monitor, "R1"),
        ]
        .into_iter()
        .collect();

        assert!(GrantDiffer::new().compute_diff(&desired, &current).is_empty());
    }

    #[test]
    fn test_all_against_empty_grants_every_privilege() {
        let desired: GrantState = [role(Privilege::All, "R1")].into_iter().collect();

        let diff = GrantDiffer::new().compute_diff(&desired, &GrantState::new());

        assert_eq!(
            diff.to_grant,
            vec![
                role(Privilege::Usage, "R1"),
                role(Privilege::Modify, "R1"),
                role(Privilege::Monitor, "R1"),
            ]
        );
        assert!(diff.to_revoke.is_empty());
    }

    #[test]
    fn test_extra_current_grant_is_revoked() {
        let desired: GrantState = [role(Privilege::Usage, "R1")].into_iter().collect();
        let current: GrantState = [role(Privilege::Usage, "R1"), role(Privilege::Usage, "R2")]
            .into_iter()
            .collect();

        let diff = GrantDiffer::new().compute_diff(&desired, &current);

        assert!(diff.to_grant.is_empty());
        assert_eq!(diff.to_revoke, vec![role(Privilege::Usage, "R2")]);
    }

    #[test]
    fn test_role_names_compare_case_insensitively() {
        let desired: GrantState = [role(Privilege::Usage, "analyst")].into_iter().collect();
        let current: GrantState = [role(Privilege::Usage, "ANALYST")].into_iter().collect();

        assert!(GrantDiffer::new().compute_diff(&desired, &current).is_empty());
    }

    #[test]
    fn test_role_types_are_distinct() {
        let desired: GrantState = [GrantEntry::new(Privilege::Usage, RoleType::DatabaseRole, "R1")]
            .into_iter()
            .collect();
        let current: GrantState = [role(Privilege::Usage, "R1")].into_iter().collect();

        let diff = GrantDiffer::new().compute_diff(&desired, &current);
        assert_eq!(diff.to_grant.len(), 1);
        assert_eq!(diff.to_revoke.len(), 1);
        assert_eq!(diff.len(), 2);
    }

    #[test]
    fn test_observed_ownership_is_filtered() {
        let current = GrantState::from_observed(&[
            observed("OWNERSHIP", "ROLE", "SYSADMIN"),
            observed("USAGE", "ROLE", "ANALYST"),
            observed("MONITOR", "DATABASE_ROLE", "AI.OPS"),
            observed("USAGE", "APPLICATION", "SOME_APP"),
        ]);

        assert_eq!(current.len(), 2);
        let desired: GrantState = [
            role(Privilege::Usage, "ANALYST"),
            GrantEntry::new(Privilege::Monitor, RoleType::DatabaseRole, "ai.ops"),
        ]
        .into_iter()
        .collect();
        assert!(GrantDiffer::new().compute_diff(&desired, &current).is_empty());
    }

    #[test]
    fn test_privilege_parsing() {
        assert_eq!("usage".parse::<Privilege>().ok(), Some(Privilege::Usage));
        assert_eq!(" ALL ".parse::<Privilege>().ok(), Some(Privilege::All));
        assert!("OWNERSHIP".parse::<Privilege>().is_err());
        assert_eq!("DATABASE ROLE".parse::<RoleType>().ok(), Some(RoleType::DatabaseRole));
        assert_eq!("ROLE".parse::<RoleType>().ok(), Some(RoleType::AccountRole));
    }

    #[test]
    fn test_grant_entry_display() {
        let entry = GrantEntry::new(Privilege::Modify, RoleType::DatabaseRole, "AI.EDITORS");
        assert_eq!(entry.to_string(), "MODIFY on DATABASE ROLE AI.EDITORS");
    }
}
