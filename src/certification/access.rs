//! Access rules for certification levels.
//!
//! A level is visible to a user only when at least one of its rules matches.
//! A level without any rules is accessible to nobody; access has to be
//! granted explicitly.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const RULE_ALL: &str = "all";
pub const RULE_GROUP: &str = "group";
pub const RULE_USER: &str = "user";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccessRule {
    All,
    Group { group_id: Uuid },
    User { user_id: Uuid },
}

impl AccessRule {
    /// Decode a stored rule row. Returns `None` for unknown kinds or rows
    /// missing their discriminant payload, which callers skip (a skipped rule
    /// can only narrow access, never widen it).
    pub fn from_row(kind: &str, group_id: Option<Uuid>, user_id: Option<Uuid>) -> Option<Self> {
        match kind {
            RULE_ALL => Some(AccessRule::All),
            RULE_GROUP => group_id.map(|group_id| AccessRule::Group { group_id }),
            RULE_USER => user_id.map(|user_id| AccessRule::User { user_id }),
            _ => None,
        }
    }

    pub fn as_row(&self) -> (&'static str, Option<Uuid>, Option<Uuid>) {
        match *self {
            AccessRule::All => (RULE_ALL, None, None),
            AccessRule::Group { group_id } => (RULE_GROUP, Some(group_id), None),
            AccessRule::User { user_id } => (RULE_USER, None, Some(user_id)),
        }
    }
}

pub fn rule_matches(rule: &AccessRule, user_id: Uuid, group_ids: &[Uuid]) -> bool {
    match *rule {
        AccessRule::All => true,
        AccessRule::Group { group_id } => group_ids.contains(&group_id),
        AccessRule::User { user_id: allowed } => allowed == user_id,
    }
}

/// An empty rule set denies everyone.
pub fn any_rule_matches(rules: &[AccessRule], user_id: Uuid, group_ids: &[Uuid]) -> bool {
    rules
        .iter()
        .any(|rule| rule_matches(rule, user_id, group_ids))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_matches_anyone() {
        let user = Uuid::new_v4();
        assert!(rule_matches(&AccessRule::All, user, &[]));
        assert!(rule_matches(&AccessRule::All, user, &[Uuid::new_v4()]));
    }

    #[test]
    fn group_rule_requires_membership() {
        let user = Uuid::new_v4();
        let group = Uuid::new_v4();
        let rule = AccessRule::Group { group_id: group };
        assert!(rule_matches(&rule, user, &[Uuid::new_v4(), group]));
        assert!(!rule_matches(&rule, user, &[Uuid::new_v4()]));
        assert!(!rule_matches(&rule, user, &[]));
    }

    #[test]
    fn user_rule_requires_exact_user() {
        let user = Uuid::new_v4();
        let rule = AccessRule::User { user_id: user };
        assert!(rule_matches(&rule, user, &[]));
        assert!(!rule_matches(&rule, Uuid::new_v4(), &[]));
    }

    #[test]
    fn empty_rule_set_denies_everyone() {
        let loner = Uuid::new_v4();
        let joiner = Uuid::new_v4();
        let many_groups: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        assert!(!any_rule_matches(&[], loner, &[]));
        assert!(!any_rule_matches(&[], joiner, &many_groups));
    }

    #[test]
    fn any_rule_is_an_or() {
        let user = Uuid::new_v4();
        let rules = vec![
            AccessRule::Group {
                group_id: Uuid::new_v4(),
            },
            AccessRule::User { user_id: user },
        ];
        assert!(any_rule_matches(&rules, user, &[]));
        assert!(!any_rule_matches(&rules, Uuid::new_v4(), &[]));
    }

    #[test]
    fn malformed_rows_decode_to_none() {
        assert_eq!(AccessRule::from_row("group", None, None), None);
        assert_eq!(AccessRule::from_row("user", None, None), None);
        assert_eq!(AccessRule::from_row("everyone", None, None), None);
        assert_eq!(AccessRule::from_row("all", None, None), Some(AccessRule::All));
    }

    #[test]
    fn row_round_trip() {
        let rules = [
            AccessRule::All,
            AccessRule::Group {
                group_id: Uuid::new_v4(),
            },
            AccessRule::User {
                user_id: Uuid::new_v4(),
            },
        ];
        for rule in rules {
            let (kind, group_id, user_id) = rule.as_row();
            assert_eq!(AccessRule::from_row(kind, group_id, user_id), Some(rule));
        }
    }
}
