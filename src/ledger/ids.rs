//! Ledger entity identifiers in `shard.realm.num` form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoordinatorError;

/// Raw `shard.realm.num` triple shared by every ledger entity kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId {
    pub shard: u64,
    pub realm: u64,
    pub num: u64,
}

impl EntityId {
    pub const fn new(shard: u64, realm: u64, num: u64) -> Self {
        Self { shard, realm, num }
    }

    /// Zero `num` means the id was never configured.
    pub fn is_unset(&self) -> bool {
        self.num == 0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.shard, self.realm, self.num)
    }
}

impl FromStr for EntityId {
    type Err = CoordinatorError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| CoordinatorError::InvalidEntityId {
            input: raw.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = raw.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(invalid("expected shard.realm.num"));
        }

        let mut nums = [0u64; 3];
        for (slot, part) in nums.iter_mut().zip(&parts) {
            *slot = part
                .parse::<u64>()
                .map_err(|_| invalid("components must be unsigned integers"))?;
        }

        Ok(Self::new(nums[0], nums[1], nums[2]))
    }
}

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(pub EntityId);

        impl $name {
            pub const fn new(shard: u64, realm: u64, num: u64) -> Self {
                Self(EntityId::new(shard, realm, num))
            }

            pub fn is_unset(&self) -> bool {
                self.0.is_unset()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = CoordinatorError;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                EntityId::from_str(raw).map(Self)
            }
        }

        impl TryFrom<String> for $name {
            type Error = CoordinatorError;

            fn try_from(raw: String) -> Result<Self, Self::Error> {
                raw.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.to_string()
            }
        }
    };
}

entity_id!(
    /// Topic carrying coordination envelopes.
    TopicId
);
entity_id!(
    /// Fungible token used for agent payments.
    TokenId
);
entity_id!(
    /// Ledger account able to hold and receive tokens.
    AccountId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays_triples() {
        let id: AccountId = "0.0.4821".parse().unwrap();
        assert_eq!(id, AccountId::new(0, 0, 4821));
        assert_eq!(id.to_string(), "0.0.4821");
    }

    #[test]
    fn rejects_malformed_ids() {
        for raw in ["", "0.0", "0.0.x", "not-a-valid-account", "1.2.3.4", "-1.0.5"] {
            assert!(raw.parse::<AccountId>().is_err(), "{raw} should not parse");
        }
    }

    #[test]
    fn default_is_unset() {
        assert!(TopicId::default().is_unset());
        assert!(!TopicId::new(0, 0, 1).is_unset());
    }

    #[test]
    fn serde_uses_string_form() {
        let token = TokenId::new(0, 0, 77);
        let json = serde_json::to_string(&token).unwrap();
        assert_eq!(json, "\"0.0.77\"");
        let back: TokenId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, token);
        assert!(serde_json::from_str::<TokenId>("\"garbage\"").is_err());
    }
}
