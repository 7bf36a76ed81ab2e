//! Inbound mentions: the persisted record, its identity, and the checks applied on submission.

pub mod enrich;
pub mod thumbnail;
pub mod validate;

use std::fmt::{self, Display};
use std::str::FromStr;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::OffsetDateTime;

#[derive(
    Serialize, Deserialize, sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MentionState {
    Untriaged,
    Good,
    Spam,
}

impl MentionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Untriaged => "untriaged",
            Self::Good => "good",
            Self::Spam => "spam",
        }
    }
}

impl Display for MentionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

impl FromStr for MentionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "untriaged" => Ok(Self::Untriaged),
            "good" => Ok(Self::Good),
            "spam" => Ok(Self::Spam),
            _ => Err(format!("unknown mention state `{s}`")),
        }
    }
}

/// What we learned about the source page while verifying it.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub author_url: Option<String>,

    #[serde(with = "time::serde::rfc3339::option")]
    pub published: Option<OffsetDateTime>,

    /// Content hash of the author's thumbnail.
    pub thumbnail: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    pub source: String,
    pub target: String,
    pub state: MentionState,

    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,

    #[serde(flatten)]
    pub metadata: Metadata,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct KeyedMention {
    pub key: String,

    #[serde(flatten)]
    pub mention: Mention,
}

/// The storage key of the mention `source` → `target`: a hex-encoded SHA-256 digest.
///
/// The source is length-prefixed, so no two pairs feed the same bytes to the hash.
pub fn key(source: &str, target: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update((source.len() as u64).to_be_bytes());
    hasher.update(source.as_bytes());
    hasher.update(target.as_bytes());

    hex::encode(hasher.finalize())
}

/// A reason to refuse a submitted mention, in the order the rules are checked.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    #[error("Source is empty.")]
    EmptySource,

    #[error("Target is empty.")]
    EmptyTarget,

    #[error("Source and Target must be different.")]
    SameSourceAndTarget,

    #[error("Target is not a valid URL: {0}")]
    InvalidTarget(url::ParseError),

    #[error("Wrong target domain.")]
    WrongDomain,

    #[error("Wrong scheme for target.")]
    WrongScheme,
}

impl Violation {
    pub fn rule(&self) -> &'static str {
        match self {
            Self::EmptySource => "empty-source",
            Self::EmptyTarget => "empty-target",
            Self::SameSourceAndTarget => "same-source-and-target",
            Self::InvalidTarget(_) => "invalid-target",
            Self::WrongDomain => "wrong-domain",
            Self::WrongScheme => "wrong-scheme",
        }
    }
}

impl Mention {
    pub fn new(source: String, target: String, created: OffsetDateTime) -> Self {
        Self {
            source,
            target,
            state: MentionState::Untriaged,
            created,
            metadata: Default::default(),
        }
    }

    pub fn key(&self) -> String {
        key(&self.source, &self.target)
    }

    /// Checks the submission without touching the network.
    pub fn fast_validate(&self, site_domain: &str) -> Result<(), Violation> {
        if self.source.is_empty() {
            return Err(Violation::EmptySource);
        }

        if self.target.is_empty() {
            return Err(Violation::EmptyTarget);
        }

        if self.source == self.target {
            return Err(Violation::SameSourceAndTarget);
        }

        let target = Url::parse(&self.target).map_err(Violation::InvalidTarget)?;

        if !target
            .host_str()
            .is_some_and(|host| host.eq_ignore_ascii_case(site_domain))
        {
            return Err(Violation::WrongDomain);
        }

        if target.scheme() != "https" {
            return Err(Violation::WrongScheme);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use time::macros::datetime;

    use super::*;

    fn check(source: &str, target: &str) -> Result<(), Violation> {
        Mention::new(source.into(), target.into(), datetime!(2024-01-01 0:00 UTC))
            .fast_validate("bitworking.org")
    }

    #[test]
    fn fast_validate_rules_in_order() {
        assert_eq!(check("", ""), Err(Violation::EmptySource));
        assert_eq!(check("https://a.example/", ""), Err(Violation::EmptyTarget));
        assert_eq!(
            check("https://bitworking.org/x", "https://bitworking.org/x"),
            Err(Violation::SameSourceAndTarget)
        );
        assert_eq!(
            check("https://a.example/", "not a url").map_err(|v| v.rule()),
            Err("invalid-target")
        );
        assert_eq!(
            check("https://a.example/", "https://example.com/x"),
            Err(Violation::WrongDomain)
        );
        assert_eq!(
            check("https://a.example/", "http://bitworking.org/x"),
            Err(Violation::WrongScheme)
        );
        assert_eq!(check("https://a.example/", "https://bitworking.org/x"), Ok(()));
        assert_eq!(check("https://a.example/", "https://BitWorking.org:443/x"), Ok(()));
    }

    #[test]
    fn violations_have_distinct_reasons() {
        let violations = [
            Violation::EmptySource,
            Violation::EmptyTarget,
            Violation::SameSourceAndTarget,
            Violation::InvalidTarget(url::ParseError::RelativeUrlWithoutBase),
            Violation::WrongDomain,
            Violation::WrongScheme,
        ];
        let reasons: std::collections::HashSet<_> =
            violations.iter().map(|v| v.to_string()).collect();
        let rules: std::collections::HashSet<_> = violations.iter().map(|v| v.rule()).collect();

        assert_eq!(reasons.len(), violations.len());
        assert_eq!(rules.len(), violations.len());
    }

    #[test]
    fn key_is_stable() {
        assert_eq!(
            key("https://a.example/", "https://bitworking.org/"),
            key("https://a.example/", "https://bitworking.org/")
        );
        assert_eq!(key("ab", "c").len(), 64);
        assert_ne!(key("ab", "c"), key("a", "bc"));
    }

    #[test]
    fn embedded_nuls_do_not_collide() {
        assert_ne!(key("a\0b", "c"), key("a", "b\0c"));
        assert_ne!(key("a\0", "b"), key("a", "\0b"));
    }

    #[test]
    fn state_round_trips_through_strings() {
        for state in [MentionState::Untriaged, MentionState::Good, MentionState::Spam] {
            assert_eq!(state.as_str().parse(), Ok(state));
        }
        assert!("deleted".parse::<MentionState>().is_err());
    }

    proptest! {
        #[test]
        fn key_depends_only_on_the_pair(source in ".*", target in ".*") {
            let a = Mention::new(source.clone(), target.clone(), datetime!(2020-01-01 0:00 UTC));
            let mut b = Mention::new(source.clone(), target.clone(), datetime!(2024-06-01 0:00 UTC));
            b.state = MentionState::Spam;

            prop_assert_eq!(a.key(), b.key());
            prop_assert_eq!(a.key(), key(&source, &target));
        }

        #[test]
        fn distinct_pairs_get_distinct_keys(
            a in "[a-z:/.\\x00]{0,16}",
            b in "[a-z:/.\\x00]{0,16}",
            c in "[a-z:/.\\x00]{0,16}",
            d in "[a-z:/.\\x00]{0,16}",
        ) {
            prop_assume!((&a, &b) != (&c, &d));
            prop_assert_ne!(key(&a, &b), key(&c, &d));
        }
    }
}
