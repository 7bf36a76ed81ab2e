use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex_lite::{Regex, RegexBuilder};
use serde::de::Visitor;
use serde::{Deserialize, Deserializer};

/// A config-file duration: either an integer number of seconds or a string like `1d 2h 3m 4s`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Duration(std::time::Duration);

impl Duration {
    pub const fn from_secs(seconds: u64) -> Self {
        Self(std::time::Duration::from_secs(seconds))
    }
}

impl FromStr for Duration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        static REGEXP: OnceLock<Regex> = OnceLock::new();

        let regexp = REGEXP.get_or_init(|| {
            RegexBuilder::new(
                r"
                ^
                (?:(?<days>    \d+)d)? \s*
                (?:(?<hours>   \d+)h)? \s*
                (?:(?<minutes> \d+)m)? \s*
                (?:(?<seconds> \d+)s)?
                $",
            )
            .ignore_whitespace(true)
            .build()
            .unwrap()
        });
        let captures = regexp
            .captures(s.trim())
            .ok_or_else(|| format!("`{s}` is not a duration"))?;

        let mut total = 0u64;
        let mut seen = false;

        for (name, scale) in [("days", 86400), ("hours", 3600), ("minutes", 60), ("seconds", 1)] {
            let Some(part) = captures.name(name).map(|m| m.as_str()) else {
                continue;
            };
            seen = true;

            let n = part
                .parse::<u64>()
                .map_err(|e| format!("could not parse {name} (`{part}`): {e}"))?;
            total = n
                .checked_mul(scale)
                .and_then(|n| n.checked_add(total))
                .ok_or_else(|| format!("duration `{s}` is too large"))?;
        }

        if !seen {
            return Err(format!("`{s}` is not a duration"));
        }

        Ok(Duration::from_secs(total))
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DurationVisitor;

        impl<'de> Visitor<'de> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "a duration")
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                self.visit_u64(v.try_into().map_err(E::custom)?)
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(Duration::from_secs(v))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0.as_secs())
    }
}

impl From<std::time::Duration> for Duration {
    fn from(duration: std::time::Duration) -> Self {
        Self(duration)
    }
}

impl From<Duration> for std::time::Duration {
    fn from(duration: Duration) -> Self {
        duration.0
    }
}

impl From<Duration> for time::Duration {
    fn from(duration: Duration) -> Self {
        time::Duration::new(duration.0.as_secs() as i64, duration.0.subsec_nanos() as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::Duration;

    #[test]
    fn parses_compound_durations() {
        assert_eq!("1s".parse(), Ok(Duration::from_secs(1)));
        assert_eq!("2m".parse(), Ok(Duration::from_secs(120)));
        assert_eq!("1d 2h 3m 4s".parse(), Ok(Duration::from_secs(93784)));
    }

    #[test]
    fn rejects_garbage() {
        assert!("".parse::<Duration>().is_err());
        assert!("soon".parse::<Duration>().is_err());
        assert!("4s 3m".parse::<Duration>().is_err());
    }

    #[test]
    fn deserializes_integers_and_strings() {
        #[derive(serde::Deserialize)]
        struct T {
            a: Duration,
            b: Duration,
        }

        let t: T = toml::from_str("a = 30\nb = \"1m\"").unwrap();
        assert_eq!(t.a, Duration::from_secs(30));
        assert_eq!(t.b, Duration::from_secs(60));
    }
}
