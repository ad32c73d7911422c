use std::fmt;

use serde::{Deserialize, Serialize};

/// Process-wide deployment environment used to pick route targets.
///
/// Parsed leniently from a profile name: `prod` and `production` (any case)
/// select [`Environment::Production`], every other value is treated as
/// development so a typo never routes local traffic to production hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn from_profile(profile: &str) -> Self {
        match profile.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Environment::Production,
            _ => Environment::Development,
        }
    }

    /// Pick the primary (development) or alternate (production) target.
    pub fn select<T>(&self, primary: T, alternate: T) -> T {
        match self {
            Environment::Development => primary,
            Environment::Production => alternate,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl From<String> for Environment {
    fn from(profile: String) -> Self {
        Environment::from_profile(&profile)
    }
}

impl From<Environment> for String {
    fn from(env: Environment) -> Self {
        env.to_string()
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "local"),
            Environment::Production => write!(f, "prod"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_parsing() {
        assert_eq!(Environment::from_profile("prod"), Environment::Production);
        assert_eq!(Environment::from_profile("PRODUCTION"), Environment::Production);
        assert_eq!(Environment::from_profile("local"), Environment::Development);
        assert_eq!(Environment::from_profile("staging"), Environment::Development);
        assert_eq!(Environment::from_profile(""), Environment::Development);
    }

    #[test]
    fn test_select() {
        assert_eq!(Environment::Development.select("a", "b"), "a");
        assert_eq!(Environment::Production.select("a", "b"), "b");
    }

    #[test]
    fn test_serde_round_trip_through_profile_string() {
        let env: Environment = serde_json::from_str("\"prod\"").unwrap();
        assert!(env.is_production());
        assert_eq!(serde_json::to_string(&env).unwrap(), "\"prod\"");
    }
}
