//! Validated configuration values.
//!
//! The raw command line arguments are parsed into these types exactly once during startup. The
//! resulting values are immutable and moved into the rule set of the selected profile.
use std::{fmt::Display, ops::Deref, str::FromStr};

use regex::Regex;
use snafu::{ResultExt, Snafu, ensure};

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("subnet ID must not be blank"))]
    BlankSubnet,

    #[snafu(display("namespace pattern must not be blank"))]
    BlankNamespacePattern,

    #[snafu(display("namespace pattern {pattern:?} is not a valid regular expression"))]
    InvalidNamespacePattern {
        source: regex::Error,
        pattern: String,
    },
}

/// The ID of the VPC subnet internal load balancers are placed in.
///
/// Instances of this struct are never blank. Surrounding whitespace is removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubnetId(String);

impl FromStr for SubnetId {
    type Err = ConfigError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        ensure!(!input.is_empty(), BlankSubnetSnafu);

        Ok(Self(input.to_owned()))
    }
}

impl Deref for SubnetId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for SubnetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decides which namespaces are patched.
///
/// The pattern is not anchored, `prod` matches `prod-1` as well as `pre-prod`. Use `^` and `$`
/// to match whole namespace names.
#[derive(Clone, Debug)]
pub struct NamespaceMatcher(Regex);

impl NamespaceMatcher {
    pub fn is_match(&self, namespace: &str) -> bool {
        self.0.is_match(namespace)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl FromStr for NamespaceMatcher {
    type Err = ConfigError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let pattern = input.trim();
        ensure!(!pattern.is_empty(), BlankNamespacePatternSnafu);

        let regex = Regex::new(pattern).context(InvalidNamespacePatternSnafu { pattern })?;
        Ok(Self(regex))
    }
}

impl Display for NamespaceMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("subnet-1234", "subnet-1234")]
    #[case("  subnet-1234\n", "subnet-1234")]
    fn subnet_id(#[case] input: &str, #[case] expected: &str) {
        let subnet: SubnetId = input.parse().expect("subnet ID must be valid");
        assert_eq!(&*subnet, expected);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("\t\n")]
    fn blank_subnet_id(#[case] input: &str) {
        let err = input.parse::<SubnetId>().expect_err("blank subnet ID must fail");
        assert!(matches!(err, ConfigError::BlankSubnet));
    }

    #[rstest]
    #[case("^prod-", "prod-1", true)]
    #[case("^prod-", "staging", false)]
    #[case("^prod-", "pre-prod-1", false)]
    #[case("prod", "pre-prod", true)]
    #[case(" ^(a|b)$ ", "b", true)]
    #[case("^(a|b)$", "ab", false)]
    #[case(".*", "", true)]
    fn namespace_matcher(#[case] pattern: &str, #[case] namespace: &str, #[case] expected: bool) {
        let matcher: NamespaceMatcher = pattern.parse().expect("pattern must be valid");
        assert_eq!(matcher.is_match(namespace), expected);
    }

    #[test]
    fn blank_namespace_pattern() {
        let err = " ".parse::<NamespaceMatcher>().expect_err("blank pattern must fail");
        assert!(matches!(err, ConfigError::BlankNamespacePattern));
    }

    #[test]
    fn invalid_namespace_pattern() {
        let err = "^prod-(".parse::<NamespaceMatcher>().expect_err("invalid pattern must fail");

        assert!(matches!(err, ConfigError::InvalidNamespacePattern { .. }));
        assert_eq!(
            err.to_string(),
            r#"namespace pattern "^prod-(" is not a valid regular expression"#
        );
    }
}
