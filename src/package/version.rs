//! Semantic version range matching.
//!
//! Mod manifests write ranges the npm way (`>=1.0.0 <2.0.0`, `^0.4.1`,
//! `1.2.x`, `1.0.0 - 1.4.0`, `a || b`) while the `semver` crate expects
//! comma separated comparators with caret as the default operator. This
//! module translates one into the other and evaluates the result.

use semver::{Version, VersionReq};

/// Evaluates whether a version string satisfies a range expression.
pub struct VersionMatcher;

impl VersionMatcher {
    /// Returns `true` when `version` satisfies `range`.
    ///
    /// Unparseable versions or ranges never match.
    pub fn satisfies(version: &str, range: &str) -> bool {
        let Some(version) = parse_version(version) else {
            return false;
        };

        range
            .split("||")
            .filter_map(translate_range)
            .any(|req| req.matches(&version))
    }

    /// Returns `true` when `version` is strictly older than `latest`.
    pub fn is_older(version: &str, latest: &str) -> bool {
        Self::satisfies(version, &format!("<{}", latest.trim()))
    }
}

/// Parses a version leniently: a leading `v` is ignored and missing minor or
/// patch components default to zero.
pub fn parse_version(s: &str) -> Option<Version> {
    let s = s.trim();
    let s = s.strip_prefix('v').unwrap_or(s);
    if let Ok(v) = Version::parse(s) {
        return Some(v);
    }

    let (core, rest) = match s.find(['-', '+']) {
        Some(i) => s.split_at(i),
        None => (s, ""),
    };
    let parts = core.split('.').count();
    if parts == 0 || parts > 2 {
        return None;
    }
    let padded = format!("{}{}{}", core, ".0".repeat(3 - parts), rest);
    Version::parse(&padded).ok()
}

/// Translates a single npm-style alternative into a [`VersionReq`].
fn translate_range(alternative: &str) -> Option<VersionReq> {
    let alternative = alternative.trim();
    if alternative.is_empty() || alternative == "*" {
        return Some(VersionReq::STAR);
    }

    if let Some((low, high)) = alternative.split_once(" - ") {
        let low = parse_version(low)?;
        let high = parse_version(high)?;
        return VersionReq::parse(&format!(">={}, <={}", low, high)).ok();
    }

    let mut comparators = Vec::new();
    let mut pending_op: Option<&str> = None;
    for token in alternative.split_whitespace() {
        let token = token.trim_end_matches(',');
        if token.is_empty() {
            continue;
        }
        if is_operator(token) {
            pending_op = Some(token);
            continue;
        }
        let token = match pending_op.take() {
            Some(op) => format!("{}{}", op, token),
            None => token.to_string(),
        };
        comparators.push(normalize_comparator(&token));
    }

    if comparators.is_empty() {
        return None;
    }
    VersionReq::parse(&comparators.join(", ")).ok()
}

fn is_operator(token: &str) -> bool {
    matches!(token, "=" | ">" | ">=" | "<" | "<=" | "~" | "^")
}

/// Bare versions are exact matches in npm ranges but caret requirements in
/// Cargo syntax, so they get an explicit `=`. `x` wildcards become `*`.
fn normalize_comparator(token: &str) -> String {
    let op_len = token
        .find(|c: char| c.is_ascii_digit() || c == '*' || c == 'x' || c == 'X' || c == 'v')
        .unwrap_or(token.len());
    let (op, version) = token.split_at(op_len);
    let version = version.strip_prefix('v').unwrap_or(version);
    let version = version
        .split('.')
        .map(|part| if part == "x" || part == "X" { "*" } else { part })
        .collect::<Vec<_>>()
        .join(".");

    let is_wildcard = version.split('.').any(|part| part == "*");
    match op {
        "" if is_wildcard => version,
        "" => format!("={}", version),
        "~>" => format!("~{}", version),
        op => format!("{}{}", op, version),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_separated_range() {
        assert!(VersionMatcher::satisfies("1.5.0", ">=1.0.0 <2.0.0"));
        assert!(!VersionMatcher::satisfies("2.0.0", ">=1.0.0 <2.0.0"));
        assert!(!VersionMatcher::satisfies("0.9.9", ">=1.0.0 <2.0.0"));
    }

    #[test]
    fn test_operator_separated_by_space() {
        assert!(VersionMatcher::satisfies("1.2.0", ">= 1.0.0 < 2.0.0"));
        assert!(!VersionMatcher::satisfies("2.1.0", ">= 1.0.0 < 2.0.0"));
    }

    #[test]
    fn test_caret_and_tilde() {
        assert!(VersionMatcher::satisfies("0.4.9", "^0.4.1"));
        assert!(!VersionMatcher::satisfies("0.5.0", "^0.4.1"));
        assert!(VersionMatcher::satisfies("1.2.9", "~1.2.3"));
        assert!(!VersionMatcher::satisfies("1.3.0", "~1.2.3"));
    }

    #[test]
    fn test_bare_version_is_exact() {
        assert!(VersionMatcher::satisfies("1.2.3", "1.2.3"));
        assert!(!VersionMatcher::satisfies("1.2.4", "1.2.3"));
    }

    #[test]
    fn test_wildcards() {
        assert!(VersionMatcher::satisfies("3.1.4", "*"));
        assert!(VersionMatcher::satisfies("3.1.4", ""));
        assert!(VersionMatcher::satisfies("1.2.7", "1.2.x"));
        assert!(!VersionMatcher::satisfies("1.3.0", "1.2.x"));
    }

    #[test]
    fn test_hyphen_range() {
        assert!(VersionMatcher::satisfies("1.4.0", "1.0.0 - 1.4.0"));
        assert!(!VersionMatcher::satisfies("1.4.1", "1.0.0 - 1.4.0"));
    }

    #[test]
    fn test_alternatives() {
        assert!(VersionMatcher::satisfies("3.0.0", "^1.0.0 || ^3.0.0"));
        assert!(!VersionMatcher::satisfies("2.0.0", "^1.0.0 || ^3.0.0"));
    }

    #[test]
    fn test_lenient_versions() {
        assert_eq!(parse_version("v1.2.3"), Some(Version::new(1, 2, 3)));
        assert_eq!(parse_version("1.2"), Some(Version::new(1, 2, 0)));
        assert_eq!(parse_version("1"), Some(Version::new(1, 0, 0)));
        assert!(parse_version("not-a-version").is_none());
        assert!(!VersionMatcher::satisfies("garbage", "*"));
    }

    #[test]
    fn test_is_older() {
        assert!(VersionMatcher::is_older("0.1.0", "0.2.0"));
        assert!(!VersionMatcher::is_older("0.2.0", "0.2.0"));
        assert!(!VersionMatcher::is_older("0.3.0", "0.2.0"));
    }
}
