//! Version resolution against a registry index.

use crate::error::{PkgError, Result};
use crate::registry::{RegistryIndex, VersionRecord};
use semver::{Version, VersionReq};

/// The outcome of resolving a version specifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedVersion {
    pub exact_version: String,
    pub record: VersionRecord,
    pub was_dist_tag: bool,
}

/// Resolve a version specifier against an index.
///
/// # Rules
/// - A dist-tag name resolves to the version it points at
/// - A known version string is used directly
/// - Anything else is a semver range; the highest satisfying version wins
/// - Supports npm syntax: OR ranges, hyphen ranges, x-ranges, space-separated comparators
///
/// Pre-releases only satisfy a range whose comparator names a pre-release of
/// the same `major.minor.patch`. Tags and exact strings may name any version.
///
/// # Errors
/// `RegistryNotFound` if there is no index, `Registry` if the index is an
/// error document, `VersionNotFound` if nothing matches.
pub fn resolve_version(
    index: Option<&RegistryIndex>,
    name: &str,
    spec: &str,
) -> Result<ResolvedVersion> {
    let index = index.ok_or_else(|| PkgError::RegistryNotFound {
        name: name.to_string(),
    })?;

    if let Some(error) = &index.error {
        return Err(PkgError::Registry(format!("{name}: {error}")));
    }

    let (exact, was_dist_tag) = if let Some(tagged) = index.dist_tags.get(spec) {
        (tagged.clone(), true)
    } else if index.versions.contains_key(spec) {
        (spec.to_string(), false)
    } else if Version::parse(spec).is_ok() {
        // A literal version that was never published is not a range
        return Err(PkgError::version_not_found(name, spec));
    } else {
        let highest = max_satisfying(index, spec)
            .ok_or_else(|| PkgError::version_not_found(name, spec))?;
        (highest, false)
    };

    let record = index
        .versions
        .get(&exact)
        .cloned()
        .ok_or_else(|| PkgError::version_not_found(name, spec))?;

    Ok(ResolvedVersion {
        exact_version: exact,
        record,
        was_dist_tag,
    })
}

fn max_satisfying(index: &RegistryIndex, range: &str) -> Option<String> {
    let reqs = parse_or_range(range)?;

    index
        .versions
        .keys()
        .filter_map(|raw| Version::parse(raw).ok().map(|v| (v, raw)))
        .filter(|(v, _)| reqs.iter().any(|r| r.matches(v)))
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, raw)| raw.clone())
}

/// Parse `a || b || c`; invalid alternatives are skipped.
fn parse_or_range(range: &str) -> Option<Vec<VersionReq>> {
    let reqs: Vec<VersionReq> = range
        .split("||")
        .map(str::trim)
        .filter(|alt| !alt.is_empty())
        .filter_map(parse_range)
        .collect();

    if reqs.is_empty() {
        None
    } else {
        Some(reqs)
    }
}

/// Parse one npm range alternative into a `VersionReq`.
fn parse_range(range: &str) -> Option<VersionReq> {
    if range == "*" || range.eq_ignore_ascii_case("x") {
        return Some(VersionReq::STAR);
    }

    // "1.0.0 - 2.0.0" -> ">=1.0.0, <=2.0.0"
    if let Some((start, end)) = range.split_once(" - ") {
        let (start, end) = (start.trim(), end.trim());
        if start.is_empty() || end.is_empty() {
            return None;
        }
        return VersionReq::parse(&format!(">={start}, <={end}")).ok();
    }

    VersionReq::parse(&join_comparators(range)).ok()
}

/// Rewrite npm's space-separated comparators into comma-separated ones.
///
/// `>= 2.1.2 < 3.0.0` becomes `>=2.1.2, <3.0.0`. Operators detached from their
/// version are glued back on. A bare version is exact, as in npm.
fn join_comparators(range: &str) -> String {
    let mut comparators: Vec<String> = Vec::new();
    let mut pending_op = String::new();

    for token in range.split_whitespace() {
        if token.chars().all(|c| matches!(c, '<' | '>' | '=' | '~' | '^')) {
            pending_op.push_str(token);
            continue;
        }

        let starts_with_op = token.starts_with(['<', '>', '=', '~', '^']);
        let is_wildcard = token.contains(['x', 'X', '*']);
        let op = if !pending_op.is_empty() {
            std::mem::take(&mut pending_op)
        } else if starts_with_op || is_wildcard {
            String::new()
        } else {
            "=".to_string()
        };

        comparators.push(format!("{op}{}", token.trim_start_matches('v')));
    }

    comparators.join(", ")
}
