//! Config document versioning and compatibility.

/// Config document version this core understands.
///
/// Follows semver: MAJOR.MINOR.PATCH
/// - MAJOR: Breaking changes (field removals, type changes)
/// - MINOR: Additive changes (new optional sections)
/// - PATCH: Bug fixes, documentation
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";

/// Check if a document version is compatible with [`CONFIG_SCHEMA_VERSION`].
pub fn is_compatible(version: &str) -> bool {
    major(CONFIG_SCHEMA_VERSION) == major(version)
}

fn major(version: &str) -> u32 {
    version
        .trim()
        .trim_start_matches('v')
        .split('.')
        .next()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(0)
}
