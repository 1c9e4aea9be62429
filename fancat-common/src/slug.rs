//! Slug derivation for entity and owner records

use uuid::Uuid;

/// Derive the base slug for a display name.
///
/// ASCII alphanumerics are lowercased and runs of anything else collapse to a
/// single `-`. Names with no ASCII alphanumerics (e.g. all-kana names) fall back
/// to `entity-<first 8 hex of id>`.
pub fn base_slug(name: &str, id: Uuid) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        let hex = id.simple().to_string();
        format!("entity-{}", &hex[..8])
    } else {
        slug
    }
}

/// Pick the first of `base`, `base-2`, `base-3`, ... rejected by `taken`
pub fn unique_slug<F>(base: &str, mut taken: F) -> String
where
    F: FnMut(&str) -> bool,
{
    if !taken(base) {
        return base.to_string();
    }
    let mut n = 2u32;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
