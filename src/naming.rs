//! Name derivation for container tables, embedded projects and output files.

use uuid::Uuid;

/// Project name used when nothing usable is left after cleaning.
pub const DEFAULT_PROJECT_NAME: &str = "qgis_project";

pub const MAX_PROJECT_NAME_LEN: usize = 100;
pub const MAX_TABLE_NAME_LEN: usize = 50;

/// Clean a user supplied project name for storage inside a container.
///
/// Keeps letters, digits, `_`, `-` and whitespace, trims, turns whitespace
/// runs into `_` and collapses repeated `_`. Never returns an empty string.
pub fn sanitize_project_name(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect();
    let replaced: String = kept
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    let cleaned = collapse_underscores(&replaced);

    if cleaned.is_empty() {
        return DEFAULT_PROJECT_NAME.to_string();
    }
    cleaned.chars().take(MAX_PROJECT_NAME_LEN).collect()
}

/// Derive a SQL-safe table name from a layer's display name.
///
/// The result always matches `^[A-Za-z_][A-Za-z0-9_]{0,49}$`, and applying
/// the function twice gives the same name as applying it once.
pub fn sanitize_table_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let collapsed = collapse_underscores(&replaced);
    let mut cleaned = collapsed.trim_matches('_').to_string();

    if cleaned.starts_with(|c: char| c.is_ascii_digit()) {
        cleaned.insert(0, '_');
    }
    if cleaned.len() > MAX_TABLE_NAME_LEN {
        // ASCII only at this point, so byte truncation is safe.
        cleaned.truncate(MAX_TABLE_NAME_LEN);
        let trimmed = cleaned.trim_end_matches('_').len();
        cleaned.truncate(trimmed);
    }

    if cleaned.is_empty() {
        return random_table_name();
    }
    cleaned
}

fn random_table_name() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("layer_{}", &hex[..8])
}

/// Default container file stem for a project base name: `GPKG-{name}`.
pub fn default_container_stem(base_name: &str) -> String {
    let base = strip_known_prefixes(base_name);
    let replaced: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = collapse_underscores(&replaced);
    format!("GPKG-{}", cleaned.trim_matches('_'))
}

/// Default embedded project name for a project base name.
pub fn default_project_name(base_name: &str) -> String {
    let base = strip_known_prefixes(base_name);
    let replaced: String = base
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    let cleaned = collapse_underscores(&replaced);
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() {
        DEFAULT_PROJECT_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

// Containers produced earlier are named `GPKG-...`, projects saved by the
// desktop client often start with `QGIS_`; neither belongs in a derived name.
fn strip_known_prefixes(name: &str) -> &str {
    let mut name = name;
    for prefix in ["GPKG-", "QGIS_"] {
        if name.len() >= prefix.len()
            && name.is_char_boundary(prefix.len())
            && name[..prefix.len()].eq_ignore_ascii_case(prefix)
        {
            name = &name[prefix.len()..];
        }
    }
    name
}

fn collapse_underscores(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut previous_underscore = false;
    for c in s.chars() {
        if c == '_' {
            if !previous_underscore {
                out.push(c);
            }
            previous_underscore = true;
        } else {
            out.push(c);
            previous_underscore = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_follow_the_documented_order() {
        assert_eq!(sanitize_table_name("Roads A/B"), "Roads_A_B");
        assert_eq!(sanitize_table_name("  __lakes  (2020) "), "lakes_2020");
        assert_eq!(sanitize_table_name("2020 parcels"), "_2020_parcels");
        assert_eq!(sanitize_table_name("Straße"), "Stra_e");
    }

    #[test]
    fn empty_table_names_get_a_random_token() {
        let name = sanitize_table_name("///");
        assert!(name.starts_with("layer_"));
        assert_eq!(name.len(), "layer_".len() + 8);
        assert!(name["layer_".len()..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(sanitize_table_name(""), sanitize_table_name(""));
    }

    #[test]
    fn long_table_names_do_not_end_with_an_underscore() {
        let name = format!("{}_b", "a".repeat(49));
        assert_eq!(sanitize_table_name(&name), "a".repeat(49));
    }

    #[test]
    fn project_names() {
        assert_eq!(sanitize_project_name("MyMap"), "MyMap");
        assert_eq!(sanitize_project_name("  My   City: 2024 "), "My_City_2024");
        assert_eq!(sanitize_project_name("a - b"), "a_-_b");
        assert_eq!(sanitize_project_name("!!!"), DEFAULT_PROJECT_NAME);
        assert_eq!(sanitize_project_name(&"x".repeat(150)).len(), 100);
    }

    #[test]
    fn defaults_strip_known_prefixes() {
        assert_eq!(default_container_stem("QGIS_city plan"), "GPKG-city_plan");
        assert_eq!(default_container_stem("gpkg-site.v2"), "GPKG-site.v2");
        assert_eq!(default_project_name("GPKG-city plan"), "city_plan");
        assert_eq!(default_project_name("project"), "project");
        assert_eq!(default_project_name("QGIS_"), DEFAULT_PROJECT_NAME);
    }

    mod properties {
        use super::super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn table_name_is_idempotent(input in any::<String>()) {
                let once = sanitize_table_name(&input);
                prop_assert_eq!(sanitize_table_name(&once), once);
            }

            #[test]
            fn table_name_is_a_safe_identifier(input in any::<String>()) {
                let name = sanitize_table_name(&input);
                prop_assert!(!name.is_empty() && name.len() <= MAX_TABLE_NAME_LEN);
                let first = name.chars().next().unwrap_or('0');
                prop_assert!(first.is_ascii_alphabetic() || first == '_');
                prop_assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
            }

            #[test]
            fn project_name_is_bounded_and_clean(input in any::<String>()) {
                let name = sanitize_project_name(&input);
                prop_assert!(!name.is_empty());
                prop_assert!(name.chars().count() <= MAX_PROJECT_NAME_LEN);
                prop_assert!(name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-'));
                prop_assert!(!name.contains("__"));
            }
        }
    }
}
