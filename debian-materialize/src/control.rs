// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Control file field extraction.

`control` members and `Packages` records share the same RFC-822-style field
syntax. Fields here are pulled with line-anchored regular expressions rather
than a full paragraph parser: resolution only ever needs a handful of simple
fields, and the relationship fields (`Depends`, `Provides`, `Source`) reduce
to bare package names once version constraints and architecture qualifiers
are stripped.
*/

use {once_cell::sync::Lazy, regex::Regex, std::collections::BTreeSet};

/// Matches the parts of a dependency atom that do not belong to the name:
/// whitespace, a parenthesized version constraint, an architecture qualifier.
static ATOM_STRIP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\s+)|(?:\(.*\))|(?::.*)").expect("static pattern"));

/// Obtain the raw value of a named field within control file text.
///
/// Returns the first match. Field names are compiled into the pattern per
/// call, which keeps this free of process-wide caches.
pub fn field_value<'a>(text: &'a str, field: &str) -> Option<&'a str> {
    let pattern = Regex::new(&format!(r"{}: ?([^\r\n]*)", regex::escape(field))).ok()?;

    pattern
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
}

/// Parse a relationship field value into bare package names.
///
/// `,` and `|` are treated as equivalent separators: any alternative
/// satisfies the dependency, and this resolver does not solve versions, so
/// every named package is a candidate. Version constraints `(...)` and
/// architecture qualifiers `:...` are discarded.
pub fn dependency_names(value: &str) -> BTreeSet<String> {
    value
        .split(|c| c == ',' || c == '|')
        .map(|atom| ATOM_STRIP.replace_all(atom, "").into_owned())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Extract a relationship field and parse it into bare package names.
///
/// An absent field yields the empty set.
pub fn field_names(text: &str, field: &str) -> BTreeSet<String> {
    field_value(text, field)
        .map(dependency_names)
        .unwrap_or_default()
}

#[cfg(test)]
mod test {
    use {super::*, indoc::indoc};

    const CONTROL: &str = indoc! {"
        Package: hello
        Version: 1.0-1
        Architecture: amd64
        Depends: libc6 (>= 2.34), libgcc-s1 | libgcc1
        Description: example package
    "};

    #[test]
    fn field_value_extracts_single_line() {
        assert_eq!(field_value(CONTROL, "Package"), Some("hello"));
        assert_eq!(field_value(CONTROL, "Version"), Some("1.0-1"));
        assert_eq!(field_value(CONTROL, "Homepage"), None);
    }

    #[test]
    fn dependency_atoms_are_normalized() {
        let names = field_names(CONTROL, "Depends");

        assert_eq!(
            names.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            vec!["libc6", "libgcc-s1", "libgcc1"]
        );
    }

    #[test]
    fn architecture_qualifiers_are_stripped() {
        let names = dependency_names("gcc:native, libfoo:any (>= 1.2)");

        assert_eq!(
            names.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            vec!["gcc", "libfoo"]
        );
    }

    #[test]
    fn empty_atoms_are_dropped() {
        let names = dependency_names("liba, , libb,");

        assert_eq!(
            names.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            vec!["liba", "libb"]
        );
    }

    #[test]
    fn absent_field_yields_empty_set() {
        assert!(field_names(CONTROL, "Provides").is_empty());
    }
}
