// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `Packages` index parsing.

A `Packages` index lists every binary package in one
`(suite, component, architecture)` triple as blank-line-separated records.
Resolution needs three things from each record: the names it can satisfy
(real, virtual, and source names), and the URL of its `.deb`.
*/

use {
    crate::control,
    once_cell::sync::Lazy,
    regex::Regex,
    std::collections::BTreeSet,
};

static PACKAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Package:\s?([^\r\n]*)").expect("static pattern"));
static FILENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Filename:\s?([^\r\n]*)").expect("static pattern"));

/// One record of a `Packages` index, reduced to what resolution needs.
#[derive(Clone, Debug)]
pub struct PackageRecord {
    /// Every name this record can satisfy: the package name itself, its
    /// `Provides` entries, and its `Source` name.
    pub names: BTreeSet<String>,

    /// Absolute URL of the `.deb` artifact.
    pub artifact_url: String,
}

/// Parse decompressed `Packages` text into records.
///
/// Records lacking a `Package` or `Filename` field are skipped. Artifact
/// URLs are formed by joining `base_url` with the record's repo-relative
/// `Filename`.
pub fn parse_packages_index(base_url: &str, text: &str) -> Vec<PackageRecord> {
    text.split("\n\n")
        .filter_map(|record| parse_record(base_url, record))
        .collect()
}

fn parse_record(base_url: &str, record: &str) -> Option<PackageRecord> {
    let package = PACKAGE.captures(record)?.get(1)?.as_str();
    let filename = FILENAME.captures(record)?.get(1)?.as_str();

    let mut names = control::field_names(record, "Provides");
    names.extend(control::field_names(record, "Source"));
    names.insert(package.to_string());

    Some(PackageRecord {
        names,
        artifact_url: format!("{}/{}", base_url, filename),
    })
}

#[cfg(test)]
mod test {
    use {super::*, indoc::indoc};

    const INDEX: &str = indoc! {"
        Package: hello
        Version: 1.0-1
        Filename: pool/main/h/hello/hello_1.0_amd64.deb
        Depends: libc6 (>= 2.34), libgcc-s1 | libgcc1

        Package: incomplete-no-filename
        Version: 0.1

        Package: awk-impl
        Source: mawk (1.3.4)
        Provides: awk, mawk-like
        Filename: pool/main/m/mawk/awk-impl_1.3_amd64.deb
    "};

    #[test]
    fn parses_records_and_joins_urls() {
        let records = parse_packages_index("http://a", INDEX);

        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].artifact_url,
            "http://a/pool/main/h/hello/hello_1.0_amd64.deb"
        );
        assert_eq!(
            records[0].names.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            vec!["hello"]
        );
    }

    #[test]
    fn records_missing_required_fields_are_skipped() {
        let records = parse_packages_index("http://a", INDEX);

        assert!(records
            .iter()
            .all(|r| !r.names.contains("incomplete-no-filename")));
    }

    #[test]
    fn provides_and_source_names_are_registered() {
        let records = parse_packages_index("http://a", INDEX);

        let names = records[1].names.iter().map(|s| s.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["awk", "awk-impl", "mawk", "mawk-like"]);
    }
}
