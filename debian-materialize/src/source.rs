// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! APT source lines and index discovery.

A source line has the form `deb <base-url> <distribution> <component>...`,
the value that appears in apt sources files. Each component of each line
contributes one `Packages.gz` index location.
*/

use std::collections::BTreeSet;

/// Location of one `Packages.gz` index.
///
/// The base URL is carried alongside because artifact URLs are formed by
/// joining it with each record's repo-relative `Filename`.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct IndexLocation {
    pub base_url: String,
    pub index_url: String,
}

/// Resolve source lines into the set of index locations to fetch.
///
/// Lines whose first token is not the literal `deb` are skipped, as are
/// lines missing a base URL or distribution. Tolerant parsing is
/// deliberate: sources lists in the wild carry comments, `deb-src` lines,
/// and other noise. The result is ordered and de-duplicated.
pub fn discover_indices(
    sources: impl IntoIterator<Item = impl AsRef<str>>,
    architecture: &str,
) -> BTreeSet<IndexLocation> {
    let mut result = BTreeSet::new();

    for line in sources {
        let mut tokens = line.as_ref().split_whitespace();

        if tokens.next() != Some("deb") {
            continue;
        }

        let base_url = match tokens.next() {
            Some(url) => url.trim_end_matches('/'),
            None => continue,
        };
        let distribution = match tokens.next() {
            Some(distribution) => distribution,
            None => continue,
        };

        for component in tokens {
            result.insert(IndexLocation {
                base_url: base_url.to_string(),
                index_url: format!(
                    "{}/dists/{}/{}/{}/Packages.gz",
                    base_url, distribution, component, architecture
                ),
            });
        }
    }

    result
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn single_component_line() {
        let indices = discover_indices(
            ["deb http://example.test/repo jammy main"],
            "binary-amd64",
        );

        assert_eq!(indices.len(), 1);
        let location = indices.iter().next().unwrap();
        assert_eq!(location.base_url, "http://example.test/repo");
        assert_eq!(
            location.index_url,
            "http://example.test/repo/dists/jammy/main/binary-amd64/Packages.gz"
        );
    }

    #[test]
    fn one_index_per_component() {
        let indices = discover_indices(["deb http://a jammy main universe"], "binary-amd64");

        let urls = indices
            .iter()
            .map(|l| l.index_url.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            urls,
            vec![
                "http://a/dists/jammy/main/binary-amd64/Packages.gz",
                "http://a/dists/jammy/universe/binary-amd64/Packages.gz",
            ]
        );
    }

    #[test]
    fn non_deb_lines_are_skipped() {
        let indices = discover_indices(
            [
                "deb-src http://a jammy main",
                "# deb http://a jammy main",
                "deb http://a",
                "deb http://a jammy",
            ],
            "binary-amd64",
        );

        assert!(indices.is_empty());
    }

    #[test]
    fn duplicate_lines_collapse() {
        let indices = discover_indices(
            [
                "deb http://a jammy main",
                "deb http://a jammy main",
                "deb http://a/ jammy main",
            ],
            "binary-amd64",
        );

        assert_eq!(indices.len(), 1);
    }

    #[test]
    fn trailing_slash_is_normalized() {
        let indices = discover_indices(["deb http://a/ubuntu/ jammy main"], "binary-amd64");

        assert_eq!(indices.iter().next().unwrap().base_url, "http://a/ubuntu");
    }
}
