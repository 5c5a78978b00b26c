//! Test identifiers and their hierarchical segments.

/// Build the canonical `<location>/<name>` identifier of a test.
pub fn test_ident(test_location: &str, test_name: &str) -> String {
    format!("{test_location}/{test_name}")
}

/// Split a slash-delimited test identifier into its namespace segments.
///
/// A `/` between a `[` and the next `]` belongs to a parameter suffix and is
/// not a split point, so `a/b[c/d]/e` yields `["a", "b[c/d]", "e"]`. A `[`
/// with no closing `]` after it is plain text. Leading slashes are stripped
/// and empty segments are dropped.
pub fn segment(path: &str) -> Vec<String> {
    let path = path.trim_start_matches('/');
    let bytes = path.as_bytes();
    let mut segments = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'[' => {
                if let Some(offset) = path[i + 1..].find(']') {
                    // Jump past the closing bracket.
                    i += offset + 2;
                    continue;
                }
            }
            b'/' => {
                push_segment(&mut segments, &path[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    push_segment(&mut segments, &path[start..]);

    segments
}

fn push_segment(segments: &mut Vec<String>, segment: &str) {
    if !segment.is_empty() {
        segments.push(segment.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_split() {
        assert_eq!(segment("a/b/c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_slash_inside_params_is_opaque() {
        assert_eq!(segment("a/b[c/d]/e"), vec!["a", "b[c/d]", "e"]);
        assert_eq!(
            segment("mod/test_foo[param/with/slashes]"),
            vec!["mod", "test_foo[param/with/slashes]"]
        );
    }

    #[test]
    fn test_brackets_closed_before_slash() {
        assert_eq!(segment("pkg/test_x[1]/sub"), vec!["pkg", "test_x[1]", "sub"]);
        assert_eq!(segment("t[a]/t[b/c]"), vec!["t[a]", "t[b/c]"]);
    }

    #[test]
    fn test_leading_slash_and_empty_path() {
        assert_eq!(segment("/a/b"), vec!["a", "b"]);
        assert_eq!(segment("///a"), vec!["a"]);
        assert!(segment("").is_empty());
        assert!(segment("/").is_empty());
    }

    #[test]
    fn test_unmatched_bracket_is_literal() {
        assert_eq!(segment("a/b[c/d"), vec!["a", "b[c", "d"]);
        assert_eq!(segment("a]/b"), vec!["a]", "b"]);
    }

    #[test]
    fn test_empty_segments_are_dropped() {
        assert_eq!(segment("a//b/"), vec!["a", "b"]);
    }

    #[test]
    fn test_non_ascii_segments() {
        assert_eq!(segment("módulo/tést[ü/ß]"), vec!["módulo", "tést[ü/ß]"]);
    }

    #[test]
    fn test_ident_round_trips_to_segments() {
        let ident = test_ident("mod", "t1[p1]");
        assert_eq!(ident, "mod/t1[p1]");
        assert_eq!(segment(&ident).pop().as_deref(), Some("t1[p1]"));
        assert!(segment("").is_empty());
    }
}
