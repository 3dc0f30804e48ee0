//! # URI Grammar
//!
//! A URI is `namespace/suffix`. This module only deals with the suffix:
//! a `/` separated list of cells drawn from `[0-9A-Za-z-_,().$]`, plus the
//! wildcards `+` (exactly one cell) and `*` (zero or more cells), plus at
//! most one reserved cell prefixed with `!`.
//!
//! | Function | Purpose |
//! |----------|---------|
//! | [`analyze_suffix`] | syntax check, wildcard and `$` detection |
//! | [`restrict_by`] | intersection of two grant patterns |
//! | [`topic_match`] | does a pattern match (or overlap) a topic |

/// Result of [`analyze_suffix`] on a syntactically valid suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SuffixInfo {
    pub has_star: bool,
    pub has_plus: bool,
    pub has_bang: bool,
    /// A cell contains `$` (free, read-only path).
    pub has_dollar: bool,
}

impl SuffixInfo {
    /// True when the suffix contains `+` or `*`.
    pub fn is_wildcard(&self) -> bool {
        self.has_star || self.has_plus
    }
}

fn valid_cell_char(k: u8) -> bool {
    k.is_ascii_alphanumeric() || matches!(k, b'-' | b'_' | b',' | b'(' | b')' | b'.' | b'$')
}

/// Check the suffix grammar. Returns `None` if the suffix is invalid.
pub fn analyze_suffix(suffix: &str) -> Option<SuffixInfo> {
    let mut info = SuffixInfo::default();
    for cell in suffix.split('/') {
        match cell {
            "" | "!" => return None,
            "*" => {
                if info.has_star {
                    return None;
                }
                info.has_star = true;
            }
            "+" => info.has_plus = true,
            _ => {
                let body = match cell.strip_prefix('!') {
                    Some(rest) => {
                        if info.has_bang {
                            return None;
                        }
                        info.has_bang = true;
                        rest
                    }
                    None => cell,
                };
                if !body.bytes().all(valid_cell_char) {
                    return None;
                }
                if body.contains('$') {
                    info.has_dollar = true;
                }
            }
        }
    }
    Some(info)
}

/// Restrict the pattern `from` by the grant pattern `by`.
///
/// Returns the most general pattern permitted by both, or `None` when the
/// two cannot be merged. The merge takes the longest compatible prefix from
/// the left, the longest compatible suffix from the right, and then lets a
/// `*` in one pattern absorb the literal remainder of the other.
pub fn restrict_by(from: &str, by: &str) -> Option<String> {
    let fp: Vec<&str> = from.split('/').collect();
    let bp: Vec<&str> = by.split('/').collect();
    let flen = fp.len() as isize;
    let blen = bp.len() as isize;
    let f = |i: isize| fp[i as usize];
    let b = |i: isize| bp[i as usize];

    let mut fout: Vec<&str> = Vec::with_capacity(fp.len() + bp.len());
    let mut bout: Vec<&str> = Vec::with_capacity(fp.len() + bp.len());

    fn emit<'x>(mut fout: Vec<&'x str>, bout: Vec<&'x str>) -> Option<String> {
        fout.extend(bout.into_iter().rev());
        Some(fout.join("/"))
    }

    // Matching prefix.
    let (mut fi, mut bi) = (0isize, 0isize);
    while fi < flen && bi < blen {
        if f(fi) != "*" && (f(fi) == b(bi) || b(bi) == "+") {
            fout.push(f(fi));
        } else if f(fi) == "+" && b(bi) != "*" {
            fout.push(b(bi));
        } else {
            break;
        }
        fi += 1;
        bi += 1;
    }

    // Matching suffix.
    let (mut fni, mut bni) = (flen - 1, blen - 1);
    while fni >= fi && bni >= bi {
        if b(bni) != "*" && (f(fni) == b(bni) || (b(bni) == "+" && f(fni) != "*")) {
            bout.push(f(fni));
        } else if f(fni) == "+" && b(bni) != "*" {
            bout.push(b(bni));
        } else {
            break;
        }
        fni -= 1;
        bni -= 1;
    }

    // A star on one side absorbs the other side's front remainder.
    if fi < flen && f(fi) == "*" {
        while bi < blen && b(bi) != "*" && bi <= bni {
            fout.push(b(bi));
            bi += 1;
        }
    } else if bi < blen && b(bi) == "*" {
        while fi < flen && f(fi) != "*" && fi <= fni {
            fout.push(f(fi));
            fi += 1;
        }
    }

    // Same for the back remainder.
    if fni >= 0 && f(fni) == "*" {
        while bni >= 0 && b(bni) != "*" && bni >= bi {
            bout.push(b(bni));
            bni -= 1;
        }
    } else if bni >= 0 && b(bni) == "*" {
        while fni >= 0 && f(fni) != "*" && fni >= fi {
            bout.push(f(fni));
            fni -= 1;
        }
    }

    if fi == fni && f(fi) == "*" && bi == bni && b(bi) == "*" {
        fout.push("*");
        return emit(fout, bout);
    }

    if fi < flen && f(fi) == "*" {
        fi += 1;
    }
    if bi < blen && b(bi) == "*" {
        bi += 1;
    }
    if (fi == fni + 1 || fi == flen) && (bi == bni + 1 || bi == blen) {
        return emit(fout, bout);
    }
    None
}

/// Split a suffix into cells.
pub fn split_cells(suffix: &str) -> Vec<&str> {
    suffix.split('/').collect()
}

/// Does `pattern` match `topic`?
///
/// `+` matches exactly one cell and `*` matches zero or more. Because a
/// literal `+` or `*` in `topic` is compared like any other cell, the same
/// predicate also answers whether two patterns overlap.
pub fn topic_match(topic: &[&str], pattern: &[&str]) -> bool {
    match (topic.first(), pattern.first()) {
        (None, None) => true,
        (None, Some(&"*")) => topic_match(topic, &pattern[1..]),
        (None, Some(_)) | (Some(_), None) => false,
        (Some(t), Some(p)) => {
            if *p == "*" {
                (0..=topic.len()).any(|i| topic_match(&topic[i..], &pattern[1..]))
            } else if t == p || *p == "+" {
                topic_match(&topic[1..], &pattern[1..])
            } else {
                false
            }
        }
    }
}

/// Convenience wrapper over [`topic_match`] for `/` separated strings.
pub fn topic_match_str(topic: &str, pattern: &str) -> bool {
    topic_match(&split_cells(topic), &split_cells(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_valid_suffixes() {
        let info = analyze_suffix("a/b/c").unwrap();
        assert!(!info.is_wildcard());
        let info = analyze_suffix("a/+/c/*").unwrap();
        assert!(info.has_star && info.has_plus);
        let info = analyze_suffix("a/!meta/x").unwrap();
        assert!(info.has_bang);
        let info = analyze_suffix("a/*/$/*");
        assert!(info.is_none(), "two stars are rejected");
        let info = analyze_suffix("pub/$/x").unwrap();
        assert!(info.has_dollar);
    }

    #[test]
    fn test_analyze_rejects_bad_suffixes() {
        assert!(analyze_suffix("").is_none());
        assert!(analyze_suffix("/a").is_none());
        assert!(analyze_suffix("a/").is_none());
        assert!(analyze_suffix("a//b").is_none());
        assert!(analyze_suffix("a/!").is_none());
        assert!(analyze_suffix("!a/!b").is_none());
        assert!(analyze_suffix("a b").is_none());
        assert!(analyze_suffix("a/é").is_none());
    }

    #[test]
    fn test_topic_match_vectors() {
        assert!(topic_match_str("a/b/c", "a/b/c"));
        assert!(topic_match_str("a/b/c", "a/+/c"));
        assert!(!topic_match_str("a/b/c", "a/+/+/c"));
        assert!(topic_match_str("a/b/c", "a/*/c"));
        assert!(topic_match_str("a/c", "a/*/c"));
        assert!(topic_match_str("a/b/d/e/c", "a/*/c"));
        assert!(!topic_match_str("a/b/d/e/d", "a/*/c/d"));
    }

    #[test]
    fn test_topic_match_trailing_star() {
        assert!(topic_match_str("a/b", "a/b/*"));
        assert!(topic_match_str("a/b/c/d", "a/*"));
        assert!(!topic_match_str("b/c", "a/*"));
    }

    #[test]
    fn test_restrict_vectors() {
        assert_eq!(restrict_by("a/b/c", "a/b/c").as_deref(), Some("a/b/c"));
        assert_eq!(restrict_by("a/*", "a/b/c").as_deref(), Some("a/b/c"));
        assert_eq!(restrict_by("a/b/c", "*/c").as_deref(), Some("a/b/c"));
        assert_eq!(
            restrict_by("a/b/*/c/d", "a/b/x/*/y/c/d").as_deref(),
            Some("a/b/x/*/y/c/d")
        );
        assert_eq!(restrict_by("a/+/c", "a/b/c").as_deref(), Some("a/b/c"));
        assert_eq!(restrict_by("a/b/c", "a/b/d"), None);
        assert_eq!(restrict_by("a/b/c", "a/b/c/*/x/y/z"), None);
    }

    #[test]
    fn test_restrict_is_commutative_on_success() {
        let pairs = [
            ("a/*", "a/b/c"),
            ("a/+/c", "a/b/c"),
            ("a/b/*", "a/*"),
            ("*", "a/b"),
            ("a/*/z", "a/b/*"),
        ];
        for (x, y) in pairs {
            let l = restrict_by(x, y);
            let r = restrict_by(y, x);
            if let (Some(l), Some(r)) = (&l, &r) {
                assert_eq!(l, r, "restrict({x},{y})");
            }
        }
    }

    #[test]
    fn test_restrict_result_is_subsumed() {
        let (a, b) = ("a/+/c", "a/b/+");
        let c = restrict_by(a, b).unwrap();
        for t in ["a/b/c", "a/x/c", "a/b/d", "a/b/c/d"] {
            if topic_match_str(t, &c) {
                assert!(topic_match_str(t, a) && topic_match_str(t, b));
            }
        }
    }

    #[test]
    fn test_restrict_output_borrows_both_inputs() {
        let from = String::from("x/+/*");
        let by = String::from("x/y/z/w");
        let merged = restrict_by(&from, &by);
        drop((from, by));
        assert_eq!(merged.as_deref(), Some("x/y/z/w"));
        assert_eq!(restrict_by("+/*/+", "x/*/z").as_deref(), Some("x/*/z"));
    }

    #[test]
    fn test_restrict_both_star() {
        assert_eq!(restrict_by("a/*", "a/*").as_deref(), Some("a/*"));
        assert_eq!(restrict_by("*", "*").as_deref(), Some("*"));
    }
}
