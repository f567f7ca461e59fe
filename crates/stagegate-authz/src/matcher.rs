//! String matching used by policy rules and image selectors.
//!
//! Two dialects live here. [`wildcard_match`] is the RBAC-style matcher used for
//! rule dimensions (`*` matches anything, including `/`). [`glob_match`] is the
//! image-name dialect used by selector name patterns, where a single `*` stops at
//! path separators.

/// Match a rule value against a granted pattern where `*` matches any run of
/// characters.
pub fn wildcard_match(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    let (mut p_idx, mut v_idx) = (0usize, 0usize);
    let (mut star_idx, mut match_idx) = (None, 0usize);
    let pattern_bytes = pattern.as_bytes();
    let value_bytes = value.as_bytes();

    while v_idx < value_bytes.len() {
        if p_idx < pattern_bytes.len() && pattern_bytes[p_idx] == b'*' {
            star_idx = Some(p_idx);
            match_idx = v_idx;
            p_idx += 1;
            continue;
        }

        if p_idx < pattern_bytes.len() && pattern_bytes[p_idx] == value_bytes[v_idx] {
            p_idx += 1;
            v_idx += 1;
            continue;
        }

        if let Some(star) = star_idx {
            p_idx = star + 1;
            match_idx += 1;
            v_idx = match_idx;
            continue;
        }

        return false;
    }

    while p_idx < pattern_bytes.len() && pattern_bytes[p_idx] == b'*' {
        p_idx += 1;
    }

    p_idx == pattern_bytes.len()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GlobToken {
    Literal(u8),
    /// `*`: any run of characters except `/`.
    Segment,
    /// `**`: any run of characters.
    Any,
    /// `#`: one or more ASCII digits.
    Digits,
}

fn tokenize(pattern: &str) -> Vec<GlobToken> {
    let bytes = pattern.as_bytes();
    let mut tokens = Vec::with_capacity(bytes.len());
    let mut idx = 0;
    while idx < bytes.len() {
        match bytes[idx] {
            b'*' if bytes.get(idx + 1) == Some(&b'*') => {
                tokens.push(GlobToken::Any);
                idx += 2;
            }
            b'*' => {
                tokens.push(GlobToken::Segment);
                idx += 1;
            }
            b'#' => {
                tokens.push(GlobToken::Digits);
                idx += 1;
            }
            other => {
                tokens.push(GlobToken::Literal(other));
                idx += 1;
            }
        }
    }
    tokens
}

/// Match an image identity against a name pattern.
///
/// Patterns are literal except for `**` (anything), `*` (anything but `/`) and
/// `#` (one or more digits). An empty pattern never matches.
pub fn glob_match(pattern: &str, value: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    if pattern == value {
        return true;
    }

    let value = value.as_bytes();
    // reachable[j]: the tokens consumed so far can match value[..j].
    let mut reachable = vec![false; value.len() + 1];
    reachable[0] = true;

    for token in tokenize(pattern) {
        let mut next = vec![false; value.len() + 1];
        for start in 0..=value.len() {
            if !reachable[start] {
                continue;
            }
            match token {
                GlobToken::Literal(expected) => {
                    if value.get(start) == Some(&expected) {
                        next[start + 1] = true;
                    }
                }
                GlobToken::Segment => {
                    next[start] = true;
                    let mut end = start;
                    while end < value.len() && value[end] != b'/' {
                        end += 1;
                        next[end] = true;
                    }
                }
                GlobToken::Any => {
                    for slot in next.iter_mut().skip(start) {
                        *slot = true;
                    }
                }
                GlobToken::Digits => {
                    let mut end = start;
                    while end < value.len() && value[end].is_ascii_digit() {
                        end += 1;
                        next[end] = true;
                    }
                }
            }
        }
        if !next.iter().any(|slot| *slot) {
            return false;
        }
        reachable = next;
    }

    reachable[value.len()]
}
