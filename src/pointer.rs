//! JSON pointer (RFC 6901) helpers for pointers that are stored as plain strings.
//!
//! Encoding and token splitting are done by [`jsonptr`](json_patch::jsonptr).

use json_patch::jsonptr::{Pointer, PointerBuf};
use percent_encoding::percent_decode_str;

/// Parse `pointer`. `"/"` is read as the root, like `""`.
pub fn parse(pointer: &str) -> Option<&Pointer> {
    match pointer {
        "/" => Some(Pointer::root()),
        _ => Pointer::parse(pointer).ok(),
    }
}

/// Split a pointer into its unescaped tokens, or `None` if it is malformed.
pub fn decode(pointer: &str) -> Option<Vec<String>> {
    let tokens = parse(pointer)?
        .tokens()
        .map(|token| token.decoded().into_owned())
        .collect();
    Some(tokens)
}

/// Decode a pointer taken from a URI fragment (`#/paths/~1pets~1%7Bid%7D`).
pub fn decode_fragment(fragment: &str) -> Option<Vec<String>> {
    let fragment = fragment.strip_prefix('#').unwrap_or(fragment);
    decode(&percent_decode_str(fragment).decode_utf8_lossy())
}

/// Build a pointer from unescaped tokens.
pub fn compile<S: AsRef<str>>(segments: &[S]) -> String {
    PointerBuf::from_tokens(segments.iter().map(|s| AsRef::<str>::as_ref(s))).to_string()
}

/// Append unescaped tokens to a pointer.
pub fn append<S: AsRef<str>>(pointer: &str, segments: &[S]) -> String {
    let Some(base) = parse(pointer) else {
        return format!("{pointer}{}", compile(segments));
    };
    let mut buf = base.to_buf();
    for segment in segments {
        buf.push_back(AsRef::<str>::as_ref(segment));
    }
    buf.to_string()
}

/// Join a pointer relative to `base` onto it.
pub fn join(base: &str, relative: &str) -> String {
    match (parse(base), parse(relative)) {
        (Some(base), Some(relative)) => base.concat(relative).to_string(),
        _ => format!("{base}{relative}"),
    }
}

/// The last token of a pointer, if any.
pub fn last(pointer: &str) -> Option<String> {
    parse(pointer)?
        .back()
        .map(|token| token.decoded().into_owned())
}

/// Drop the last `n` tokens of a pointer.
pub fn parent(pointer: &str, n: usize) -> String {
    let mut current = parse(pointer).unwrap_or(Pointer::root());
    for _ in 0..n {
        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }
    current.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escaping() {
        assert_eq!(compile(&["paths", "/pets/{id}", "get"]), "/paths/~1pets~1{id}/get");
        assert_eq!(decode("/paths/~1pets~1{id}/get").unwrap()[1], "/pets/{id}");
        assert_eq!(decode("/a~0b").unwrap(), vec!["a~b"]);
    }

    #[test]
    fn malformed_pointers() {
        assert!(decode("no-slash").is_none());
        assert!(decode("/bad~2escape").is_none());
        assert!(last("no-slash").is_none());
    }

    #[test]
    fn roots() {
        assert!(decode("").unwrap().is_empty());
        assert!(decode("/").unwrap().is_empty());
        assert_eq!(append("/", &["a"]), "/a");
        assert_eq!(append("", &["a~b", "c/d"]), "/a~0b/c~1d");
        assert_eq!(join("/a", "/"), "/a");
        assert_eq!(join("/a", "/b/c"), "/a/b/c");
        assert_eq!(join("", "/b"), "/b");
    }

    #[test]
    fn fragments_are_percent_decoded() {
        assert_eq!(
            decode_fragment("#/paths/~1pets~1%7Bid%7D").unwrap(),
            vec!["paths", "/pets/{id}"]
        );
        assert!(decode_fragment("#").unwrap().is_empty());
    }

    #[test]
    fn parents() {
        assert_eq!(parent("/properties/a/type", 1), "/properties/a");
        assert_eq!(parent("/type", 3), "");
        assert_eq!(last("/properties/a").as_deref(), Some("a"));
        assert_eq!(last("/paths/~1pets").as_deref(), Some("/pets"));
    }
}
