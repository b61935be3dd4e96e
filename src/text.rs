//! Byte-level text utilities for the diagnostics endpoints: argument
//! hygiene for subprocess invocation, JSON string escaping for raw tool
//! output, and query-string access.

/// The alphabet accepted for manual-page and package names. Anything
/// outside it is replaced by `_`, which makes `sanitize` idempotent.
#[inline]
pub(crate) fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'+' | b'-')
}

pub(crate) fn sanitize(s: &str) -> String {
    s.bytes()
        .map(|b| if is_name_byte(b) { b as char } else { '_' })
        .collect()
}

/// True when the whole string is inside the name alphabet (and non-empty):
/// exactly the strings `sanitize` leaves untouched.
pub(crate) fn is_clean_name(s: &str) -> bool {
    !s.is_empty() && sanitize(s) == s
}

/// Manual section tokens are short and purely alphanumeric ("1", "3p", "8").
pub(crate) fn is_section_token(s: &str) -> bool {
    !s.is_empty() && s.len() <= 8 && s.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Absolute paths accepted by the package `which` endpoint: must start
/// with `/`, stay in the name alphabet plus `/`, and never climb.
pub(crate) fn is_clean_abs_path(s: &str) -> bool {
    s.starts_with('/')
        && !s.contains("..")
        && !s.contains("//")
        && s.bytes().all(|b| b == b'/' || is_name_byte(b))
}

// JSON STRING ESCAPING
//
// Raw subprocess output (mandoc, pkg_info, apropos) is spliced into JSON
// string values without building a serde document around every line.

pub(crate) fn json_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

/// Inverse of [`json_escape`] for the short escapes. Returns `None` on a
/// dangling backslash or an escape outside the supported set.
#[allow(dead_code)]
pub(crate) fn json_unescape(s: &str) -> Option<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            '"' => out.push('"'),
            '\\' => out.push('\\'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0c}'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            _ => return None,
        }
    }
    Some(out)
}

// QUERY STRINGS

/// First value for `key` in an `a=1&b=2` query string. A key without `=`
/// yields the empty string; later duplicates are ignored.
pub(crate) fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    for pair in query.split('&') {
        match pair.split_once('=') {
            Some((name, value)) if name == key => return Some(value),
            None if pair == key => return Some(""),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod sanitize_tests {
    use super::*;

    #[test]
    fn maps_outside_alphabet_to_underscore() {
        #[rustfmt::skip]
        let cases = [
            ("ls",              "ls"),
            ("libc++",          "libc++"),
            ("gtk+3.0",         "gtk+3.0"),
            ("a b;c",           "a_b_c"),
            ("../etc/passwd",   ".._etc_passwd"),
            ("$(reboot)",       "__reboot_"),
            ("",                ""),
        ];

        for (input, expected) in cases {
            assert_eq!(sanitize(input), expected, "input {input:?}");
        }
    }

    #[test]
    fn idempotent() {
        for s in ["ls", "a b;c", "$(x)|y", "päge", "väx-1.2_ok"] {
            let once = sanitize(s);
            assert_eq!(sanitize(&once), once, "input {s:?}");
        }
    }

    #[test]
    fn name_and_section_predicates() {
        assert!(is_clean_name("mandoc-1.14.6"));
        assert!(!is_clean_name("rm -rf"));
        assert!(!is_clean_name(""));

        assert!(is_section_token("1"));
        assert!(is_section_token("3p"));
        assert!(!is_section_token("3/p"));
        assert!(!is_section_token("123456789"));
        assert!(!is_section_token(""));
    }

    #[test]
    fn abs_path_predicate() {
        assert!(is_clean_abs_path("/usr/bin/ls"));
        assert!(!is_clean_abs_path("usr/bin/ls"));
        assert!(!is_clean_abs_path("/usr/../etc"));
        assert!(!is_clean_abs_path("/usr//bin"));
        assert!(!is_clean_abs_path("/usr/bin/$(x)"));
    }
}

#[cfg(test)]
mod json_escape_tests {
    use super::*;

    #[test]
    fn escapes() {
        #[rustfmt::skip]
        let cases = [
            ("plain",        "plain"),
            ("say \"hi\"",   "say \\\"hi\\\""),
            ("a\\b",         "a\\\\b"),
            ("line\nbreak",  "line\\nbreak"),
            ("tab\there",    "tab\\there"),
            ("cr\rlf\n",     "cr\\rlf\\n"),
            ("\u{08}\u{0c}", "\\b\\f"),
            ("\u{01}",       "\\u0001"),
        ];

        for (input, expected) in cases {
            assert_eq!(json_escape(input), expected, "input {input:?}");
        }
    }

    #[test]
    fn unescape_round_trip() {
        // escape(unescape(s)) == s over the supported escape subset.
        for s in [
            "\\\"", "\\\\", "\\b", "\\f", "\\n", "\\r", "\\t",
            "mix \\\"a\\\\b\\n\\t end",
        ] {
            let decoded = json_unescape(s).unwrap();
            assert_eq!(json_escape(&decoded), s, "input {s:?}");
        }
    }

    #[test]
    fn unescape_rejects_bad_input() {
        assert_eq!(json_unescape("dangling\\"), None);
        assert_eq!(json_unescape("\\q"), None);
    }
}
