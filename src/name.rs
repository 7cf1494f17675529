// Copyright (c) 2018 Fabian Schuiki

//! Character classes of XML names.

/// Check whether a character may start a name.
pub fn is_name_start(c: char) -> bool {
    match c {
        'A'..='Z' | 'a'..='z' | '_' | ':' => true,
        c => c as u32 >= 0x80 && !c.is_whitespace(),
    }
}

/// Check whether a character may appear after the first character of a name.
pub fn is_name_char(c: char) -> bool {
    is_name_start(c) || c.is_ascii_digit() || c == '-' || c == '.'
}

/// Check whether a string is a syntactically valid name.
pub fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if is_name_start(c) => chars.all(is_name_char),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert!(is_name("foo"));
        assert!(is_name("x.y-z:w_1"));
        assert!(is_name("_hidden"));
        assert!(is_name("été"));
        assert!(!is_name(""));
        assert!(!is_name("1abc"));
        assert!(!is_name("off "));
        assert!(!is_name("-x"));
    }
}
