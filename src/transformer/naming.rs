//! Metric and label name sanitizing
//!
//! Both functions are total. Absent input is modelled with `Option::map`
//! at the call site.

/// Characters allowed in a metric name
fn is_legal(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == ':'
}

/// Convert an arbitrary string into a valid metric or label name.
///
/// Illegal characters become `_`, runs of `_` collapse into one, and a `_` is
/// prepended when the result would not start with a letter or underscore.
///
/// ```
/// use jmx_bridge::transformer::naming::to_safe_name;
///
/// assert_eq!(to_safe_name("java.lang:type=Memory"), "java_lang:type_Memory");
/// assert_eq!(to_safe_name("1st"), "_1st");
/// ```
pub fn to_safe_name(name: &str) -> String {
    let mut safe = String::with_capacity(name.len() + 1);
    let mut prev_underscore = false;

    for c in name.chars() {
        if !is_legal(c) || c == '_' {
            if !prev_underscore {
                safe.push('_');
                prev_underscore = true;
            }
        } else {
            safe.push(c);
            prev_underscore = false;
        }
    }

    match safe.chars().next() {
        Some(first) if !(first.is_ascii_alphabetic() || first == '_') => safe.insert(0, '_'),
        _ => {}
    }
    safe
}

/// Convert a camelCase name to lower snake_case.
///
/// An `_` is inserted before every uppercase letter that follows a lowercase
/// letter or digit. Non-ASCII characters are dropped.
///
/// ```
/// use jmx_bridge::transformer::naming::to_snake_lower_case;
///
/// assert_eq!(to_snake_lower_case("testTest"), "test_test");
/// assert_eq!(to_snake_lower_case("TCP"), "tcp");
/// ```
pub fn to_snake_lower_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev: Option<char> = None;

    for c in name.chars().filter(char::is_ascii) {
        if c.is_ascii_uppercase()
            && prev.is_some_and(|p| p.is_ascii_lowercase() || p.is_ascii_digit())
        {
            out.push('_');
        }
        out.push(c.to_ascii_lowercase());
        prev = Some(c);
    }
    out
}
