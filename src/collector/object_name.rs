//! MBean ObjectName 및 패턴
//!
//! `domain:key=value,key2="quoted, value"` 형태의 식별자를 파싱합니다.
//! 속성 순서는 원본 문자열의 순서를 그대로 유지합니다.

use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::CollectorError;

use super::parser::CollectResult;

/// Key property grammar.
///
/// Name: non-empty, anything but comma, equals, colon, star or question mark.
/// Value: either a double-quoted string with backslash escapes, or an unquoted
/// (possibly empty) run of anything but comma, equals, colon or quote.
static PROPERTY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^([^,=:*?]+)=("(?:[^\\"]*(?:\\.)?)*"|[^,=:"]*)"#)
        .expect("invalid key property regex")
});

/// 순서가 보존되는 key property 목록
///
/// Behaves like an insertion-ordered map: re-inserting an existing key
/// replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyProperties {
    entries: Vec<(String, String)>,
}

impl KeyProperties {
    /// Create an empty property list
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a property, keeping the original position of an existing key
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Look up a property value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate properties in discovery order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Value of the first property, if any
    pub fn first_value(&self) -> Option<&str> {
        self.entries.first().map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for KeyProperties {
    /// Renders `k1=v1, k2=v2`, the form used inside rule match keys.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for KeyProperties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut props = KeyProperties::new();
        for (k, v) in iter {
            props.insert(k, v);
        }
        props
    }
}

/// Parse a key property list string into ordered pairs.
///
/// Quoted values are kept verbatim, including their surrounding quotes.
/// Parsing stops at the first token that does not fit the grammar; use
/// [`ObjectName::parse`] when the whole string must be valid.
pub fn parse_key_properties(list: &str) -> KeyProperties {
    let mut props = KeyProperties::new();
    let mut rest = list;
    while let Some(caps) = PROPERTY_RE.captures(rest) {
        let (Some(whole), Some(key), Some(value)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            break;
        };
        props.insert(key.as_str(), value.as_str());
        rest = &rest[whole.end()..];
        rest = rest.strip_prefix(',').unwrap_or(rest);
    }
    props
}

/// Tokenized key property list: pairs in order, plus whether a trailing `*`
/// wildcard element was present.
type Tokens = (Vec<(String, String)>, bool);

/// Split a key property list into its tokens, failing on anything left over.
fn tokenize_strict(full: &str, list: &str, allow_wildcard: bool) -> CollectResult<Tokens> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    let mut wildcard = false;
    let mut rest = list;

    while !rest.is_empty() {
        if allow_wildcard && rest == "*" {
            wildcard = true;
            break;
        }
        let caps = PROPERTY_RE.captures(rest).ok_or_else(|| {
            CollectorError::invalid_object_name(
                full,
                format!("malformed key property near '{}'", rest),
            )
        })?;
        let (Some(whole), Some(key), Some(value)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            return Err(CollectorError::invalid_object_name(
                full,
                "malformed key property",
            ));
        };
        if pairs.iter().any(|(k, _)| k == key.as_str()) {
            return Err(CollectorError::invalid_object_name(
                full,
                format!("duplicate key '{}'", key.as_str()),
            ));
        }
        pairs.push((key.as_str().to_string(), value.as_str().to_string()));
        rest = &rest[whole.end()..];
        if rest.is_empty() {
            break;
        }
        rest = rest.strip_prefix(',').ok_or_else(|| {
            CollectorError::invalid_object_name(full, format!("unexpected '{}'", rest))
        })?;
        if rest.is_empty() {
            return Err(CollectorError::invalid_object_name(full, "trailing comma"));
        }
    }

    Ok((pairs, wildcard))
}

/// MBean ObjectName 구조
///
/// Equality, ordering and hashing use the canonical form (properties sorted
/// by key), so `a:x=1,y=2` and `a:y=2,x=1` name the same bean. `Display`
/// returns the identifier exactly as it was given.
#[derive(Debug, Clone)]
pub struct ObjectName {
    /// 도메인 (예: "java.lang")
    domain: String,
    /// 원본 key property 문자열
    key_property_list: String,
    /// key 기준으로 정렬된 속성
    sorted_properties: Vec<(String, String)>,
    /// canonical 문자열
    canonical: String,
}

impl ObjectName {
    /// ObjectName 문자열 파싱
    pub fn parse(s: &str) -> CollectResult<Self> {
        let (domain, list) = s
            .split_once(':')
            .ok_or_else(|| CollectorError::invalid_object_name(s, "missing ':' separator"))?;

        if domain.contains(['*', '?']) {
            return Err(CollectorError::invalid_object_name(
                s,
                "domain wildcards are only allowed in patterns",
            ));
        }
        if list.is_empty() {
            return Err(CollectorError::invalid_object_name(
                s,
                "empty key property list",
            ));
        }

        let (mut pairs, _) = tokenize_strict(s, list, false)?;
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        let canonical_props: Vec<String> =
            pairs.iter().map(|(k, v)| format!("{}={}", k, v)).collect();

        Ok(Self {
            domain: domain.to_string(),
            key_property_list: list.to_string(),
            canonical: format!("{}:{}", domain, canonical_props.join(",")),
            sorted_properties: pairs,
        })
    }

    /// 도메인
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Key property list exactly as given
    pub fn key_property_list(&self) -> &str {
        &self.key_property_list
    }

    /// Canonical name (properties sorted by key)
    pub fn canonical_name(&self) -> &str {
        &self.canonical
    }

    /// Look up a key property without regard to order
    pub fn property(&self, key: &str) -> Option<&str> {
        self.sorted_properties
            .binary_search_by(|(k, _)| k.as_str().cmp(key))
            .ok()
            .map(|i| self.sorted_properties[i].1.as_str())
    }

    fn property_count(&self) -> usize {
        self.sorted_properties.len()
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.domain, self.key_property_list)
    }
}

impl PartialEq for ObjectName {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for ObjectName {}

impl Hash for ObjectName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl PartialOrd for ObjectName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjectName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

impl std::str::FromStr for ObjectName {
    type Err = CollectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Compile a `*`/`?` glob into an anchored regex.
fn glob_regex(glob: &str) -> Result<Regex, regex::Error> {
    let mut re = String::with_capacity(glob.len() + 8);
    re.push('^');
    for c in glob.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            _ => re.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4]))),
        }
    }
    re.push('$');
    Regex::new(&re)
}

#[derive(Debug, Clone)]
enum Matcher {
    Any,
    Exact(String),
    Glob(Regex),
}

impl Matcher {
    fn new(text: &str, allow_glob: bool) -> Self {
        let quoted = text.starts_with('"');
        if allow_glob && !quoted && text == "*" {
            return Matcher::Any;
        }
        if allow_glob && !quoted && text.contains(['*', '?']) {
            // Every non-wildcard character is escaped before compiling.
            if let Ok(re) = glob_regex(text) {
                return Matcher::Glob(re);
            }
        }
        Matcher::Exact(text.to_string())
    }

    fn is_match(&self, candidate: &str) -> bool {
        match self {
            Matcher::Any => true,
            Matcher::Exact(s) => s == candidate,
            Matcher::Glob(re) => re.is_match(candidate),
        }
    }
}

/// ObjectName 패턴 (include/exclude 용)
///
/// Supports domain globs (`*:type=Memory`, `java.*:*`), property list
/// patterns (`java.lang:type=GarbageCollector,*`) and value globs
/// (`java.lang:type=MemoryPool,name=G1*`).
#[derive(Debug, Clone)]
pub struct ObjectNamePattern {
    source: String,
    domain: Matcher,
    properties: Vec<(String, Matcher)>,
    property_list_pattern: bool,
}

impl ObjectNamePattern {
    /// 패턴 문자열 파싱
    pub fn parse(s: &str) -> CollectResult<Self> {
        let (domain, list) = s
            .split_once(':')
            .ok_or_else(|| CollectorError::invalid_object_name(s, "missing ':' separator"))?;

        if list.is_empty() {
            return Err(CollectorError::invalid_object_name(
                s,
                "empty key property list",
            ));
        }

        let (pairs, wildcard) = tokenize_strict(s, list, true)?;
        let properties = pairs
            .into_iter()
            .map(|(k, v)| {
                let matcher = Matcher::new(&v, true);
                (k, matcher)
            })
            .collect();

        let domain = if domain.is_empty() {
            // An empty domain means the default domain of the server.
            Matcher::Any
        } else {
            Matcher::new(domain, true)
        };

        Ok(Self {
            source: s.to_string(),
            domain,
            properties,
            property_list_pattern: wildcard,
        })
    }

    /// Pattern matching every bean
    pub fn all() -> Self {
        Self {
            source: "*:*".to_string(),
            domain: Matcher::Any,
            properties: Vec::new(),
            property_list_pattern: true,
        }
    }

    /// 패턴 원본 문자열
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Check whether the given bean name matches this pattern
    pub fn matches(&self, name: &ObjectName) -> bool {
        if !self.domain.is_match(name.domain()) {
            return false;
        }

        if !self.property_list_pattern && name.property_count() != self.properties.len() {
            return false;
        }

        self.properties.iter().all(|(key, matcher)| {
            name.property(key)
                .map(|value| matcher.is_match(value))
                .unwrap_or(false)
        })
    }
}

impl fmt::Display for ObjectNamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
