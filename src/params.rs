//! Request parameters
//!
//! Viewer requests carry their options as query parameters. Order matters for
//! transforms (they are applied in request order), so parameters are kept as
//! an ordered list rather than a map.

use url::form_urlencoded;

/// Ordered list of request parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParams {
    pairs: Vec<(String, String)>,
}

impl RequestParams {
    /// Create an empty parameter list
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a URL query string (`a=1&b=2`), percent-decoding keys and values
    ///
    /// Repeated keys keep their first value.
    pub fn from_query(query: &str) -> Self {
        let mut params = Self::new();

        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            if key.is_empty() || params.contains(&key) {
                continue;
            }
            params.pairs.push((key.into_owned(), value.into_owned()));
        }

        params
    }

    /// Append a parameter, builder style
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Append a parameter, replacing an existing value in place
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((key, value)),
        }
    }

    /// Get a parameter value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Get the first present value among `keys`, in priority order
    pub fn get_any(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.get(k))
    }

    /// Whether a parameter is present
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Whether any of `keys` is present with a truthy value
    pub fn flag(&self, keys: &[&str]) -> bool {
        self.get_any(keys).map(flag_enabled).unwrap_or(false)
    }

    /// Parse the first present value among `keys`
    pub fn parse_any<T: std::str::FromStr>(&self, keys: &[&str]) -> Option<T> {
        self.get_any(keys).and_then(|v| v.trim().parse().ok())
    }

    /// Iterate parameters in request order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RequestParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// Interpret a flag value: bare (`?ts`) or starting with `t`, `y` or `1` is on
pub fn flag_enabled(value: &str) -> bool {
    let value = value.trim();
    value.is_empty()
        || matches!(
            value.as_bytes()[0].to_ascii_lowercase(),
            b't' | b'y' | b'1'
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_query_keeps_order() {
        let params = RequestParams::from_query("rotate=90&size=100x100&ts");
        let keys: Vec<&str> = params.iter().map(|(k, _)| k).collect();

        assert_eq!(keys, vec!["rotate", "size", "ts"]);
        assert_eq!(params.get("size"), Some("100x100"));
        assert_eq!(params.get("ts"), Some(""));
    }

    #[test]
    fn test_percent_decoding() {
        let params = RequestParams::from_query("seq=rgb(255%2C0%2C0)&name=a+b&bad=%zz");

        assert_eq!(params.get("seq"), Some("rgb(255,0,0)"));
        assert_eq!(params.get("name"), Some("a b"));
        assert_eq!(params.get("bad"), Some("%zz"));
    }

    #[test]
    fn test_alias_priority() {
        let params = RequestParams::from_query("q=20&quality=80");

        assert_eq!(params.get_any(&["quality", "q"]), Some("80"));
        assert_eq!(params.parse_any::<u32>(&["quality", "q"]), Some(80));
    }

    #[test]
    fn test_flags() {
        let params = RequestParams::from_query("bin=true&ts=false&seq");

        assert!(params.flag(&["bin"]));
        assert!(!params.flag(&["ts"]));
        assert!(params.flag(&["seq"]));
        assert!(!params.flag(&["missing"]));
    }
}
