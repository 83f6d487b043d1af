
use std::fmt::Write;

/// Builds `?k1=v1&k2=v2` from pairs in the given order. Nothing is escaped.
pub fn build_query<K, V>(pairs: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut query = String::from("?");
    for (i, (key, value)) in pairs.iter().enumerate() {
        if i > 0 {
            query.push('&');
        }
        let _ = write!(query, "{}={}", key.as_ref(), value.as_ref());
    }
    query
}

/// Percent-encodes a value for use in a query string.
pub fn encode_value(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParameters {
    pairs: Vec<(String, String)>,
}

impl QueryParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: &str, value: impl ToString) -> &mut Self {
        self.pairs.push((key.to_owned(), encode_value(&value.to_string())));
        self
    }

    pub fn push_optional<V: ToString>(&mut self, key: &str, value: Option<V>) -> &mut Self {
        if let Some(value) = value {
            self.push(key, value);
        }
        self
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn build(&self) -> String {
        build_query(&self.pairs)
    }
}
