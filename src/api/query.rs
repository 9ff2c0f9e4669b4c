use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};

use crate::error::IiifError;

/// Characters escaped in query keys and values.
const QUERY_COMPONENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'=')
    .add(b'?');

/// Query argument selecting a page of a multi-page source, counted from 1.
pub const PAGE_ARGUMENT: &str = "page";

/// Ordered key/value pairs from a request's query string.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Query(Vec<(String, String)>);

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Zero-based page index from the `page` argument; the first page when
    /// absent.
    pub fn page_index(&self) -> Result<usize, IiifError> {
        match self.get(PAGE_ARGUMENT) {
            None => Ok(0),
            Some(value) => value
                .parse::<usize>()
                .ok()
                .and_then(|page| page.checked_sub(1))
                .ok_or_else(|| {
                    IiifError::invalid(format!("Invalid page number: {value}"))
                }),
        }
    }
}

fn decode(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

impl From<&str> for Query {
    fn from(s: &str) -> Self {
        let mut query = Query::new();
        for pair in s.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            query.insert(decode(key), decode(value));
        }
        query
    }
}

impl FromStr for Query {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Query::from(s))
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("&")?;
            }
            write!(f, "{}", utf8_percent_encode(key, QUERY_COMPONENT))?;
            if !value.is_empty() {
                write!(f, "={}", utf8_percent_encode(value, QUERY_COMPONENT))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query() {
        let query: Query = "page=2&name=a%20b&flag".parse().unwrap();
        assert_eq!(query.get("page"), Some("2"));
        assert_eq!(query.get("name"), Some("a b"));
        assert_eq!(query.get("flag"), Some(""));
        assert_eq!(query.get("missing"), None);
    }

    #[test]
    fn test_query_from_raw_string() {
        assert_eq!(Query::from(""), Query::new());
        assert_eq!(Query::from("&&"), Query::new());
        let query = Query::from("page=%32&x");
        assert_eq!(query.page_index(), Ok(1));
        assert_eq!(query, "page=2&x".parse::<Query>().unwrap());
    }

    #[test]
    fn test_query_display_is_reparsable() {
        let mut query = Query::new();
        query.insert("a", "x&y=z");
        query.insert("b", "2");
        let text = query.to_string();
        assert_eq!(text, "a=x%26y%3Dz&b=2");
        assert_eq!(text.parse::<Query>().unwrap(), query);
    }

    #[test]
    fn test_page_index() {
        assert_eq!(Query::new().page_index(), Ok(0));
        assert_eq!("page=3".parse::<Query>().unwrap().page_index(), Ok(2));
        assert!("page=0".parse::<Query>().unwrap().page_index().is_err());
        assert!("page=x".parse::<Query>().unwrap().page_index().is_err());
    }
}
