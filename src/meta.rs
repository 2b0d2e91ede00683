//! Listing parameters parsed from a query string: `limit`, `skip` and
//! repeatable `filter=<name>,<comparator>,<value>` triples.

use std::str::FromStr;

use axum::http::Request;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterComparator {
    Equal,
    Less,
    Greater,
}

impl FilterComparator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterComparator::Equal => "eq",
            FilterComparator::Less => "ls",
            FilterComparator::Greater => "gt",
        }
    }
}

impl FromStr for FilterComparator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "eq" => Ok(FilterComparator::Equal),
            "ls" => Ok(FilterComparator::Less),
            "gt" => Ok(FilterComparator::Greater),
            other => Err(Error::validation(format!(
                "unknown filter comparator {other:?}, expected eq, ls or gt"
            ))),
        }
    }
}

/// A single field comparison requested by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub name: String,
    pub comparator: FilterComparator,
    pub value: String,
}

impl FromStr for Filter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() != 3 {
            return Err(Error::validation(format!(
                "filter must be <name>,<comparator>,<value>, got {s:?}"
            )));
        }
        Ok(Filter {
            name: parts[0].to_string(),
            comparator: parts[1].parse()?,
            value: parts[2].to_string(),
        })
    }
}

/// Pagination and filtering options for list endpoints. `limit == 0` means
/// unbounded; applying the window is the endpoint's business.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Meta {
    pub limit: usize,
    pub skip: usize,
    pub filters: Vec<Filter>,
}

impl Meta {
    pub fn from_request<B>(req: &Request<B>) -> Result<Self> {
        Self::from_query(req.uri().query().unwrap_or(""))
    }

    /// Parse a raw (still percent-encoded) query string. Unknown keys are
    /// ignored; malformed values for known keys are validation errors.
    pub fn from_query(query: &str) -> Result<Self> {
        let mut meta = Meta::default();
        for pair in query.split('&') {
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = decode(key)?;
            let value = decode(value)?;
            match key.as_str() {
                "limit" => meta.limit = parse_count("limit", &value)?,
                "skip" => meta.skip = parse_count("skip", &value)?,
                "filter" => meta.filters.push(value.parse()?),
                _ => {}
            }
        }
        Ok(meta)
    }
}

fn parse_count(key: &str, value: &str) -> Result<usize> {
    value.parse::<usize>().map_err(|_| {
        Error::validation(format!(
            "{key} must be a non-negative integer, got {value:?}"
        ))
    })
}

fn decode(part: &str) -> Result<String> {
    // Form encoding: '+' is a space; a literal plus arrives as %2B and is
    // only restored by the percent pass afterwards.
    let part = part.replace('+', " ");
    urlencoding::decode(&part)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| Error::validation(format!("malformed percent-encoding in {part:?}")))
}
