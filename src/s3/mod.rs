// S3 protocol module: operation classification, request signing and
// listing responses.

use http::Method;
use std::fmt;

pub mod listing;
pub mod signing;

/// The S3 operation a request performs, as far as the inbox cares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum S3Operation {
    MakeBucket,
    RemoveBucket,
    List,
    Put,
    Get,
    Delete,
    AbortMultipart,
    Policy,
    Other,
}

impl S3Operation {
    pub const ALL: [S3Operation; 9] = [
        S3Operation::MakeBucket,
        S3Operation::RemoveBucket,
        S3Operation::List,
        S3Operation::Put,
        S3Operation::Get,
        S3Operation::Delete,
        S3Operation::AbortMultipart,
        S3Operation::Policy,
        S3Operation::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            S3Operation::MakeBucket => "MakeBucket",
            S3Operation::RemoveBucket => "RemoveBucket",
            S3Operation::List => "List",
            S3Operation::Put => "Put",
            S3Operation::Get => "Get",
            S3Operation::Delete => "Delete",
            S3Operation::AbortMultipart => "AbortMultipart",
            S3Operation::Policy => "Policy",
            S3Operation::Other => "Other",
        }
    }
}

impl fmt::Display for S3Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The request target as sent by the client: path, plus `?query` when the
/// query is non-empty.
pub fn request_target(path: &str, query: Option<&str>) -> String {
    match query {
        Some(q) if !q.is_empty() => format!("{}?{}", path, q),
        _ => path.to_string(),
    }
}

/// Iterate `(name, raw value)` pairs of a raw query string
pub fn query_pairs(query: &str) -> impl Iterator<Item = (&str, &str)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
}

/// Decode one query name or value the way the backend does: `+` is a space,
/// then percent-decoding. Invalid UTF-8 is kept raw.
pub fn decode_query_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(spaced)
}

/// True when the query carries a parameter whose decoded name is `name`
pub fn has_query_param(query: Option<&str>, name: &str) -> bool {
    query
        .map(|q| query_pairs(q).any(|(key, _)| decode_query_component(key) == name))
        .unwrap_or(false)
}

/// Classify a request into the operation it performs.
///
/// Pure and total: every method/path/query combination maps to exactly one
/// variant. Query checks are by parameter name, so an object key that merely
/// contains `acl` or `uploadId` never changes the classification.
pub fn classify(method: &Method, path: &str, query: Option<&str>) -> S3Operation {
    let target_is_container = request_target(path, query).ends_with('/');

    match *method {
        Method::GET => {
            if target_is_container {
                S3Operation::Get
            } else if has_query_param(query, "acl") {
                S3Operation::Policy
            } else {
                S3Operation::List
            }
        }
        Method::DELETE => {
            if target_is_container {
                S3Operation::RemoveBucket
            } else if has_query_param(query, "uploadId") {
                S3Operation::AbortMultipart
            } else {
                S3Operation::Delete
            }
        }
        Method::PUT => {
            if target_is_container {
                S3Operation::MakeBucket
            } else if has_query_param(query, "policy") {
                S3Operation::Policy
            } else {
                S3Operation::Put
            }
        }
        _ => S3Operation::Other,
    }
}
