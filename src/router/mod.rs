// Router module: maps a caller's request into the shared backend bucket.
//
// Callers address `/<username>/<key...>`. Everything a caller may reach on
// the backend lives under `<bucket>/<username>/`.

use http::Method;

use crate::error::ProxyError;
use crate::s3::{decode_query_component, has_query_param, query_pairs};

/// Parameters a bucket listing may carry. A query naming anything else is a
/// bucket sub-resource (`policy`, `cors`, `lifecycle`, ...) and is never sent
/// to the shared bucket root.
const LISTING_PARAMS: &[&str] = &[
    "list-type",
    "prefix",
    "delimiter",
    "max-keys",
    "continuation-token",
    "start-after",
    "fetch-owner",
    "encoding-type",
    "marker",
    "uploads",
    "key-marker",
    "upload-id-marker",
    "max-uploads",
    "versions",
    "version-id-marker",
    "x-id",
];

/// Where a rewritten request goes on the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    pub path: String,
    /// Raw query string, `None` when there is none
    pub query: Option<String>,
}

impl UpstreamTarget {
    pub fn path_and_query(&self) -> String {
        crate::s3::request_target(&self.path, self.query.as_deref())
    }
}

/// Split a request path into its raw first segment and the remainder after
/// that segment's trailing slash. Leading slashes are skipped.
fn split_namespace(path: &str) -> Option<(&str, &str)> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.split_once('/') {
        Some((user, rest)) => Some((user, rest)),
        None => Some((trimmed, "")),
    }
}

/// Caller identity: the first non-empty path segment, percent-decoded
pub fn extract_username(path: &str) -> Result<String, ProxyError> {
    let (raw, _) = split_namespace(path).ok_or_else(|| {
        ProxyError::MissingIdentity(format!("no user segment in path '{}'", path))
    })?;

    let username = urlencoding::decode(raw)
        .map_err(|_| ProxyError::MissingIdentity(format!("user segment '{}' is not UTF-8", raw)))?
        .into_owned();

    if username.is_empty() || username.contains('/') {
        return Err(ProxyError::MissingIdentity(format!(
            "invalid user segment '{}'",
            raw
        )));
    }

    Ok(username)
}

/// Backend object key for a caller path: `<username>/<key...>`, decoded
pub fn object_key(path: &str) -> Result<String, ProxyError> {
    let username = extract_username(path)?;
    let (_, rest) = split_namespace(path)
        .ok_or_else(|| ProxyError::MissingObjectKey(path.to_string()))?;
    if rest.is_empty() {
        return Err(ProxyError::MissingObjectKey(format!(
            "no object key below '/{}/'",
            username
        )));
    }

    let key = urlencoding::decode(rest)
        .map_err(|_| ProxyError::MissingObjectKey(format!("object key '{}' is not UTF-8", rest)))?;

    Ok(format!("{}/{}", username, key))
}

/// True for `/<user>` and `/<user>/`
fn is_user_root(path: &str) -> bool {
    matches!(split_namespace(path), Some((_, rest)) if rest.trim_matches('/').is_empty())
}

/// True when every parameter of the query belongs to a listing
pub fn is_listing_query(query: Option<&str>) -> bool {
    query_pairs(query.unwrap_or(""))
        .all(|(name, _)| LISTING_PARAMS.contains(&decode_query_component(name).as_str()))
}

/// Prefix every listing with the caller's namespace.
///
/// Every parameter whose decoded name is `prefix` (so `pre%66ix` too) is
/// rewritten as `prefix=<user>%2F<raw value>`; without one,
/// `prefix=<user>%2F` is appended. Other parameters keep their order and
/// encoding.
pub fn scope_listing_query(query: Option<&str>, username: &str) -> String {
    let user_prefix = format!("{}%2F", urlencoding::encode(username));
    let mut found = false;
    let mut params = Vec::new();

    for pair in query.unwrap_or("").split('&').filter(|p| !p.is_empty()) {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        if decode_query_component(name) == "prefix" {
            found = true;
            params.push(format!("prefix={}{}", user_prefix, value));
        } else {
            params.push(pair.to_string());
        }
    }

    if !found {
        params.push(format!("prefix={}", user_prefix));
    }

    params.join("&")
}

/// Rewrite a caller request into the shared bucket.
///
/// Rules are tried in order:
/// 1. GET carrying `location`: bucket root, query untouched.
/// 2. GET carrying `delimiter`, or a GET of the user root, whose query is a
///    plain listing: bucket root with the query scoped to the caller's
///    prefix. Sub-resource queries fall through to rule 5.
/// 3. PUT/POST: `/<bucket>/<user>/<key...>`; an object key is required.
/// 4. DELETE carrying `uploadId`: same shape as uploads.
/// 5. Anything else passes through unchanged.
pub fn rewrite(
    method: &Method,
    path: &str,
    query: Option<&str>,
    bucket: &str,
    username: &str,
) -> Result<UpstreamTarget, ProxyError> {
    let query_owned = query.filter(|q| !q.is_empty()).map(str::to_string);
    let bucket_root = format!("/{}/", bucket);

    if *method == Method::GET && has_query_param(query, "location") {
        return Ok(UpstreamTarget {
            path: bucket_root,
            query: query_owned,
        });
    }

    if *method == Method::GET
        && (has_query_param(query, "delimiter") || is_user_root(path))
        && is_listing_query(query)
    {
        return Ok(UpstreamTarget {
            path: bucket_root,
            query: Some(scope_listing_query(query, username)),
        });
    }

    let is_upload = *method == Method::PUT || *method == Method::POST;
    let is_abort = *method == Method::DELETE && has_query_param(query, "uploadId");
    if is_upload || is_abort {
        let (raw_user, rest) = split_namespace(path).ok_or_else(|| {
            ProxyError::MissingIdentity(format!("no user segment in path '{}'", path))
        })?;
        if rest.is_empty() {
            return Err(ProxyError::MissingObjectKey(format!(
                "{} {} has no object key",
                method, path
            )));
        }
        return Ok(UpstreamTarget {
            path: format!("/{}/{}/{}", bucket, raw_user, rest),
            query: query_owned,
        });
    }

    Ok(UpstreamTarget {
        path: path.to_string(),
        query: query_owned,
    })
}
