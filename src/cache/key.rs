//! Cache Key Module
//!
//! Turns an endpoint into a normalized cache key.

use url::form_urlencoded;

/// Query flag that bypasses the cache entirely.
pub const SKIP_CACHE_PARAM: &str = "skipCache";

/// Endpoint prefixes whose data belongs to one customer.
pub const TENANT_SCOPED_PREFIXES: &[&str] = &[
    "/brands",
    "/dashboard",
    "/topics",
    "/prompts",
    "/competitors",
    "/reports",
];

// == Parsed Endpoint ==
/// An endpoint split into its path and decoded query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEndpoint {
    pub path: String,
    pub params: Vec<(String, String)>,
}

impl ParsedEndpoint {
    /// Splits `endpoint` at the first `?`. A leading scheme and host are
    /// dropped so absolute URLs key the same as their relative form, and the
    /// path always starts with `/`.
    pub fn parse(endpoint: &str) -> Self {
        let relative = strip_origin(endpoint);
        let (path, query) = match relative.split_once('?') {
            Some((path, query)) => (path, query),
            None => (relative, ""),
        };
        let path = path.split('#').next().unwrap_or_default();

        let params = form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        Self { path, params }
    }

    /// True when `skipCache=true` is present.
    pub fn skip_cache(&self) -> bool {
        self.params
            .iter()
            .any(|(k, v)| k == SKIP_CACHE_PARAM && v.eq_ignore_ascii_case("true"))
    }
}

fn strip_origin(endpoint: &str) -> &str {
    for scheme in ["https://", "http://"] {
        if let Some(rest) = endpoint.strip_prefix(scheme) {
            return rest.find('/').map(|i| &rest[i..]).unwrap_or("/");
        }
    }
    endpoint
}

/// True when `path` is under one of the tenant-scoped prefixes.
pub fn is_tenant_scoped(path: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|prefix| {
        path == *prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

// == Generate Cache Key ==
/// Builds the normalized key for a request.
///
/// Format: `<path>[::customer=<tenant>][?k=v&...]` with params sorted by key
/// then value and form-encoded again, so a decoded `&` or `=` cannot alias
/// another parameter. `skipCache` never takes part in the key.
///
/// # Arguments
/// * `path` - Endpoint path without query string
/// * `params` - Query parameters in any order
/// * `tenant` - Customer discriminator, applied only to tenant-scoped paths
pub fn generate_cache_key<K, V>(path: &str, params: &[(K, V)], tenant: Option<&str>) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut key = path.to_string();

    if let Some(tenant) = tenant.filter(|t| !t.is_empty()) {
        if is_tenant_scoped(path, TENANT_SCOPED_PREFIXES) {
            key.push_str("::customer=");
            key.push_str(tenant);
        }
    }

    let mut sorted: Vec<(&str, &str)> = params
        .iter()
        .map(|(k, v)| (k.as_ref(), v.as_ref()))
        .filter(|(k, _)| *k != SKIP_CACHE_PARAM)
        .collect();
    sorted.sort_unstable();

    if !sorted.is_empty() {
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(sorted)
            .finish();
        key.push('?');
        key.push_str(&query);
    }

    key
}

/// Parses `endpoint` and builds its key in one step.
pub fn cache_key_for(endpoint: &str, tenant: Option<&str>) -> String {
    let parsed = ParsedEndpoint::parse(endpoint);
    generate_cache_key(&parsed.path, &parsed.params, tenant)
}
