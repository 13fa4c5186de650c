//! Cache Policy Module
//!
//! Per-endpoint freshness windows and the table that selects them.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;

// == Cache Policy ==
/// Freshness windows for one class of endpoint.
///
/// `ttl <= stale_time <= max_age` is expected; the constructor clamps the
/// windows so a misconfigured policy still decays in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    /// Served with no network call while younger than this
    pub ttl: Duration,
    /// Served with a background refresh while younger than this
    pub stale_time: Duration,
    /// Usable as an error fallback while younger than this
    pub max_age: Duration,
    /// Written to the cache snapshot file
    pub persist: bool,
}

impl CachePolicy {
    pub fn new(ttl: Duration, stale_time: Duration, max_age: Duration, persist: bool) -> Self {
        let stale_time = stale_time.max(ttl);
        let max_age = max_age.max(stale_time);
        Self {
            ttl,
            stale_time,
            max_age,
            persist,
        }
    }

    /// Convenience constructor taking whole minutes.
    pub fn minutes(ttl: u64, stale: u64, max_age: u64, persist: bool) -> Self {
        Self::new(
            Duration::from_secs(ttl * MINUTE),
            Duration::from_secs(stale * MINUTE),
            Duration::from_secs(max_age * MINUTE),
            persist,
        )
    }
}

impl Default for CachePolicy {
    /// 2 min fresh / 5 min stale / 10 min max, not persisted.
    fn default() -> Self {
        Self::minutes(2, 5, 10, false)
    }
}

// == Endpoint Matcher ==
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param,
}

/// Selects the endpoints a policy applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointMatcher {
    /// The path must equal this exactly.
    Exact(String),
    /// The path must start with these segments. `:name` matches any single
    /// segment, so `/brands/:id/dashboard` covers `/brands/42/dashboard/x`.
    Prefix(Vec<String>),
}

impl EndpointMatcher {
    pub fn exact(path: &str) -> Self {
        EndpointMatcher::Exact(normalize_path(path))
    }

    pub fn prefix(pattern: &str) -> Self {
        EndpointMatcher::Prefix(split_segments(pattern).map(str::to_string).collect())
    }

    fn segments(&self) -> Vec<Segment> {
        match self {
            EndpointMatcher::Exact(path) => split_segments(path).map(to_segment).collect(),
            EndpointMatcher::Prefix(parts) => parts.iter().map(|p| to_segment(p)).collect(),
        }
    }

    /// Returns the match specificity, or `None` when the path does not match.
    ///
    /// Ordered as (exact?, segment count, literal segment count).
    fn specificity(&self, path: &str) -> Option<(u8, usize, usize)> {
        let wanted = self.segments();
        let literals = wanted
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count();

        match self {
            EndpointMatcher::Exact(exact) => {
                (normalize_path(path) == *exact).then_some((1, wanted.len(), literals))
            }
            EndpointMatcher::Prefix(_) => {
                let actual: Vec<&str> = split_segments(path).collect();
                if actual.len() < wanted.len() {
                    return None;
                }
                let matched = wanted.iter().zip(&actual).all(|(w, a)| match w {
                    Segment::Literal(lit) => lit == a,
                    Segment::Param => !a.is_empty(),
                });
                matched.then_some((0, wanted.len(), literals))
            }
        }
    }
}

fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn to_segment(part: &str) -> Segment {
    if part.starts_with(':') {
        Segment::Param
    } else {
        Segment::Literal(part.to_string())
    }
}

fn normalize_path(path: &str) -> String {
    let joined: Vec<&str> = split_segments(path).collect();
    format!("/{}", joined.join("/"))
}

// == Policy Table ==
/// Ordered `(matcher, policy)` list resolved most-specific-first.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    rules: Vec<(EndpointMatcher, CachePolicy)>,
    fallback: CachePolicy,
}

impl PolicyTable {
    /// Empty table that resolves everything to `fallback`.
    pub fn new(fallback: CachePolicy) -> Self {
        Self {
            rules: Vec::new(),
            fallback,
        }
    }

    /// Adds a rule. Among equally specific matches the earlier rule wins.
    pub fn with(mut self, matcher: EndpointMatcher, policy: CachePolicy) -> Self {
        self.rules.push((matcher, policy));
        self
    }

    pub fn fallback(&self) -> CachePolicy {
        self.fallback
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Picks the policy for a path (query string already stripped).
    pub fn resolve(&self, path: &str) -> CachePolicy {
        let mut best: Option<((u8, usize, usize), &CachePolicy)> = None;
        for (matcher, policy) in &self.rules {
            if let Some(score) = matcher.specificity(path) {
                if best.map_or(true, |(current, _)| score > current) {
                    best = Some((score, policy));
                }
            }
        }
        best.map(|(_, policy)| *policy).unwrap_or(self.fallback)
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        let dashboard = CachePolicy::minutes(5, 30, 6 * 60, true);
        let topics = CachePolicy::minutes(15, 60, 12 * 60, true);
        let prompts = CachePolicy::minutes(5, 30, 6 * 60, true);
        let brands = CachePolicy::new(
            Duration::from_secs(HOUR),
            Duration::from_secs(12 * HOUR),
            Duration::from_secs(24 * HOUR),
            true,
        );

        PolicyTable::new(CachePolicy::default())
            .with(EndpointMatcher::prefix("/brands"), brands)
            .with(EndpointMatcher::prefix("/brands/:id/dashboard"), dashboard)
            .with(EndpointMatcher::prefix("/brands/:id/topics"), topics)
            .with(EndpointMatcher::prefix("/brands/:id/prompts"), prompts)
            .with(EndpointMatcher::prefix("/dashboard"), dashboard)
            .with(EndpointMatcher::prefix("/topics"), topics)
            .with(EndpointMatcher::prefix("/prompts"), prompts)
    }
}
