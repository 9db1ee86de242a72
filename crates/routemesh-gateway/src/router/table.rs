//! Binding table
//!
//! axum routers cannot change once served, so bound routes live here and a
//! single fallback handler looks them up. Bindings are append-only; binding
//! the same route key, or a pattern of the same shape, again only replaces
//! what the existing binding points at.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use routemesh_core::{HttpMethod, RouteKey};

use crate::rate_limit::RateLimiter;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param,
    CatchAll,
}

impl Segment {
    /// Higher is more specific
    fn rank(&self) -> u8 {
        match self {
            Segment::Literal(_) => 2,
            Segment::Param => 1,
            Segment::CatchAll => 0,
        }
    }
}

/// Path pattern with `{p}` / `:p` parameters and a trailing `{*rest}` / `*rest`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(raw: &str) -> Self {
        let segments = raw
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s.starts_with("{*") || s.starts_with('*') {
                    Segment::CatchAll
                } else if (s.starts_with('{') && s.ends_with('}')) || s.starts_with(':') {
                    Segment::Param
                } else {
                    Segment::Literal(s.to_string())
                }
            })
            .collect();
        Self {
            raw: raw.to_string(),
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Per-segment specificity if `path` matches, for ranking candidates
    fn match_rank(&self, path: &str) -> Option<Vec<u8>> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut rank = Vec::with_capacity(self.segments.len());

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::CatchAll => {
                    rank.push(segment.rank());
                    return Some(rank);
                }
                Segment::Literal(lit) => {
                    if parts.get(i) != Some(&lit.as_str()) {
                        return None;
                    }
                }
                Segment::Param => {
                    parts.get(i)?;
                }
            }
            rank.push(segment.rank());
        }

        (parts.len() == self.segments.len()).then_some(rank)
    }

    pub fn matches(&self, path: &str) -> bool {
        self.match_rank(path).is_some()
    }

    /// True when both patterns match exactly the same paths, whatever their
    /// parameters are called (`/items/{id}` and `/items/:sku`)
    pub fn same_shape(&self, other: &PathPattern) -> bool {
        self.segments == other.segments
    }
}

/// What a bound route forwards to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// Declared service route, forwarded with the director rules
    Service,
    /// Synthesized `/health/{name}` route, forwarded to the health endpoint
    Health,
}

/// Middleware policy of a bound route
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    pub limiter: Arc<RateLimiter>,
    pub protected: bool,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub key: RouteKey,
    pub kind: BindingKind,
    pub pattern: PathPattern,
    pub policy: RoutePolicy,
}

#[derive(Debug, Default)]
pub struct BindingTable {
    by_method: HashMap<HttpMethod, Vec<Binding>>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `key` at `path`. Returns false when the key or an equivalent
    /// pattern was already bound; that binding is pointed at `key` instead.
    pub fn bind(&mut self, key: RouteKey, kind: BindingKind, path: &str, policy: RoutePolicy) -> bool {
        let pattern = PathPattern::parse(path);
        let bindings = self.by_method.entry(key.method).or_default();

        if let Some(existing) = bindings.iter_mut().find(|b| b.key == key) {
            existing.policy = policy;
            existing.kind = kind;
            return false;
        }
        if let Some(existing) = bindings.iter_mut().find(|b| b.pattern.same_shape(&pattern)) {
            existing.key = key;
            existing.pattern = pattern;
            existing.kind = kind;
            existing.policy = policy;
            return false;
        }

        bindings.push(Binding {
            pattern,
            key,
            kind,
            policy,
        });
        true
    }

    /// Most specific binding matching `path`; ties go to the earliest bound
    pub fn lookup(&self, method: HttpMethod, path: &str) -> Option<&Binding> {
        let mut best: Option<(&Binding, Vec<u8>)> = None;
        for binding in self.by_method.get(&method)? {
            if let Some(rank) = binding.pattern.match_rank(path) {
                let better = match &best {
                    Some((_, best_rank)) => rank > *best_rank,
                    None => true,
                };
                if better {
                    best = Some((binding, rank));
                }
            }
        }
        best.map(|(binding, _)| binding)
    }

    pub fn get(&self, key: &RouteKey) -> Option<&Binding> {
        self.by_method.get(&key.method)?.iter().find(|b| &b.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.by_method.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.by_method.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
