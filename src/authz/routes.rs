//! Route templates and the two route-permission maps.
//!
//! Templates are framework-neutral: path parameters are written `[name]`.
//! Templates coming from a router that spells them `{name}` (axum) or `:name`
//! are converted on parse, so the maps never depend on one router's syntax.

use std::collections::HashMap;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::authz::errors::AuthzError;
use crate::authz::types::{RouteAction, RouteScope};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Segment {
    Static(String),
    Param(String),
}

/// A parsed route template such as `/api/users/[userId]/update`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    segments: Vec<Segment>,
}

impl RouteKey {
    pub fn parse(template: &str) -> Result<Self, AuthzError> {
        let invalid = || AuthzError::InvalidRoute(template.to_string());
        let rest = template.strip_prefix('/').ok_or_else(invalid)?;

        let mut segments = Vec::new();
        for raw in rest.split('/') {
            if raw.is_empty() {
                // tolerate a trailing slash, nothing else
                continue;
            }
            let param = raw
                .strip_prefix('[')
                .and_then(|s| s.strip_suffix(']'))
                .or_else(|| raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')))
                .or_else(|| raw.strip_prefix(':'));
            let segment = match param {
                Some(name) if is_param_name(name) => Segment::Param(name.to_string()),
                Some(_) => return Err(invalid()),
                None if raw.contains(['[', ']', '{', '}', '?', '#', ' ']) => return Err(invalid()),
                None => Segment::Static(raw.to_string()),
            };
            segments.push(segment);
        }

        if template.contains("//") {
            return Err(invalid());
        }
        Ok(Self { segments })
    }

    /// Parameter names in template order.
    pub fn params(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Static(_) => None,
        })
    }

    /// Match a concrete request path, returning the captured parameters.
    /// A path that is not canonical never matches.
    pub fn captures(&self, path: &str) -> Option<Map<String, Value>> {
        self.captures_request(&RequestPath::parse(path).ok()?)
    }

    /// Match decoded request segments. Static and parameter segments see the
    /// same decoded text.
    pub fn captures_request(&self, request: &RequestPath) -> Option<Map<String, Value>> {
        if request.segments.len() != self.segments.len() {
            return None;
        }
        let mut params = Map::new();
        for (segment, part) in self.segments.iter().zip(&request.segments) {
            match segment {
                Segment::Static(s) if s == part => {}
                Segment::Static(_) => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), Value::String(part.clone()));
                }
            }
        }
        Some(params)
    }

    /// Static segments outrank parameters, earlier positions first.
    fn rank(&self) -> Vec<bool> {
        self.segments
            .iter()
            .map(|s| matches!(s, Segment::Static(_)))
            .collect()
    }
}

impl std::fmt::Display for RouteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            match segment {
                Segment::Static(s) => write!(f, "/{s}")?,
                Segment::Param(name) => write!(f, "/[{name}]")?,
            }
        }
        Ok(())
    }
}

fn is_param_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("request path must start with `/`")]
    Relative,
    #[error("segment `{0}` is not valid percent-encoded UTF-8")]
    BadEncoding(String),
    #[error("dot segment in request path")]
    DotSegment,
    #[error("segment `{0}` decodes to a separator, `%` or control character")]
    ForbiddenChar(String),
}

/// A request path in canonical form: query and fragment dropped, empty
/// segments collapsed, every segment percent-decoded exactly once.
///
/// Decoded segments never contain `/`, `\`, `%` or control characters and are
/// never `.` or `..`, so the rendered form cannot be reinterpreted by a
/// server that decodes or resolves dot segments after the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPath {
    segments: Vec<String>,
}

impl RequestPath {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let path = raw.split(['?', '#']).next().unwrap_or_default();
        let rest = path.strip_prefix('/').ok_or(PathError::Relative)?;

        let mut segments = Vec::new();
        for part in rest.split('/').filter(|p| !p.is_empty()) {
            let decoded =
                urlencoding::decode(part).map_err(|_| PathError::BadEncoding(part.to_string()))?;
            if decoded == "." || decoded == ".." {
                return Err(PathError::DotSegment);
            }
            if decoded
                .chars()
                .any(|c| matches!(c, '/' | '\\' | '%') || c.is_control())
            {
                return Err(PathError::ForbiddenChar(part.to_string()));
            }
            segments.push(decoded.into_owned());
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn scope(&self) -> RouteScope {
        match self.segments.first() {
            Some(first) if first == "api" => RouteScope::Api,
            _ => RouteScope::Page,
        }
    }
}

impl std::fmt::Display for RequestPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub key: RouteKey,
    pub action: RouteAction,
}

/// A request path resolved against one of the maps.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMatch<'a> {
    pub key: &'a RouteKey,
    pub action: &'a RouteAction,
    pub params: Map<String, Value>,
}

/// Template -> action map for one route scope, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct RouteMap {
    entries: Vec<RouteEntry>,
    index: HashMap<RouteKey, usize>,
}

impl RouteMap {
    /// Returns `false` when the template is already present.
    pub fn insert(&mut self, key: RouteKey, action: RouteAction) -> bool {
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push(RouteEntry { key, action });
        true
    }

    pub fn get(&self, key: &RouteKey) -> Option<&RouteAction> {
        self.index.get(key).map(|&i| &self.entries[i].action)
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn match_path(&self, path: &str) -> Option<RouteMatch<'_>> {
        self.match_request(&RequestPath::parse(path).ok()?)
    }

    pub fn match_request(&self, request: &RequestPath) -> Option<RouteMatch<'_>> {
        let mut best: Option<(Vec<bool>, RouteMatch<'_>)> = None;
        for entry in &self.entries {
            let Some(params) = entry.key.captures_request(request) else {
                continue;
            };
            let rank = entry.key.rank();
            if best.as_ref().is_some_and(|(r, _)| *r >= rank) {
                continue;
            }
            best = Some((
                rank,
                RouteMatch {
                    key: &entry.key,
                    action: &entry.action,
                    params,
                },
            ));
        }
        best.map(|(_, m)| m)
    }
}

/// The API and page route-permission maps.
#[derive(Debug, Clone, Default)]
pub struct RouteMaps {
    pub api: RouteMap,
    pub page: RouteMap,
}

impl RouteMaps {
    pub fn scope(&self, scope: RouteScope) -> &RouteMap {
        match scope {
            RouteScope::Api => &self.api,
            RouteScope::Page => &self.page,
        }
    }

    pub fn scope_mut(&mut self, scope: RouteScope) -> &mut RouteMap {
        match scope {
            RouteScope::Api => &mut self.api,
            RouteScope::Page => &mut self.page,
        }
    }

    /// Resolve a route template to the action the evaluator must check.
    /// `None` means the route is not mapped.
    pub fn resolve_action(&self, route: &RouteKey, scope: RouteScope) -> Option<&RouteAction> {
        self.scope(scope).get(route)
    }

    /// Resolve a concrete request path; the scope follows from the path.
    pub fn match_path(&self, path: &str) -> Option<RouteMatch<'_>> {
        self.match_request(&RequestPath::parse(path).ok()?)
    }

    pub fn match_request(&self, request: &RequestPath) -> Option<RouteMatch<'_>> {
        self.scope(request.scope()).match_request(request)
    }
}

/// Glob match where `*` stands for any run of characters.
pub fn wildcard_match(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    let (p, v) = (pattern.as_bytes(), value.as_bytes());
    let (mut pi, mut vi) = (0usize, 0usize);
    let (mut star, mut mark) = (None, 0usize);

    while vi < v.len() {
        if pi < p.len() && p[pi] == b'*' {
            star = Some(pi);
            mark = vi;
            pi += 1;
        } else if pi < p.len() && p[pi] == v[vi] {
            pi += 1;
            vi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            vi = mark;
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&b| b == b'*')
}
