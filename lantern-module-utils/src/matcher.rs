// Copyright 2024 Wladimir Palant
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Deciding whether a directive applies to the current request state
//!
//! Path patterns are matched against the current, possibly rewritten, path. Matching is
//! case-sensitive and byte-wise, the query string is never considered by path patterns.
//!
//! A pattern string like `/docs/*` is a wildcard pattern: it matches any path starting with
//! `/docs/`. A pattern without a trailing `*` like `/docs` requires an exact match. Directory-style
//! prefix matching needs to be requested explicitly via `{prefix: /docs}`, it matches `/docs` and
//! `/docs/file` but never `/docs2`.

use http::Method;
use log::trace;
use regex::Regex;
use serde::Deserialize;
use std::fmt::{Debug, Formatter};

use crate::{configuration_error, Error, OneOrMany, RequestState};

/// A single path pattern
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "PathPatternConf")]
pub enum PathPattern {
    /// Matches only the given path.
    Exact(String),
    /// Matches the given path and any path within this directory.
    Prefix(String),
    /// Matches any path starting with the given string (the part preceding `*`).
    Wildcard(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum ExplicitPathPattern {
    Exact(String),
    Prefix(String),
    Wildcard(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PathPatternConf {
    Short(String),
    Explicit(ExplicitPathPattern),
}

impl From<PathPatternConf> for PathPattern {
    fn from(value: PathPatternConf) -> Self {
        match value {
            PathPatternConf::Short(pattern) => pattern.as_str().into(),
            PathPatternConf::Explicit(ExplicitPathPattern::Exact(path)) => Self::Exact(path),
            PathPatternConf::Explicit(ExplicitPathPattern::Prefix(path)) => Self::Prefix(path),
            PathPatternConf::Explicit(ExplicitPathPattern::Wildcard(path)) => {
                let path = path.strip_suffix('*').unwrap_or(&path).to_owned();
                Self::Wildcard(path)
            }
        }
    }
}

impl From<&str> for PathPattern {
    /// Converts a pattern string into a path pattern. A trailing `*` makes it a wildcard pattern,
    /// anything else is an exact pattern.
    fn from(pattern: &str) -> Self {
        if let Some(prefix) = pattern.strip_suffix('*') {
            Self::Wildcard(prefix.to_owned())
        } else {
            Self::Exact(pattern.to_owned())
        }
    }
}

impl Debug for PathPattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact(path) => write!(f, "{path}"),
            Self::Prefix(path) => write!(f, "prefix {path}"),
            Self::Wildcard(path) => write!(f, "{path}*"),
        }
    }
}

impl PathPattern {
    /// Checks whether the path is matched by this pattern.
    pub fn matches(&self, path: &str) -> bool {
        self.capture(path).is_some()
    }

    /// Matches the path against this pattern and returns the part of the path not covered by
    /// the pattern: the suffix following the literal part of a wildcard pattern, the remainder
    /// after a prefix (starting with `/`) or an empty string for exact matches.
    pub fn capture<'a>(&self, path: &'a str) -> Option<&'a str> {
        match self {
            Self::Exact(pattern) => (path == pattern).then_some(""),
            Self::Prefix(pattern) => {
                let pattern = pattern.trim_end_matches('/');
                let rest = path.strip_prefix(pattern)?;
                (rest.is_empty() || rest.starts_with('/')).then_some(rest)
            }
            Self::Wildcard(pattern) => path.strip_prefix(pattern.as_str()),
        }
    }
}

/// A parsed representation of a regular expression condition like `path_regex`
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "String")]
pub struct RegexMatch {
    /// Regular expression to apply to the value
    pub regex: Regex,
    /// If `true`, the result should be negated
    pub negate: bool,
}

impl RegexMatch {
    /// Checks whether the given value is matched
    pub fn matches(&self, value: &str) -> bool {
        let result = self.regex.is_match(value);
        if self.negate {
            !result
        } else {
            result
        }
    }
}

impl PartialEq for RegexMatch {
    fn eq(&self, other: &Self) -> bool {
        self.regex.as_str() == other.regex.as_str() && self.negate == other.negate
    }
}

impl Eq for RegexMatch {}

impl TryFrom<&str> for RegexMatch {
    type Error = regex::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let (regex, negate) = if let Some(regex) = value.strip_prefix('!') {
            (regex, true)
        } else {
            (value, false)
        };
        Ok(Self {
            regex: Regex::new(regex)?,
            negate,
        })
    }
}

impl TryFrom<String> for RegexMatch {
    type Error = regex::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.as_str().try_into()
    }
}

/// Matcher settings of a directive
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MatcherConf {
    /// Path patterns, any of them has to match. No patterns means that all paths are matched.
    #[serde(rename = "match")]
    pub paths: OneOrMany<PathPattern>,

    /// Additional regular expression the path has to match, e.g. `\.png$`. Prefixing the regular
    /// expression with `!` negates its effect.
    pub path_regex: Option<RegexMatch>,

    /// Regular expression restricting matches to particular query strings only. Prefixing the
    /// regular expression with `!` negates its effect.
    pub query_regex: Option<RegexMatch>,

    /// Request methods to match, all methods are matched if this is empty.
    pub method: OneOrMany<String>,
}

/// Compiled matcher of a directive, all configured conditions have to be satisfied
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectiveMatcher {
    paths: Vec<PathPattern>,
    path_regex: Option<RegexMatch>,
    query_regex: Option<RegexMatch>,
    methods: Vec<Method>,
}

impl TryFrom<MatcherConf> for DirectiveMatcher {
    type Error = Box<Error>;

    fn try_from(conf: MatcherConf) -> Result<Self, Self::Error> {
        let methods = conf
            .method
            .into_iter()
            .map(|method| {
                Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                    .map_err(|_| configuration_error(format!("invalid request method {method}")))
            })
            .collect::<Result<_, _>>()?;

        Ok(Self {
            paths: conf.paths.into_inner(),
            path_regex: conf.path_regex,
            query_regex: conf.query_regex,
            methods,
        })
    }
}

impl From<PathPattern> for DirectiveMatcher {
    fn from(pattern: PathPattern) -> Self {
        Self {
            paths: vec![pattern],
            ..Default::default()
        }
    }
}

impl DirectiveMatcher {
    /// Evaluates the matcher against the current request state. On success, the path suffix
    /// captured by the first matching path pattern is returned.
    pub fn matches(&self, request: &RequestState) -> Option<String> {
        if !self.methods.is_empty() && !self.methods.contains(request.method()) {
            trace!("Method {} not matched", request.method());
            return None;
        }

        let path = request.path();
        let tail = if self.paths.is_empty() {
            path
        } else {
            self.paths
                .iter()
                .find_map(|pattern| pattern.capture(path))?
        };

        if let Some(path_regex) = &self.path_regex {
            if !path_regex.matches(path) {
                trace!("Path {path} not matched by path_regex");
                return None;
            }
        }

        if let Some(query_regex) = &self.query_regex {
            if !query_regex.matches(request.query().unwrap_or("")) {
                trace!("Query not matched by query_regex");
                return None;
            }
        }

        Some(tail.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::FromYaml;
    use test_log::test;

    fn request(method: Method, uri: &str) -> RequestState {
        RequestState::new(method, uri).unwrap()
    }

    #[test]
    fn exact() {
        let pattern = PathPattern::from("/hello");
        assert_eq!(pattern, PathPattern::Exact("/hello".to_owned()));
        assert!(pattern.matches("/hello"));
        assert!(!pattern.matches("/hello/"));
        assert!(!pattern.matches("/hello2"));
        assert!(!pattern.matches("/Hello"));
        assert_eq!(pattern.capture("/hello"), Some(""));
    }

    #[test]
    fn prefix() {
        let pattern = PathPattern::Prefix("/docs".to_owned());
        assert!(pattern.matches("/docs"));
        assert!(pattern.matches("/docs/"));
        assert!(pattern.matches("/docs/json/foo"));
        assert!(!pattern.matches("/docs2"));
        assert!(!pattern.matches("/doc"));
        assert_eq!(pattern.capture("/docs/json/foo"), Some("/json/foo"));
        assert_eq!(pattern.capture("/docs"), Some(""));

        let pattern = PathPattern::Prefix("/docs/".to_owned());
        assert!(pattern.matches("/docs"));
        assert!(!pattern.matches("/docs2"));

        let pattern = PathPattern::Prefix("/".to_owned());
        assert!(pattern.matches("/"));
        assert!(pattern.matches("/anything"));
    }

    #[test]
    fn wildcard() {
        let pattern = PathPattern::from("/docs/json/*");
        assert_eq!(pattern, PathPattern::Wildcard("/docs/json/".to_owned()));
        assert!(pattern.matches("/docs/json/foo"));
        assert!(pattern.matches("/docs/json/"));
        assert!(!pattern.matches("/docs/json"));
        assert!(!pattern.matches("/docs/modules/wat"));
        assert_eq!(pattern.capture("/docs/json/foo/bar"), Some("foo/bar"));

        let pattern = PathPattern::from("/x*");
        assert!(pattern.matches("/x"));
        assert!(pattern.matches("/x2"));
        assert!(pattern.matches("/x/y"));

        let pattern = PathPattern::from("*");
        assert!(pattern.matches("/"));
        assert!(pattern.matches("/anything"));
    }

    #[test]
    fn deserialization() {
        let conf = MatcherConf::from_yaml(
            r#"
                match:
                - /exact
                - /wildcard/*
                - prefix: /prefix
                - exact: /other
                - wildcard: /w*
            "#,
        )
        .unwrap();
        assert_eq!(
            conf.paths.into_inner(),
            vec![
                PathPattern::Exact("/exact".to_owned()),
                PathPattern::Wildcard("/wildcard/".to_owned()),
                PathPattern::Prefix("/prefix".to_owned()),
                PathPattern::Exact("/other".to_owned()),
                PathPattern::Wildcard("/w".to_owned()),
            ]
        );

        let conf = MatcherConf::from_yaml("match: /single").unwrap();
        assert_eq!(
            conf.paths.into_inner(),
            vec![PathPattern::Exact("/single".to_owned())]
        );

        assert!(MatcherConf::from_yaml("path_regex: \"(\"").is_err());
    }

    #[test]
    fn regex_match() {
        let regex_match = RegexMatch::try_from("abc").unwrap();
        assert!(regex_match.matches("abc"));
        assert!(regex_match.matches("aabcc"));
        assert!(!regex_match.matches("ab"));

        let regex_match = RegexMatch::try_from("!^abc$").unwrap();
        assert!(!regex_match.matches("abc"));
        assert!(regex_match.matches("aabcc"));
        assert!(regex_match.matches("ab"));
    }

    #[test]
    fn directive_matcher() {
        let matcher = DirectiveMatcher::try_from(
            MatcherConf::from_yaml(
                r#"
                    match: [/images/*, /img/*]
                    path_regex: "\\.jpg$"
                    query_regex: "!nomatch"
                    method: [get, HEAD]
                "#,
            )
            .unwrap(),
        )
        .unwrap();

        assert_eq!(
            matcher.matches(&request(Method::GET, "/images/a.jpg")),
            Some("a.jpg".to_owned())
        );
        assert_eq!(
            matcher.matches(&request(Method::HEAD, "/img/dir/b.jpg?x=y")),
            Some("dir/b.jpg".to_owned())
        );
        assert_eq!(matcher.matches(&request(Method::GET, "/images/a.png")), None);
        assert_eq!(matcher.matches(&request(Method::GET, "/other/a.jpg")), None);
        assert_eq!(
            matcher.matches(&request(Method::GET, "/images/a.jpg?nomatch")),
            None
        );
        assert_eq!(matcher.matches(&request(Method::POST, "/images/a.jpg")), None);
    }

    #[test]
    fn match_everything() {
        let matcher = DirectiveMatcher::default();
        assert_eq!(
            matcher.matches(&request(Method::DELETE, "/any/path?query")),
            Some("/any/path".to_owned())
        );
    }

    #[test]
    fn invalid_method() {
        let conf = MatcherConf::from_yaml("method: \"GE T\"").unwrap();
        assert!(DirectiveMatcher::try_from(conf).is_err());
    }
}
