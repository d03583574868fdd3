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

//! Placeholder interpolation in directive targets like `{path}.html`
//!
//! A placeholder is a name in curly brackets. Names consist of ASCII letters, digits and the
//! characters `.`, `_` and `-`. Anything else in curly brackets is taken literally, so is a
//! placeholder that the lookup function doesn’t know.

use serde::Deserialize;
use std::fmt::{Display, Formatter};

const PLACEHOLDER_PREFIX: char = '{';
const PLACEHOLDER_SUFFIX: char = '}';

#[derive(Debug, Clone, PartialEq, Eq)]
enum InterpolationPart {
    Literal(String),
    Placeholder(String),
}

/// Parsed representation of a string with placeholders like the target of a rewrite directive
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub struct Interpolation {
    parts: Vec<InterpolationPart>,
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-')
}

impl From<&str> for Interpolation {
    fn from(value: &str) -> Self {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut rest = value;
        while let Some(start) = rest.find(PLACEHOLDER_PREFIX) {
            let candidate = &rest[start + 1..];
            match candidate.find(PLACEHOLDER_SUFFIX) {
                Some(end) if is_placeholder_name(&candidate[..end]) => {
                    literal.push_str(&rest[..start]);
                    if !literal.is_empty() {
                        parts.push(InterpolationPart::Literal(std::mem::take(&mut literal)));
                    }
                    parts.push(InterpolationPart::Placeholder(candidate[..end].to_owned()));
                    rest = &candidate[end + 1..];
                }
                _ => {
                    // Not a placeholder, keep the bracket and look further ahead
                    literal.push_str(&rest[..=start]);
                    rest = candidate;
                }
            }
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            parts.push(InterpolationPart::Literal(literal));
        }
        Self { parts }
    }
}

impl From<String> for Interpolation {
    fn from(value: String) -> Self {
        value.as_str().into()
    }
}

impl Display for Interpolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for part in &self.parts {
            match part {
                InterpolationPart::Literal(value) => f.write_str(value)?,
                InterpolationPart::Placeholder(name) => {
                    write!(f, "{PLACEHOLDER_PREFIX}{name}{PLACEHOLDER_SUFFIX}")?
                }
            }
        }
        Ok(())
    }
}

impl Interpolation {
    /// Returns `true` if the string contains no placeholders.
    pub fn is_literal(&self) -> bool {
        self.parts
            .iter()
            .all(|part| matches!(part, InterpolationPart::Literal(_)))
    }

    /// Produces the resulting string. The lookup function is called for each placeholder and
    /// should append its value to the result, returning `false` for unknown placeholders.
    pub fn interpolate<L>(&self, lookup: L) -> String
    where
        L: Fn(&str, &mut String) -> bool,
    {
        let mut result = String::new();
        for part in &self.parts {
            match part {
                InterpolationPart::Literal(value) => result.push_str(value),
                InterpolationPart::Placeholder(name) => {
                    if !lookup(name, &mut result) {
                        result.push(PLACEHOLDER_PREFIX);
                        result.push_str(name);
                        result.push(PLACEHOLDER_SUFFIX);
                    }
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    #[test]
    fn interpolation() {
        assert_eq!(
            Interpolation::from("abcd").interpolate(|_, _| panic!("Unexpected lookup call")),
            "abcd"
        );

        assert_eq!(
            Interpolation::from("ab{x y}cd").interpolate(|_, _| panic!("Unexpected lookup call")),
            "ab{x y}cd"
        );

        assert_eq!(
            Interpolation::from("{path}.html").interpolate(|name, result| {
                assert_eq!(name, "path");
                result.push_str("/file");
                true
            }),
            "/file.html"
        );

        assert_eq!(
            Interpolation::from("a{query}{tail}bc{header.X-Test}d{unknown}e").interpolate(
                |name, result| {
                    match name {
                        "query" => result.push_str("query resolved"),
                        "tail" => result.push_str("tail resolved"),
                        "header.X-Test" => result.push_str("header resolved"),
                        _ => return false,
                    }
                    true
                }
            ),
            "aquery resolvedtail resolvedbcheader resolvedd{unknown}e"
        );

        assert_eq!(
            Interpolation::from("{a{path}}").interpolate(|name, result| {
                assert_eq!(name, "path");
                result.push_str("resolved");
                true
            }),
            "{aresolved}"
        );

        assert_eq!(
            Interpolation::from("{{path}").interpolate(|_, result| {
                result.push_str("resolved");
                true
            }),
            "{resolved"
        );
    }

    #[test]
    fn literal_detection() {
        assert!(Interpolation::from("/x/template.html").is_literal());
        assert!(Interpolation::from("/{not a placeholder}").is_literal());
        assert!(!Interpolation::from("{path}/").is_literal());
    }

    #[test]
    fn display() {
        assert_eq!(
            Interpolation::from("{path}/{x y}{tail}").to_string(),
            "{path}/{x y}{tail}"
        );
    }
}
