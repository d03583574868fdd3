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

//! Structures required to deserialize Rewrite Module configuration from YAML configuration files.

use lantern_module_utils::placeholders::Interpolation;
use serde::{de::Error as _, Deserialize, Deserializer};

/// Status code used by redirects unless configured otherwise
pub const DEFAULT_REDIRECT_STATUS: u16 = 302;

fn default_redirect_status() -> u16 {
    DEFAULT_REDIRECT_STATUS
}

fn deserialize_redirect_status<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Status {
        Code(u16),
        Name(String),
    }

    match Status::deserialize(deserializer)? {
        Status::Code(code) => Ok(code),
        Status::Name(name) => match name.as_str() {
            "temporary" => Ok(302),
            "permanent" => Ok(301),
            name => name.parse().map_err(|_| {
                D::Error::custom(format!(
                    "unknown redirect status {name}, expected a number, temporary or permanent"
                ))
            }),
        },
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RedirectConfForm {
    Short(Interpolation),
    Full {
        to: Interpolation,
        #[serde(
            default = "default_redirect_status",
            deserialize_with = "deserialize_redirect_status"
        )]
        status: u16,
    },
}

/// Configuration of a `redir` directive
///
/// The short form `redir: /target` is equivalent to `redir: {to: /target, status: 302}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RedirectConfForm")]
pub struct RedirectConf {
    /// Redirect target, placeholders like `{path}` are resolved.
    pub to: Interpolation,

    /// Redirect status, one of the 3xx codes. `temporary` (302) and `permanent` (301) are
    /// accepted in configuration files as well.
    pub status: u16,
}

impl From<RedirectConfForm> for RedirectConf {
    fn from(value: RedirectConfForm) -> Self {
        match value {
            RedirectConfForm::Short(to) => Self {
                to,
                status: DEFAULT_REDIRECT_STATUS,
            },
            RedirectConfForm::Full { to, status } => Self { to, status },
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RewriteConfForm {
    Short(Interpolation),
    Full { to: Interpolation },
}

/// Configuration of a `rewrite` directive
///
/// The short form `rewrite: /target` is equivalent to `rewrite: {to: /target}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RewriteConfForm")]
pub struct RewriteConf {
    /// New path and optionally query string. Placeholders are resolved. The current query string
    /// is kept unless the target contains `?`.
    pub to: Interpolation,
}

impl From<RewriteConfForm> for RewriteConf {
    fn from(value: RewriteConfForm) -> Self {
        match value {
            RewriteConfForm::Short(to) | RewriteConfForm::Full { to } => Self { to },
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TryFilesConfForm {
    Short(Vec<Interpolation>),
    Full { files: Vec<Interpolation> },
}

/// Configuration of a `try_files` directive
///
/// The short form `try_files: [...]` is equivalent to `try_files: {files: [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "TryFilesConfForm")]
pub struct TryFilesConf {
    /// Candidates to probe in order. A candidate ending with `/` has to be a directory, other
    /// candidates have to be files. The last candidate can be a status code like `=404`.
    pub files: Vec<Interpolation>,
}

impl From<TryFilesConfForm> for TryFilesConf {
    fn from(value: TryFilesConfForm) -> Self {
        match value {
            TryFilesConfForm::Short(files) | TryFilesConfForm::Full { files } => Self { files },
        }
    }
}
