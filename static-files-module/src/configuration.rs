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

//! Structures required to deserialize Static Files Module configuration from YAML configuration
//! files.

use lantern_module_utils::compression_algorithm::CompressionAlgorithm;
use lantern_module_utils::OneOrMany;
use mime_guess::Mime;
use serde::Deserialize;

/// Configuration of a `file_server` directive
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FileServerConf {
    /// File names that are never served, e.g. `.htaccess`. A request is rejected if any segment
    /// of its path matches.
    pub hide: OneOrMany<String>,

    /// List of file extensions to check when looking for pre-compressed versions of a file.
    /// Supported file extensions are gz (gzip), zz (zlib deflate), z (compress), br (Brotli),
    /// zst (Zstandard).
    pub precompressed: OneOrMany<CompressionAlgorithm>,

    /// Path of the page to display instead of the default Not Found page, e.g. /404.html
    pub page_404: Option<String>,
}

/// A MIME type pattern like `text/html`, `text/*`, `*+xml` or `application/vnd.*`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum MimeMatch {
    /// A full MIME type like `text/html`, parameters are ignored
    Exact(String),
    /// Any subtype of the given type, written as `text/*`
    Type(String),
    /// MIME types starting with the given string, written as `application/vnd.*`
    Prefix(String),
    /// MIME types ending with the given string, written as `*+xml`
    Suffix(String),
}

impl TryFrom<&str> for MimeMatch {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let value = value.trim().to_ascii_lowercase();
        if let Some(type_) = value.strip_suffix("/*") {
            Ok(Self::Type(type_.to_owned()))
        } else if let Some(suffix) = value.strip_prefix('*') {
            Ok(Self::Suffix(suffix.to_owned()))
        } else if let Some(prefix) = value.strip_suffix('*') {
            Ok(Self::Prefix(prefix.to_owned()))
        } else {
            let mime = value
                .parse::<Mime>()
                .map_err(|err| format!("Invalid MIME type {value}: {err}"))?;
            Ok(Self::Exact(mime.essence_str().to_owned()))
        }
    }
}

impl TryFrom<String> for MimeMatch {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.as_str().try_into()
    }
}

fn default_mime_types() -> OneOrMany<MimeMatch> {
    vec![
        MimeMatch::Exact("text/html".to_owned()),
        MimeMatch::Exact("text/plain".to_owned()),
        MimeMatch::Exact("text/markdown".to_owned()),
    ]
    .into()
}

#[derive(Deserialize)]
#[serde(default)]
struct TemplatesConfForm {
    mime_types: OneOrMany<MimeMatch>,
}

impl Default for TemplatesConfForm {
    fn default() -> Self {
        Self {
            mime_types: default_mime_types(),
        }
    }
}

/// Configuration of a `templates` directive
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "Option<TemplatesConfForm>")]
pub struct TemplatesConf {
    /// MIME types of responses to be executed as templates, `text/html`, `text/plain` and
    /// `text/markdown` by default.
    pub mime_types: OneOrMany<MimeMatch>,
}

impl Default for TemplatesConf {
    fn default() -> Self {
        Self {
            mime_types: default_mime_types(),
        }
    }
}

impl From<Option<TemplatesConfForm>> for TemplatesConf {
    fn from(value: Option<TemplatesConfForm>) -> Self {
        let mime_types = value.unwrap_or_default().mime_types;
        Self { mime_types }
    }
}
