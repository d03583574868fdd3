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

//! Structures required to deserialize the directive pipeline from YAML configuration files.

use compression_module::configuration::EncodeConf;
use lantern_module_utils::matcher::MatcherConf;
use response_module::RespondConf;
use rewrite_module::configuration::{RedirectConf, RewriteConf, TryFilesConf};
use serde::Deserialize;
use static_files_module::configuration::{FileServerConf, TemplatesConf};
use upstream_module::ReverseProxyConf;

/// Handler part of a directive, the key determines the handler kind
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerConf {
    /// Client-visible redirect
    #[serde(rename = "redir")]
    Redirect(RedirectConf),
    /// Internal rewrite of the request path
    Rewrite(RewriteConf),
    /// Rewrite to the first existing candidate
    TryFiles(TryFilesConf),
    /// Serving files from the resource backend
    FileServer(FileServerConf),
    /// Executing served files as templates
    Templates(TemplatesConf),
    /// Dynamic compression of served files
    Encode(EncodeConf),
    /// Forwarding to an upstream server
    ReverseProxy(ReverseProxyConf),
    /// Fixed response
    Respond(RespondConf),
}

impl HandlerConf {
    /// Returns the configuration key of this handler kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Redirect(_) => "redir",
            Self::Rewrite(_) => "rewrite",
            Self::TryFiles(_) => "try_files",
            Self::FileServer(_) => "file_server",
            Self::Templates(_) => "templates",
            Self::Encode(_) => "encode",
            Self::ReverseProxy(_) => "reverse_proxy",
            Self::Respond(_) => "respond",
        }
    }
}

/// Configuration of a single directive: one handler key plus optional matcher keys
///
/// ```yaml
/// rewrite: /docs/index.html
/// match: /docs/*
/// method: [GET, HEAD]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DirectiveConf {
    /// Handler kind and its settings
    #[serde(flatten)]
    pub handler: HandlerConf,

    /// Conditions restricting which requests the directive applies to
    #[serde(flatten)]
    pub matcher: MatcherConf,
}

/// Configuration of the directive pipeline
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PipelineConf {
    /// Directives in the order they are processed
    pub directives: Vec<DirectiveConf>,
}
