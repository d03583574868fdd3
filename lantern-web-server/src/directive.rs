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

//! Directives: a matcher combined with one of the known handlers

use compression_module::EncodeHandler;
use lantern_module_utils::matcher::DirectiveMatcher;
use lantern_module_utils::{DirectiveHandler, Error, HandlerResult, RequestState, Services};
use log::debug;
use response_module::RespondHandler;
use rewrite_module::{RedirectHandler, RewriteHandler, TryFilesHandler};
use static_files_module::{FileServerHandler, TemplatesHandler};
use upstream_module::ReverseProxyHandler;

use crate::configuration::{DirectiveConf, HandlerConf};

/// One of the handler kinds a directive can run
#[derive(Debug)]
pub enum Handler {
    /// `redir` directive
    Redirect(RedirectHandler),
    /// `rewrite` directive
    Rewrite(RewriteHandler),
    /// `try_files` directive
    TryFiles(TryFilesHandler),
    /// `file_server` directive
    FileServer(FileServerHandler),
    /// `templates` directive
    Templates(TemplatesHandler),
    /// `encode` directive
    Encode(EncodeHandler),
    /// `reverse_proxy` directive
    ReverseProxy(ReverseProxyHandler),
    /// `respond` directive
    Respond(RespondHandler),
}

impl TryFrom<HandlerConf> for Handler {
    type Error = Box<Error>;

    fn try_from(conf: HandlerConf) -> Result<Self, Self::Error> {
        Ok(match conf {
            HandlerConf::Redirect(conf) => Self::Redirect(RedirectHandler::from_conf(conf)?),
            HandlerConf::Rewrite(conf) => Self::Rewrite(RewriteHandler::from_conf(conf)?),
            HandlerConf::TryFiles(conf) => Self::TryFiles(TryFilesHandler::from_conf(conf)?),
            HandlerConf::FileServer(conf) => {
                Self::FileServer(FileServerHandler::from_conf(conf)?)
            }
            HandlerConf::Templates(conf) => Self::Templates(TemplatesHandler::from_conf(conf)?),
            HandlerConf::Encode(conf) => Self::Encode(EncodeHandler::from_conf(conf)?),
            HandlerConf::ReverseProxy(conf) => {
                Self::ReverseProxy(ReverseProxyHandler::from_conf(conf)?)
            }
            HandlerConf::Respond(conf) => Self::Respond(RespondHandler::from_conf(conf)?),
        })
    }
}

impl Handler {
    /// Runs the handler for the current request state.
    pub async fn handle(
        &self,
        request: &mut RequestState,
        services: &Services<'_>,
    ) -> Result<HandlerResult, Box<Error>> {
        match self {
            Self::Redirect(handler) => handler.handle(request, services).await,
            Self::Rewrite(handler) => handler.handle(request, services).await,
            Self::TryFiles(handler) => handler.handle(request, services).await,
            Self::FileServer(handler) => handler.handle(request, services).await,
            Self::Templates(handler) => handler.handle(request, services).await,
            Self::Encode(handler) => handler.handle(request, services).await,
            Self::ReverseProxy(handler) => handler.handle(request, services).await,
            Self::Respond(handler) => handler.handle(request, services).await,
        }
    }
}

/// A configured directive, immutable once created
#[derive(Debug)]
pub struct Directive {
    matcher: DirectiveMatcher,
    handler: Handler,
    order_index: usize,
}

impl Directive {
    /// Creates a directive from its parts.
    pub fn new(matcher: DirectiveMatcher, handler: Handler, order_index: usize) -> Self {
        Self {
            matcher,
            handler,
            order_index,
        }
    }

    /// Creates a directive from its configuration, `order_index` is its position in the
    /// configured list.
    pub fn from_conf(conf: DirectiveConf, order_index: usize) -> Result<Self, Box<Error>> {
        let kind = conf.handler.kind();
        let context = |err: Box<Error>| {
            Error::because(
                err.etype().clone(),
                format!("invalid directive {order_index} ({kind})"),
                err,
            )
        };
        let matcher = DirectiveMatcher::try_from(conf.matcher).map_err(context)?;
        let handler = Handler::try_from(conf.handler).map_err(context)?;
        debug!("Created directive {order_index} ({kind}) with matcher {matcher:?}");

        Ok(Self::new(matcher, handler, order_index))
    }

    /// Returns the matcher deciding whether the directive applies.
    pub fn matcher(&self) -> &DirectiveMatcher {
        &self.matcher
    }

    /// Returns the handler of the directive.
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Returns the position of the directive in the pipeline.
    pub fn order_index(&self) -> usize {
        self.order_index
    }
}
