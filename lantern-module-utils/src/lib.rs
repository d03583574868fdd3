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

//! # Module helpers
//!
//! This crate contains the pieces shared by Lantern Web Server and its directive handlers: the
//! per-request state that handlers inspect and modify, placeholder interpolation, path matchers,
//! the interfaces of the resource backend and the upstream dispatcher, standard responses and
//! configuration loading helpers.
//!
//! A directive handler implements [`DirectiveHandler`]. It receives the request state and the
//! [`Services`] of the current request and either terminates the request with a response or lets
//! the pipeline continue with the next directive:
//!
//! ```rust
//! use async_trait::async_trait;
//! use lantern_module_utils::{
//!     DirectiveHandler, Error, HandlerResult, RequestState, Services,
//! };
//!
//! #[derive(Debug)]
//! struct Uppercase;
//!
//! #[async_trait]
//! impl DirectiveHandler for Uppercase {
//!     type Conf = ();
//!
//!     async fn handle(
//!         &self,
//!         request: &mut RequestState,
//!         _services: &Services<'_>,
//!     ) -> Result<HandlerResult, Box<Error>> {
//!         let path = request.path().to_uppercase();
//!         request.rewrite(&path)?;
//!         Ok(HandlerResult::Continue)
//!     }
//! }
//! ```

pub mod backend;
pub mod cancellation;
pub mod compression_algorithm;
mod deserialize;
pub mod matcher;
pub mod placeholders;
pub mod request;
pub mod standard_response;
pub mod transform;

use async_trait::async_trait;
use bytes::Bytes;
use http::Response;
use log::trace;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub use backend::{ResourceBackend, ResourceKind, Upstream, UpstreamDispatcher};
pub use cancellation::Cancellation;
pub use deserialize::OneOrMany;
pub use pingora_error::{Error, ErrorType, OrErr};
pub use request::RequestState;

/// Error type of configuration problems detected while building directives
pub const CONFIGURATION_ERROR: ErrorType = ErrorType::Custom("ConfigurationError");

/// Produces a configuration error with the given explanation.
pub fn configuration_error(explanation: impl Into<String>) -> Box<Error> {
    Error::explain(CONFIGURATION_ERROR, explanation.into())
}

/// Directive handler result indicating how the current request should be processed further
#[derive(Debug)]
pub enum HandlerResult {
    /// The request is complete, the response should be produced. No further directives run.
    Respond(Response<Bytes>),

    /// The request state might have been changed, the pipeline should proceed with the next
    /// directive.
    Continue,
}

impl HandlerResult {
    /// Returns `true` if this result terminates the request.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Respond(_))
    }
}

/// External collaborators available to handlers while processing a request
#[derive(Debug, Clone, Copy)]
pub struct Services<'a> {
    /// Existence and content lookups for root-relative paths
    pub backend: &'a dyn ResourceBackend,
    /// Forwards requests to upstream servers
    pub upstream: &'a dyn UpstreamDispatcher,
    /// Signals that the client went away and processing should stop
    pub cancellation: &'a Cancellation,
}

/// Trait to be implemented by directive handlers.
///
/// Handlers are immutable once created. All per-request state lives in [`RequestState`], so the
/// same handler can process any number of requests concurrently.
#[async_trait]
pub trait DirectiveHandler: Debug + Send + Sync {
    /// Configuration type of this handler.
    type Conf;

    /// Creates a new instance of the handler from its configuration.
    fn from_conf(conf: Self::Conf) -> Result<Self, Box<Error>>
    where
        Self: Sized + TryFrom<Self::Conf, Error = Box<Error>>,
    {
        conf.try_into()
    }

    /// Processes the request. Errors returned here are turned into an error response by the
    /// pipeline, they never reach the client in any other form.
    async fn handle(
        &self,
        request: &mut RequestState,
        services: &Services<'_>,
    ) -> Result<HandlerResult, Box<Error>>;
}

/// Trait for configuration structures that can be loaded from YAML data. This trait has a blanket
/// implementation for any structure implementing [`serde::Deserialize`].
pub trait FromYaml {
    /// Loads configuration from a YAML file.
    fn load_from_yaml<P>(path: P) -> Result<Self, Box<Error>>
    where
        P: AsRef<Path>,
        Self: Sized;

    /// Loads configuration from a YAML string.
    fn from_yaml(yaml_conf: impl AsRef<str>) -> Result<Self, Box<Error>>
    where
        Self: Sized;
}

impl<D> FromYaml for D
where
    D: DeserializeOwned + Debug + ?Sized,
{
    fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<Error>> {
        let file = File::open(path.as_ref()).map_err(|err| {
            Error::because(
                ErrorType::FileOpenError,
                format!("failed opening configuration file {:?}", path.as_ref()),
                err,
            )
        })?;
        let reader = BufReader::new(file);

        let conf = serde_yaml::from_reader(reader).map_err(|err| {
            Error::because(
                ErrorType::FileReadError,
                "failed reading configuration file",
                err,
            )
        })?;
        trace!("Loaded configuration file: {conf:#?}");

        Ok(conf)
    }

    fn from_yaml(yaml_conf: impl AsRef<str>) -> Result<Self, Box<Error>> {
        let conf = serde_yaml::from_str(yaml_conf.as_ref()).map_err(|err| {
            Error::because(CONFIGURATION_ERROR, "failed parsing configuration", err)
        })?;
        trace!("Loaded configuration: {conf:#?}");

        Ok(conf)
    }
}
