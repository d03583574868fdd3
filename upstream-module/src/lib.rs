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

//! # Upstream Module for Lantern Web Server
//!
//! This crate contains the `reverse_proxy` directive handler forwarding requests to an upstream
//! server. The actual connection handling is left to an [`UpstreamDispatcher`] implementation,
//! this handler only selects the upstream and prepares the request.
//!
//! ```yaml
//! directives:
//! - reverse_proxy: http://127.0.0.1:8081
//!   match: {prefix: /api}
//! - reverse_proxy:
//!     upstream: https://example.com
//!     preserve_host: true
//!   match: /proxied/*
//! ```
//!
//! Supported URL schemes are `http://` and `https://`, a bare `host:port` value means `http://`.
//! Other than the scheme, only host name and port are considered. Other parts of the URL are
//! ignored if present.
//!
//! The request is forwarded with its method, headers, body and the current, possibly rewritten
//! URI. The `Host` header is set to the upstream host unless `preserve_host` is enabled. The
//! upstream response is returned as is, response transforms like `templates` or `encode` don’t
//! apply to it.

use async_trait::async_trait;
use bytes::Bytes;
use http::uri::{Scheme, Uri};
use http::{header, HeaderValue, Request, Response, StatusCode};
use lantern_module_utils::standard_response::{error_response, error_status};
use lantern_module_utils::{
    configuration_error, Cancellation, DirectiveHandler, Error, ErrorType, HandlerResult,
    RequestState, Services, Upstream, UpstreamDispatcher, CONFIGURATION_ERROR,
};
use log::{debug, info, trace, warn};
use serde::{
    de::{Deserializer, Error as _},
    Deserialize,
};

fn deserialize_uri<'de, D>(d: D) -> Result<Uri, D::Error>
where
    D: Deserializer<'de>,
{
    let uri = String::deserialize(d)?;
    parse_upstream_uri(&uri)
        .map_err(|err| D::Error::custom(format!("URL {uri} could not be parsed: {err}")))
}

/// Parses an upstream address, adding the `http://` scheme to bare `host:port` values.
pub fn parse_upstream_uri(value: &str) -> Result<Uri, http::uri::InvalidUri> {
    if value.contains("://") {
        value.parse()
    } else {
        format!("http://{value}").parse()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ReverseProxyConfForm {
    Short(#[serde(deserialize_with = "deserialize_uri")] Uri),
    Full {
        #[serde(deserialize_with = "deserialize_uri")]
        upstream: Uri,
        #[serde(default)]
        preserve_host: bool,
    },
}

/// Configuration of a `reverse_proxy` directive
///
/// The short form `reverse_proxy: <upstream>` is equivalent to
/// `reverse_proxy: {upstream: <upstream>}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "ReverseProxyConfForm")]
pub struct ReverseProxyConf {
    /// http:// or https:// URL identifying the server that requests should be forwarded to.
    /// Path and query parts of the URL have no effect.
    pub upstream: Uri,

    /// If `true`, the `Host` header of the request is passed on unchanged.
    pub preserve_host: bool,
}

impl From<ReverseProxyConfForm> for ReverseProxyConf {
    fn from(value: ReverseProxyConfForm) -> Self {
        match value {
            ReverseProxyConfForm::Short(upstream) => Self {
                upstream,
                preserve_host: false,
            },
            ReverseProxyConfForm::Full {
                upstream,
                preserve_host,
            } => Self {
                upstream,
                preserve_host,
            },
        }
    }
}

/// Forwards requests to the configured upstream server
#[derive(Debug, Clone)]
pub struct ReverseProxyHandler {
    upstream: Upstream,
    host_header: HeaderValue,
    preserve_host: bool,
}

impl TryFrom<ReverseProxyConf> for ReverseProxyHandler {
    type Error = Box<Error>;

    fn try_from(conf: ReverseProxyConf) -> Result<Self, Self::Error> {
        debug!("Reverse proxy configuration received: {conf:#?}");

        let upstream = conf.upstream;
        let scheme = upstream.scheme().ok_or_else(|| {
            configuration_error(format!("provided upstream URL has no scheme: {upstream}"))
        })?;

        let tls = if scheme == &Scheme::HTTP {
            false
        } else if scheme == &Scheme::HTTPS {
            true
        } else {
            return Err(configuration_error(format!(
                "provided upstream URL is neither HTTP nor HTTPS: {upstream}"
            )));
        };

        let host = upstream.host().filter(|host| !host.is_empty()).ok_or_else(|| {
            configuration_error(format!("provided upstream URL has no host name: {upstream}"))
        })?;

        let port = upstream.port_u16().unwrap_or(if tls { 443 } else { 80 });

        let mut host_port = host.to_owned();
        if let Some(port) = upstream.port() {
            host_port.push(':');
            host_port.push_str(port.as_str());
        }

        let host_header = HeaderValue::from_str(&host_port).map_err(|err| {
            Error::because(
                CONFIGURATION_ERROR,
                format!("upstream host {host_port} isn't a valid Host header"),
                err,
            )
        })?;

        Ok(Self {
            upstream: Upstream {
                host: host.to_owned(),
                port,
                tls,
                host_port,
            },
            host_header,
            preserve_host: conf.preserve_host,
        })
    }
}

impl ReverseProxyHandler {
    /// Returns the upstream server requests are forwarded to.
    pub fn upstream(&self) -> &Upstream {
        &self.upstream
    }
}

#[async_trait]
impl DirectiveHandler for ReverseProxyHandler {
    type Conf = ReverseProxyConf;

    async fn handle(
        &self,
        request: &mut RequestState,
        services: &Services<'_>,
    ) -> Result<HandlerResult, Box<Error>> {
        let mut upstream_request = request.to_upstream_request();
        if !self.preserve_host {
            upstream_request
                .headers_mut()
                .insert(header::HOST, self.host_header.clone());
        }

        trace!(
            "Forwarding {} {} to {}",
            upstream_request.method(),
            upstream_request.uri(),
            self.upstream
        );

        let response = match services
            .upstream
            .forward(upstream_request, &self.upstream, services.cancellation)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!("Forwarding request to {} failed: {err}", self.upstream);
                let status = match err.etype() {
                    ErrorType::HTTPStatus(code) => {
                        error_status(*code).unwrap_or(StatusCode::BAD_GATEWAY)
                    }
                    _ => StatusCode::BAD_GATEWAY,
                };
                error_response(request, status)
            }
        };

        info!(
            "Upstream {} responded to {} with {}",
            self.upstream,
            request.path(),
            response.status()
        );
        Ok(HandlerResult::Respond(response))
    }
}

/// Dispatcher for setups without upstream connectivity, every forwarding attempt fails with a
/// connection error.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableDispatcher;

#[async_trait]
impl UpstreamDispatcher for UnavailableDispatcher {
    async fn forward(
        &self,
        _request: Request<Bytes>,
        upstream: &Upstream,
        _cancellation: &Cancellation,
    ) -> Result<Response<Bytes>, Box<Error>> {
        Err(Error::explain(
            ErrorType::ConnectRefused,
            format!("no connection to upstream {upstream} available"),
        ))
    }
}
