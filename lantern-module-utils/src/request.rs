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

//! State of a request while it travels through the directive pipeline

use bytes::Bytes;
use http::uri::PathAndQuery;
use http::{header, HeaderMap, Method, Request, Response, Uri};
use log::trace;
use std::borrow::Cow;
use std::sync::Arc;

use crate::placeholders::Interpolation;
use crate::transform::BodyTransform;
use crate::{Error, ErrorType};

/// Per-request state owned by a single pipeline execution
///
/// The current URI starts out as the URI of the incoming request. Rewrites replace it, the
/// original URI stays available for handlers that need it.
#[derive(Debug)]
pub struct RequestState {
    method: Method,
    scheme: String,
    authority: Option<String>,
    original_uri: Uri,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    tail: String,
    rewrites: usize,
    transforms: Vec<Arc<dyn BodyTransform>>,
}

fn origin_form(uri: &Uri) -> Uri {
    let path_and_query = uri
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));
    Uri::from(path_and_query)
}

impl From<Request<Bytes>> for RequestState {
    fn from(request: Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        let uri = origin_form(&parts.uri);
        Self {
            method: parts.method,
            scheme: parts.uri.scheme_str().unwrap_or("http").to_owned(),
            authority: parts.uri.authority().map(|a| a.as_str().to_owned()),
            original_uri: uri.clone(),
            uri,
            headers: parts.headers,
            body,
            tail: String::new(),
            rewrites: 0,
            transforms: Vec::new(),
        }
    }
}

impl RequestState {
    /// Creates a request state for a body-less request, mostly useful in tests.
    pub fn new(method: Method, uri: &str) -> Result<Self, Box<Error>> {
        let uri: Uri = uri.parse().map_err(|err| {
            Error::because(
                ErrorType::HTTPStatus(400),
                format!("failed parsing request URI {uri}"),
                err,
            )
        })?;
        let mut request = Request::new(Bytes::new());
        *request.method_mut() = method;
        *request.uri_mut() = uri;
        Ok(request.into())
    }

    /// Returns the request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the request headers for modification.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Returns the request body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the URI scheme, `http` unless the request specified an absolute URI.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Attempts to determine the request host if one was specified.
    pub fn host(&self) -> Option<Cow<'_, str>> {
        self.headers
            .get(header::HOST)
            .and_then(|host| host.to_str().ok())
            .map(Cow::from)
            .or_else(|| self.authority.as_deref().map(Cow::from))
    }

    /// Returns the current request URI in origin form (path and query).
    ///
    /// This might not be the original request URI but one modified by a rewrite.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the current path, the one matchers and file serving operate on.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Returns the current query string if any.
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Returns the URI of the request before any rewrites.
    pub fn original_uri(&self) -> &Uri {
        &self.original_uri
    }

    /// Returns the path of the request before any rewrites.
    pub fn original_path(&self) -> &str {
        self.original_uri.path()
    }

    /// Replaces the current URI. The original URI is retained.
    pub fn set_uri(&mut self, uri: Uri) {
        trace!("Changing request URI from {} to {uri}", self.uri);
        self.uri = origin_form(&uri);
    }

    /// Performs an internal rewrite to the given target. If the target contains a query string
    /// it replaces the current one, otherwise the current query string is kept.
    ///
    /// Targets that aren’t valid origin-form URIs (e.g. not starting with `/`) produce an error.
    pub fn rewrite(&mut self, target: &str) -> Result<(), Box<Error>> {
        if !target.starts_with('/') {
            return Err(Error::explain(
                ErrorType::InternalError,
                format!("rewrite target {target:?} is not an absolute path"),
            ));
        }

        let target = match (target.contains('?'), self.uri.query()) {
            (false, Some(query)) => Cow::from(format!("{target}?{query}")),
            _ => Cow::from(target),
        };

        let uri = Uri::try_from(target.as_ref()).map_err(|err| {
            Error::because(
                ErrorType::InternalError,
                format!("could not parse {target:?} as URI"),
                err,
            )
        })?;
        self.set_uri(uri);
        self.rewrites += 1;
        Ok(())
    }

    /// Returns the number of internal rewrites successfully applied to this request so far.
    pub fn rewrite_count(&self) -> usize {
        self.rewrites
    }

    /// Sets the path suffix captured by the matcher of the directive currently running.
    pub fn set_tail(&mut self, tail: impl Into<String>) {
        self.tail = tail.into();
    }

    /// Returns the path suffix captured by the matcher of the directive currently running.
    pub fn tail(&self) -> &str {
        &self.tail
    }

    /// Resolves a placeholder name to its value for the current request state. Returns `None`
    /// for unknown placeholders.
    ///
    /// Supported placeholders: `path`, `query`, `uri`, `method`, `host`, `scheme`,
    /// `original_path`, `file`, `dir`, `ext`, `tail` and `header.<Name>`.
    pub fn placeholder(&self, name: &str) -> Option<Cow<'_, str>> {
        let path = self.path();
        let value = match name {
            "path" => Cow::from(path),
            "query" => Cow::from(self.query().unwrap_or("")),
            "uri" => Cow::from(self.uri.to_string()),
            "method" => Cow::from(self.method.as_str()),
            "host" => self.host().unwrap_or_default(),
            "scheme" => Cow::from(self.scheme.as_str()),
            "original_path" => Cow::from(self.original_path()),
            "file" => Cow::from(path.rsplit_once('/').map_or(path, |(_, file)| file)),
            "dir" => Cow::from(
                path.rsplit_once('/')
                    .map_or("/", |(dir, _)| &path[..dir.len() + 1]),
            ),
            "ext" => {
                let file = path.rsplit_once('/').map_or(path, |(_, file)| file);
                Cow::from(file.rfind('.').map_or("", |index| &file[index..]))
            }
            "tail" => Cow::from(self.tail.as_str()),
            name => {
                let header = name.strip_prefix("header.")?;
                Cow::from(
                    self.headers
                        .get(header)
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or(""),
                )
            }
        };
        Some(value)
    }

    /// Substitutes placeholders in the given expression with values from the request state.
    pub fn interpolate(&self, expression: &Interpolation) -> String {
        expression.interpolate(|name, result| {
            if let Some(value) = self.placeholder(name) {
                result.push_str(&value);
                true
            } else {
                false
            }
        })
    }

    /// Registers a transformation of the response body, to be applied when a handler serving
    /// local content finalizes its response.
    pub fn add_transform(&mut self, transform: Arc<dyn BodyTransform>) {
        trace!("Registering response transform {transform:?}");
        self.transforms.push(transform);
    }

    /// Returns `true` if any response transforms have been registered.
    pub fn has_transforms(&self) -> bool {
        !self.transforms.is_empty()
    }

    /// Applies registered transforms to the response. Transforms registered earlier wrap the
    /// ones registered later, so the transform registered last is applied first.
    pub fn finalize(
        &mut self,
        mut response: Response<Bytes>,
    ) -> Result<Response<Bytes>, Box<Error>> {
        let transforms = std::mem::take(&mut self.transforms);
        for transform in transforms.iter().rev() {
            response = transform.transform(self, response)?;
        }
        Ok(response)
    }

    /// Produces the request to be forwarded upstream: current method, current URI, headers and
    /// body.
    pub fn to_upstream_request(&self) -> Request<Bytes> {
        let mut request = Request::new(self.body.clone());
        *request.method_mut() = self.method.clone();
        *request.uri_mut() = self.uri.clone();
        *request.headers_mut() = self.headers.clone();
        request
    }

    /// Returns the value of the `Accept-Encoding` request header if present.
    pub fn accept_encoding(&self) -> Option<&str> {
        self.headers
            .get(header::ACCEPT_ENCODING)
            .and_then(|value| value.to_str().ok())
    }
}
