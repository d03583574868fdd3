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

//! The directive pipeline processing requests

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use lantern_module_utils::standard_response::{error_response, status_for_error};
use lantern_module_utils::{
    Cancellation, Error, ErrorType, HandlerResult, RequestState, ResourceBackend, Services,
    UpstreamDispatcher,
};
use log::{debug, error, info, trace};
use std::sync::Arc;

use crate::configuration::PipelineConf;
use crate::directive::{Directive, Handler};

/// Processes requests by running them through an ordered list of directives
///
/// Each request makes a single forward pass through the directives: a directive whose matcher
/// applies to the current request state runs its handler, which either produces the response or
/// lets the request continue with the next directive. Directives already passed are never
/// revisited, even if a later rewrite changes the path. `rewrite` directives are mutually
/// exclusive: once one of them changed the request, the remaining `rewrite` directives are
/// skipped. A `rewrite` directive with an unusable target doesn't count. A request
/// reaching the end of the list receives 404 Not Found.
///
/// A pipeline is immutable and can process any number of requests concurrently.
#[derive(Debug)]
pub struct Pipeline {
    directives: Vec<Directive>,
    backend: Arc<dyn ResourceBackend>,
    upstream: Arc<dyn UpstreamDispatcher>,
}

impl Pipeline {
    /// Creates a pipeline from a list of directives. Directives are processed in the order given.
    pub fn new(
        directives: Vec<Directive>,
        backend: Arc<dyn ResourceBackend>,
        upstream: Arc<dyn UpstreamDispatcher>,
    ) -> Self {
        Self {
            directives,
            backend,
            upstream,
        }
    }

    /// Creates a pipeline from configuration. Any invalid directive results in an error.
    pub fn from_conf(
        conf: PipelineConf,
        backend: Arc<dyn ResourceBackend>,
        upstream: Arc<dyn UpstreamDispatcher>,
    ) -> Result<Self, Box<Error>> {
        let directives = conf
            .directives
            .into_iter()
            .enumerate()
            .map(|(order_index, conf)| Directive::from_conf(conf, order_index))
            .collect::<Result<Vec<_>, _>>()?;
        debug!("Created pipeline with {} directives", directives.len());

        Ok(Self::new(directives, backend, upstream))
    }

    /// Returns the directives of this pipeline in processing order.
    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    /// Processes a request and produces its response. This never fails, errors are turned into
    /// standard error responses.
    pub async fn handle(&self, request: Request<Bytes>) -> Response<Bytes> {
        let mut state = RequestState::from(request);
        let cancellation = Cancellation::new();
        match self.process(&mut state, &cancellation).await {
            Some(response) => response,
            // Nothing triggers this signal
            None => error_response(&state, StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    /// Processes a request unless it is cancelled. Cancellation abandons any resource backend or
    /// upstream operation in progress, no response is produced then.
    pub async fn handle_cancellable(
        &self,
        request: Request<Bytes>,
        cancellation: &Cancellation,
    ) -> Option<Response<Bytes>> {
        let mut state = RequestState::from(request);
        self.process(&mut state, cancellation).await
    }

    async fn process(
        &self,
        request: &mut RequestState,
        cancellation: &Cancellation,
    ) -> Option<Response<Bytes>> {
        let services = Services {
            backend: self.backend.as_ref(),
            upstream: self.upstream.as_ref(),
            cancellation,
        };

        let mut rewritten = false;
        for directive in &self.directives {
            let is_rewrite = matches!(directive.handler(), Handler::Rewrite(_));
            if is_rewrite && rewritten {
                trace!(
                    "Skipping directive {}, request has been rewritten already",
                    directive.order_index()
                );
                continue;
            }

            let Some(tail) = directive.matcher().matches(request) else {
                trace!(
                    "Directive {} doesn’t apply to {}",
                    directive.order_index(),
                    request.path()
                );
                continue;
            };

            trace!(
                "Running directive {} for {}, tail {tail:?}",
                directive.order_index(),
                request.path()
            );
            request.set_tail(tail);

            let rewrites = request.rewrite_count();
            let result = cancellation
                .run(directive.handler().handle(request, &services))
                .await;
            match result {
                None => {
                    debug!("Request for {} cancelled", request.original_path());
                    return None;
                }
                Some(Ok(HandlerResult::Continue)) => {
                    rewritten |= is_rewrite && request.rewrite_count() > rewrites;
                }
                Some(Ok(HandlerResult::Respond(response))) => {
                    trace!(
                        "Directive {} responded with status {}",
                        directive.order_index(),
                        response.status()
                    );
                    return Some(response);
                }
                Some(Err(err)) => return Some(Self::failure(request, &err)),
            }
        }

        info!("No directive produced a response for {}", request.path());
        Some(error_response(request, StatusCode::NOT_FOUND))
    }

    fn failure(request: &RequestState, err: &Error) -> Response<Bytes> {
        let status = status_for_error(err);
        if matches!(err.etype(), ErrorType::HTTPStatus(_)) {
            info!("Request for {} failed with status {status}: {err}", request.path());
        } else {
            error!("Request for {} failed: {err}", request.path());
        }
        error_response(request, status)
    }
}
