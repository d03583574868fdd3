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

//! Handler of `try_files` directives

use async_trait::async_trait;
use http::StatusCode;
use lantern_module_utils::placeholders::Interpolation;
use lantern_module_utils::standard_response::error_response;
use lantern_module_utils::{
    configuration_error, DirectiveHandler, Error, HandlerResult, RequestState, ResourceKind,
    Services,
};
use log::{debug, info, trace, warn};

use crate::configuration::TryFilesConf;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Candidate {
    Path(Interpolation),
    Status(StatusCode),
}

impl TryFrom<Interpolation> for Candidate {
    type Error = Box<Error>;

    fn try_from(value: Interpolation) -> Result<Self, Self::Error> {
        if !value.is_literal() {
            return Ok(Self::Path(value));
        }

        let literal = value.to_string();
        if let Some(status) = literal.strip_prefix('=') {
            let status = status
                .parse()
                .ok()
                .and_then(|status| StatusCode::from_u16(status).ok())
                .ok_or_else(|| {
                    configuration_error(format!("invalid try_files status candidate {literal}"))
                })?;
            Ok(Self::Status(status))
        } else {
            Ok(Self::Path(value))
        }
    }
}

/// Probes a list of candidates and rewrites the request to the first one that exists
///
/// Probing never produces a response by itself. If no candidate exists, the request is left
/// unchanged for the directives that follow. Only a status candidate like `=404` terminates the
/// request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryFilesHandler {
    candidates: Vec<Candidate>,
}

impl TryFrom<TryFilesConf> for TryFilesHandler {
    type Error = Box<Error>;

    fn try_from(conf: TryFilesConf) -> Result<Self, Self::Error> {
        debug!("TryFiles configuration received: {conf:#?}");

        if conf.files.is_empty() {
            return Err(configuration_error("try_files needs at least one candidate"));
        }

        let candidates = conf
            .files
            .into_iter()
            .map(Candidate::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let status_position = candidates
            .iter()
            .position(|candidate| matches!(candidate, Candidate::Status(_)));
        if let Some(position) = status_position {
            if position + 1 != candidates.len() {
                return Err(configuration_error(
                    "a try_files status candidate can only be the last one",
                ));
            }
        }

        Ok(Self { candidates })
    }
}

#[async_trait]
impl DirectiveHandler for TryFilesHandler {
    type Conf = TryFilesConf;

    async fn handle(
        &self,
        request: &mut RequestState,
        services: &Services<'_>,
    ) -> Result<HandlerResult, Box<Error>> {
        for candidate in &self.candidates {
            let expression = match candidate {
                Candidate::Status(status) => {
                    info!("No candidate found for {}, responding with {status}", request.path());
                    return Ok(HandlerResult::Respond(error_response(request, *status)));
                }
                Candidate::Path(expression) => expression,
            };

            let resolved = request.interpolate(expression);
            let path = resolved
                .split_once('?')
                .map_or(resolved.as_str(), |(path, _)| path);
            if !path.starts_with('/') {
                warn!("Skipping try_files candidate {resolved}, not an absolute path");
                continue;
            }

            let expected = if path.ends_with('/') {
                ResourceKind::Directory
            } else {
                ResourceKind::File
            };

            let kind = services.backend.exists(path, services.cancellation).await?;
            trace!("Candidate {path} resolved as {kind:?}");
            if kind == expected {
                info!("Using try_files candidate {resolved} for {}", request.path());
                request.rewrite(&resolved)?;
                return Ok(HandlerResult::Continue);
            }
        }

        trace!("No try_files candidate exists for {}", request.path());
        Ok(HandlerResult::Continue)
    }
}
