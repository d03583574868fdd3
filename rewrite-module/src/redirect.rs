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

//! Handler of `redir` directives

use async_trait::async_trait;
use http::StatusCode;
use lantern_module_utils::placeholders::Interpolation;
use lantern_module_utils::standard_response::redirect_response;
use lantern_module_utils::{
    configuration_error, DirectiveHandler, Error, HandlerResult, RequestState, Services,
};
use log::{debug, info};

use crate::configuration::RedirectConf;

/// Produces a client-visible redirect to the configured target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectHandler {
    to: Interpolation,
    status: StatusCode,
}

impl TryFrom<RedirectConf> for RedirectHandler {
    type Error = Box<Error>;

    fn try_from(conf: RedirectConf) -> Result<Self, Self::Error> {
        debug!("Redirect configuration received: {conf:#?}");

        let status = StatusCode::from_u16(conf.status)
            .ok()
            .filter(StatusCode::is_redirection)
            .ok_or_else(|| {
                configuration_error(format!(
                    "redirect status has to be a 3xx status code, got {}",
                    conf.status
                ))
            })?;

        Ok(Self {
            to: conf.to,
            status,
        })
    }
}

#[async_trait]
impl DirectiveHandler for RedirectHandler {
    type Conf = RedirectConf;

    async fn handle(
        &self,
        request: &mut RequestState,
        _services: &Services<'_>,
    ) -> Result<HandlerResult, Box<Error>> {
        let location = request.interpolate(&self.to);
        info!(
            "Redirecting {} to {location} with status {}",
            request.path(),
            self.status.as_u16()
        );
        Ok(HandlerResult::Respond(redirect_response(
            request,
            self.status,
            &location,
        )?))
    }
}
