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

//! Handler of `rewrite` directives

use async_trait::async_trait;
use lantern_module_utils::placeholders::Interpolation;
use lantern_module_utils::{DirectiveHandler, Error, HandlerResult, RequestState, Services};
use log::{debug, error, trace};

use crate::configuration::RewriteConf;

/// Replaces the current request path, invisible to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteHandler {
    to: Interpolation,
}

impl TryFrom<RewriteConf> for RewriteHandler {
    type Error = Box<Error>;

    fn try_from(conf: RewriteConf) -> Result<Self, Self::Error> {
        debug!("Rewrite configuration received: {conf:#?}");
        Ok(Self { to: conf.to })
    }
}

#[async_trait]
impl DirectiveHandler for RewriteHandler {
    type Conf = RewriteConf;

    async fn handle(
        &self,
        request: &mut RequestState,
        _services: &Services<'_>,
    ) -> Result<HandlerResult, Box<Error>> {
        let target = request.interpolate(&self.to);
        trace!("Rewriting {} into {target}", request.path());

        if let Err(err) = request.rewrite(&target) {
            error!("Ignoring unusable rewrite target: {err}");
        }
        Ok(HandlerResult::Continue)
    }
}
