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

//! Response body transforms registered by non-terminal directives

use bytes::Bytes;
use http::Response;
use std::fmt::Debug;

use crate::{Error, RequestState};

/// A transformation applied to the response produced by a later directive
///
/// Directives like `templates` and `encode` don’t produce responses themselves. Instead they
/// register a transform via [`RequestState::add_transform`], the directive serving the file then
/// calls [`RequestState::finalize`]. Transforms run in reverse registration order: the one
/// registered last sees the response first.
pub trait BodyTransform: Debug + Send + Sync {
    /// Transforms the response. Returning an error results in a 500 Internal Server Error
    /// response unless the error carries a different status.
    fn transform(
        &self,
        request: &RequestState,
        response: Response<Bytes>,
    ) -> Result<Response<Bytes>, Box<Error>>;
}
