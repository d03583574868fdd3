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

//! Standard responses for various conditions

use bytes::Bytes;
use http::{header, HeaderValue, Method, Response, StatusCode};
use maud::{html, DOCTYPE};

use crate::{Error, ErrorType, RequestState};

/// Produces the text of a standard response page for the given status code.
pub fn response_text(status: StatusCode) -> String {
    let status_str = status.as_str();
    let reason = status.canonical_reason().unwrap_or("");
    html! {
        (DOCTYPE)
        html {
            head {
                title {
                    (status_str) " " (reason)
                }
            }

            body {
                center {
                    h1 {
                        (status_str) " " (reason)
                    }
                }
            }
        }
    }
    .into()
}

fn response(method: &Method, status: StatusCode, location: Option<HeaderValue>) -> Response<Bytes> {
    let text = response_text(status);

    let mut response = Response::new(Bytes::new());
    *response.status_mut() = status;

    let headers = response.headers_mut();
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(text.len()));
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    if let Some(location) = location {
        headers.insert(header::LOCATION, location);
    }

    if method != Method::HEAD {
        *response.body_mut() = text.into();
    }

    response
}

/// Produces a standard error page for the given status code.
pub fn error_response(request: &RequestState, status: StatusCode) -> Response<Bytes> {
    response(request.method(), status, None)
}

/// Produces a redirect to the given location.
pub fn redirect_response(
    request: &RequestState,
    status: StatusCode,
    location: &str,
) -> Result<Response<Bytes>, Box<Error>> {
    let location = HeaderValue::from_str(location).map_err(|err| {
        Error::because(
            ErrorType::InternalError,
            format!("redirect target {location:?} isn't a valid header value"),
            err,
        )
    })?;
    Ok(response(request.method(), status, Some(location)))
}

/// Converts a status code carried by an error, only 4xx and 5xx codes are accepted.
pub fn error_status(code: u16) -> Option<StatusCode> {
    StatusCode::from_u16(code)
        .ok()
        .filter(|status| status.is_client_error() || status.is_server_error())
}

/// Determines the status code of the response presented for a failed request.
pub fn status_for_error(error: &Error) -> StatusCode {
    match error.etype() {
        ErrorType::HTTPStatus(code) => {
            error_status(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        }
        ErrorType::ConnectTimedout
        | ErrorType::ConnectRefused
        | ErrorType::ConnectNoRoute
        | ErrorType::ConnectError
        | ErrorType::ConnectProxyFailure
        | ErrorType::ConnectionClosed
        | ErrorType::TLSHandshakeFailure => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
