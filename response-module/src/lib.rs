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

//! # Response Module for Lantern Web Server
//!
//! This crate contains the `respond` directive handler producing a response from configuration.
//! This is useful for synthetic endpoints, e.g. health checks or placeholder pages:
//!
//! ```yaml
//! directives:
//! - respond: hello from localhost
//!   match: /hello
//! - respond:
//!     body: "{\"status\": \"ok\"}"
//!     status: 200
//!     headers:
//!       Content-Type: application/json
//!   match: /health
//! - respond:
//!     status: 204
//!   match: /empty
//! ```
//!
//! The response is always the configured one, rewrites performed by earlier directives don’t
//! affect it and response transforms like `templates` or `encode` aren’t applied.

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, HeaderName, HeaderValue, Method, Response, StatusCode};
use lantern_module_utils::{DirectiveHandler, Error, HandlerResult, RequestState, Services};
use log::{debug, trace};
use serde::de::{Deserializer, Error as _, MapAccess, Unexpected, Visitor};
use serde::Deserialize;

fn deserialize_status_code<'de, D>(deserializer: D) -> Result<StatusCode, D::Error>
where
    D: Deserializer<'de>,
{
    let status = u16::deserialize(deserializer)?;
    status.try_into().map_err(|_| {
        D::Error::invalid_value(Unexpected::Unsigned(status.into()), &"an HTTP status code")
    })
}

fn default_status() -> StatusCode {
    StatusCode::OK
}

/// HTTP headers to be added to a response, in configuration order
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CustomHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl<'de> Deserialize<'de> for CustomHeaders {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct VisitorImpl;

        impl<'de> Visitor<'de> for VisitorImpl {
            type Value = CustomHeaders;

            fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                formatter.write_str("a map of HTTP header names to values")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut headers = Vec::new();
                while let Some((name, value)) = map.next_entry::<String, String>()? {
                    let name = HeaderName::try_from(name.as_str()).map_err(|_| {
                        A::Error::custom(format!("Invalid header name {name}"))
                    })?;
                    let value = HeaderValue::try_from(value.as_str()).map_err(|_| {
                        A::Error::custom(format!("Invalid value of header {name}"))
                    })?;
                    headers.push((name, value));
                }
                Ok(CustomHeaders { headers })
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(CustomHeaders::default())
            }
        }

        deserializer.deserialize_map(VisitorImpl)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RespondConfForm {
    Short(String),
    Full {
        #[serde(default)]
        body: String,
        #[serde(
            default = "default_status",
            deserialize_with = "deserialize_status_code"
        )]
        status: StatusCode,
        #[serde(default)]
        headers: CustomHeaders,
    },
}

/// Configuration of a `respond` directive
///
/// The short form `respond: <body>` is equivalent to `respond: {body: <body>}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RespondConfForm")]
pub struct RespondConf {
    /// The response text
    pub body: String,
    /// HTTP status code of the response, 200 by default
    pub status: StatusCode,
    /// HTTP headers to add to the response if any
    pub headers: CustomHeaders,
}

impl Default for RespondConf {
    fn default() -> Self {
        Self {
            body: String::new(),
            status: default_status(),
            headers: CustomHeaders::default(),
        }
    }
}

impl From<RespondConfForm> for RespondConf {
    fn from(value: RespondConfForm) -> Self {
        match value {
            RespondConfForm::Short(body) => Self {
                body,
                ..Default::default()
            },
            RespondConfForm::Full {
                body,
                status,
                headers,
            } => Self {
                body,
                status,
                headers,
            },
        }
    }
}

/// Produces the configured response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RespondHandler {
    body: Bytes,
    status: StatusCode,
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl TryFrom<RespondConf> for RespondHandler {
    type Error = Box<Error>;

    fn try_from(conf: RespondConf) -> Result<Self, Self::Error> {
        debug!("Respond configuration received: {conf:#?}");

        Ok(Self {
            body: conf.body.into(),
            status: conf.status,
            headers: conf.headers.headers,
        })
    }
}

#[async_trait]
impl DirectiveHandler for RespondHandler {
    type Conf = RespondConf;

    async fn handle(
        &self,
        request: &mut RequestState,
        _services: &Services<'_>,
    ) -> Result<HandlerResult, Box<Error>> {
        trace!("Responding to {} with status {}", request.path(), self.status);

        let mut response = Response::new(Bytes::new());
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            headers.append(name, value.clone());
        }
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(self.body.len()));

        if request.method() != Method::HEAD {
            *response.body_mut() = self.body.clone();
        }

        Ok(HandlerResult::Respond(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use lantern_module_utils::backend::MemoryBackend;
    use lantern_module_utils::{Cancellation, FromYaml, CONFIGURATION_ERROR};
    use test_log::test;
    use upstream_module::UnavailableDispatcher;

    async fn respond(conf: &str, method: Method) -> Result<Response<Bytes>, Box<Error>> {
        let handler = RespondHandler::from_conf(RespondConf::from_yaml(conf)?)?;

        // A rewrite has no effect on the response
        let mut request = RequestState::new(method, "/hello")?;
        request.rewrite("/elsewhere")?;

        let services = Services {
            backend: &MemoryBackend::new(),
            upstream: &UnavailableDispatcher,
            cancellation: &Cancellation::new(),
        };
        match handler.handle(&mut request, &services).await? {
            HandlerResult::Respond(response) => Ok(response),
            HandlerResult::Continue => panic!("respond should be terminal"),
        }
    }

    fn assert_headers(response: &Response<Bytes>, expected: Vec<(&str, &str)>) {
        let mut headers: Vec<_> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_ascii_lowercase(),
                    value.to_str().unwrap().to_owned(),
                )
            })
            .collect();
        headers.sort();

        let mut expected: Vec<_> = expected
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.to_owned()))
            .collect();
        expected.sort();

        assert_eq!(headers, expected);
    }

    #[test(tokio::test)]
    async fn short_form() -> Result<(), Box<Error>> {
        let response = respond("hello from localhost", Method::GET).await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), "hello from localhost");
        assert_headers(&response, vec![("Content-Length", "20")]);
        Ok(())
    }

    #[test(tokio::test)]
    async fn custom_status() -> Result<(), Box<Error>> {
        let response = respond("status: 204", Method::GET).await?;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.body(), "");
        assert_headers(&response, vec![("Content-Length", "0")]);
        Ok(())
    }

    #[test(tokio::test)]
    async fn with_headers() -> Result<(), Box<Error>> {
        let response = respond(
            r#"
                body: hi
                status: 201
                headers:
                    Content-Type: text/plain
                    X-Custom: custom
            "#,
            Method::GET,
        )
        .await?;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.body(), "hi");
        assert_headers(
            &response,
            vec![
                ("Content-Length", "2"),
                ("Content-Type", "text/plain"),
                ("X-Custom", "custom"),
            ],
        );
        Ok(())
    }

    #[test(tokio::test)]
    async fn head_request() -> Result<(), Box<Error>> {
        let response = respond("hi", Method::HEAD).await?;
        assert_eq!(response.body(), "");
        assert_headers(&response, vec![("Content-Length", "2")]);
        Ok(())
    }

    #[test]
    fn invalid_configuration() {
        for conf in [
            "status: 1000",
            "status: 99",
            "headers: {\"Bad Name\": x}",
            "headers: {X-Test: \"a\\nb\"}",
        ] {
            assert_eq!(
                RespondConf::from_yaml(conf).err().map(|err| err.etype().clone()),
                Some(CONFIGURATION_ERROR)
            );
        }
    }
}
