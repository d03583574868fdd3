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

//! Handler of `templates` directives
//!
//! Templates are plain text with actions in double braces:
//!
//! * `{{.Path}}`, `{{.Query}}`, `{{.Host}}`, `{{.Method}}`, `{{.OriginalPath}}`: request
//!   properties
//! * `{{placeholder "name"}}`: any placeholder known to the request, e.g. `{{placeholder
//!   "header.User-Agent"}}`
//! * `{{/* comment */}}`: removed from the output

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, HeaderValue, Response};
use lantern_module_utils::transform::BodyTransform;
use lantern_module_utils::{
    DirectiveHandler, Error, ErrorType, HandlerResult, RequestState, Services,
};
use log::{debug, trace, warn};
use mime_guess::Mime;
use std::borrow::Cow;
use std::sync::Arc;

use crate::configuration::TemplatesConf;
use crate::mime_matcher::MimeMatcher;

fn template_error(request: &RequestState, message: impl Into<String>) -> Box<Error> {
    let message = message.into();
    warn!("Failed executing template for {}: {message}", request.path());
    Error::explain(
        ErrorType::InternalError,
        format!("template error in {}: {message}", request.path()),
    )
}

fn evaluate<'a>(action: &str, request: &'a RequestState) -> Result<Cow<'a, str>, String> {
    let value = match action {
        ".Path" => Cow::from(request.path()),
        ".Query" => Cow::from(request.query().unwrap_or("")),
        ".Host" => request.host().unwrap_or_default(),
        ".Method" => Cow::from(request.method().as_str()),
        ".OriginalPath" => Cow::from(request.original_path()),
        action => {
            let argument = action
                .strip_prefix("placeholder")
                .filter(|argument| argument.starts_with(char::is_whitespace))
                .ok_or_else(|| format!("unknown action {{{{{action}}}}}"))?
                .trim();
            let name = argument
                .strip_prefix('"')
                .and_then(|argument| argument.strip_suffix('"'))
                .filter(|name| !name.is_empty() && !name.contains('"'))
                .ok_or_else(|| format!("placeholder expects a quoted name, got {argument}"))?;
            request
                .placeholder(name)
                .ok_or_else(|| format!("unknown placeholder {name}"))?
        }
    };
    Ok(value)
}

/// Executes a template against the request state.
fn render(template: &str, request: &RequestState) -> Result<String, Box<Error>> {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        result.push_str(&rest[..start]);
        let action = &rest[start + 2..];

        let comment = action.trim_start();
        if let Some(comment) = comment.strip_prefix("/*") {
            let end = comment
                .find("*/")
                .ok_or_else(|| template_error(request, "unclosed comment"))?;
            rest = comment[end + 2..]
                .trim_start()
                .strip_prefix("}}")
                .ok_or_else(|| template_error(request, "comment has to end with */}}"))?;
            continue;
        }

        let end = action
            .find("}}")
            .ok_or_else(|| template_error(request, "unclosed action"))?;
        let value = evaluate(action[..end].trim(), request)
            .map_err(|message| template_error(request, message))?;
        result.push_str(&value);
        rest = &action[end + 2..];
    }
    result.push_str(rest);
    Ok(result)
}

/// Response transform executing textual responses as templates
#[derive(Debug)]
pub(crate) struct TemplatesTransform {
    mime_types: MimeMatcher,
}

impl TemplatesTransform {
    fn applies_to(&self, response: &Response<Bytes>) -> bool {
        if response.headers().contains_key(header::CONTENT_ENCODING) {
            trace!("Response is encoded, not a template");
            return false;
        }

        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<Mime>().ok())
            .is_some_and(|mime| self.mime_types.matches(&mime))
    }
}

impl BodyTransform for TemplatesTransform {
    fn transform(
        &self,
        request: &RequestState,
        mut response: Response<Bytes>,
    ) -> Result<Response<Bytes>, Box<Error>> {
        if !self.applies_to(&response) {
            return Ok(response);
        }

        let Ok(template) = std::str::from_utf8(response.body()) else {
            warn!(
                "Response for {} isn’t valid UTF-8, not executing as template",
                request.path()
            );
            return Ok(response);
        };

        let rendered = render(template, request)?;
        trace!(
            "Executed template for {}, {} bytes to {} bytes",
            request.path(),
            template.len(),
            rendered.len()
        );

        response.headers_mut().insert(
            header::CONTENT_LENGTH,
            HeaderValue::from(rendered.len()),
        );
        *response.body_mut() = rendered.into();
        Ok(response)
    }
}

/// Registers template execution for the response served later
#[derive(Debug)]
pub struct TemplatesHandler {
    transform: Arc<TemplatesTransform>,
}

impl TryFrom<TemplatesConf> for TemplatesHandler {
    type Error = Box<Error>;

    fn try_from(conf: TemplatesConf) -> Result<Self, Self::Error> {
        debug!("Templates configuration received: {conf:#?}");

        let mime_types = conf.mime_types.into_iter().collect();
        Ok(Self {
            transform: Arc::new(TemplatesTransform { mime_types }),
        })
    }
}

#[async_trait]
impl DirectiveHandler for TemplatesHandler {
    type Conf = TemplatesConf;

    async fn handle(
        &self,
        request: &mut RequestState,
        _services: &Services<'_>,
    ) -> Result<HandlerResult, Box<Error>> {
        request.add_transform(self.transform.clone());
        Ok(HandlerResult::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use http::{Method, StatusCode};
    use lantern_module_utils::backend::MemoryBackend;
    use lantern_module_utils::{Cancellation, FromYaml};
    use test_log::test;
    use upstream_module::UnavailableDispatcher;

    fn make_request() -> RequestState {
        let mut request = RequestState::new(Method::GET, "/page.html?a=b").unwrap();
        request
            .headers_mut()
            .insert(header::HOST, HeaderValue::from_static("example.com"));
        request
            .headers_mut()
            .insert(header::USER_AGENT, HeaderValue::from_static("test"));
        request
    }

    fn make_response(content_type: &'static str, body: &'static str) -> Response<Bytes> {
        let mut response = Response::new(Bytes::from_static(body.as_bytes()));
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        response
    }

    async fn registered(conf: &str, request: &mut RequestState) -> Result<(), Box<Error>> {
        let handler = TemplatesHandler::from_conf(TemplatesConf::from_yaml(conf)?)?;
        let services = Services {
            backend: &MemoryBackend::new(),
            upstream: &UnavailableDispatcher,
            cancellation: &Cancellation::new(),
        };
        assert!(!handler.handle(request, &services).await?.is_terminal());
        assert!(request.has_transforms());
        Ok(())
    }

    #[test]
    fn actions() -> Result<(), Box<Error>> {
        let mut request = make_request();
        request.rewrite("/other.html")?;

        assert_eq!(
            render(
                "{{.Method}} {{ .Path }}?{{.Query}} on {{.Host}} from {{.OriginalPath}}",
                &request
            )?,
            "GET /other.html?a=b on example.com from /page.html"
        );
        assert_eq!(
            render(r#"<p>{{placeholder "header.User-Agent"}}{{placeholder "ext"}}</p>"#, &request)?,
            "<p>test.html</p>"
        );
        assert_eq!(render("a{{/* {{.Path}} */}}b{{ /*x*/ }}c", &request)?, "abc");
        assert_eq!(render("no actions } {", &request)?, "no actions } {");
        Ok(())
    }

    #[test]
    fn malformed() {
        let request = make_request();
        for template in [
            "{{.Path",
            "{{.Unknown}}",
            "{{placeholder}}",
            "{{placeholder name}}",
            r#"{{placeholder "unknown"}}"#,
            "{{/* unclosed",
            "{{/* comment */ .Path}}",
        ] {
            assert_eq!(
                render(template, &request).err().map(|err| err.etype().clone()),
                Some(ErrorType::InternalError),
                "{template}"
            );
        }
    }

    #[test(tokio::test)]
    async fn transform() -> Result<(), Box<Error>> {
        let mut request = make_request();
        registered("{}", &mut request).await?;

        let response = request.finalize(make_response(
            "text/html; charset=utf-8",
            "<p>{{.Path}}</p>",
        ))?;
        assert_eq!(response.body().as_ref(), b"<p>/page.html</p>");
        assert_eq!(
            response.headers().get(header::CONTENT_LENGTH),
            Some(&HeaderValue::from(17))
        );
        Ok(())
    }

    #[test(tokio::test)]
    async fn skipped_responses() -> Result<(), Box<Error>> {
        let template = "{{.Path}}";

        let mut request = make_request();
        registered("{}", &mut request).await?;
        let response = request.finalize(make_response("image/png", template))?;
        assert_eq!(response.body().as_ref(), template.as_bytes());

        let mut request = make_request();
        registered("{}", &mut request).await?;
        let mut encoded = make_response("text/html", template);
        encoded
            .headers_mut()
            .insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        let response = request.finalize(encoded)?;
        assert_eq!(response.body().as_ref(), template.as_bytes());

        let mut request = make_request();
        registered("mime_types: application/*", &mut request).await?;
        let response = request.finalize(make_response("text/html", template))?;
        assert_eq!(response.body().as_ref(), template.as_bytes());

        let mut request = make_request();
        registered("{}", &mut request).await?;
        let mut binary = Response::new(Bytes::from_static(b"\xff{{.Path}}"));
        binary
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        let response = request.finalize(binary)?;
        assert_eq!(response.body().as_ref(), b"\xff{{.Path}}");
        Ok(())
    }

    #[test(tokio::test)]
    async fn error_status() -> Result<(), Box<Error>> {
        let mut request = make_request();
        registered("{}", &mut request).await?;

        let mut not_found = make_response("text/html", "{{.Unknown}}");
        *not_found.status_mut() = StatusCode::NOT_FOUND;
        assert!(request.finalize(not_found).is_err());
        Ok(())
    }
}
