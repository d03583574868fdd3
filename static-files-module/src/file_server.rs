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

//! Handler of `file_server` directives

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, HeaderValue, Method, Response, StatusCode};
use lantern_module_utils::compression_algorithm::{find_matches, CompressionAlgorithm};
use lantern_module_utils::standard_response::error_response;
use lantern_module_utils::{
    configuration_error, DirectiveHandler, Error, HandlerResult, RequestState, ResourceKind,
    Services,
};
use log::{debug, info, trace, warn};
use percent_encoding::percent_decode_str;
use std::collections::HashSet;

use crate::configuration::FileServerConf;

/// Serves the file at the current request path from the resource backend
///
/// Directories are never served, index files have to be resolved by a preceding `try_files`
/// directive. Registered response transforms are applied to everything this handler serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileServerHandler {
    hide: HashSet<String>,
    precompressed: Vec<CompressionAlgorithm>,
    page_404: Option<String>,
}

impl TryFrom<FileServerConf> for FileServerHandler {
    type Error = Box<Error>;

    fn try_from(conf: FileServerConf) -> Result<Self, Self::Error> {
        debug!("FileServer configuration received: {conf:#?}");

        if let Some(page) = &conf.page_404 {
            if !page.starts_with('/') {
                return Err(configuration_error(format!(
                    "page_404 has to be a root-relative path, got {page}"
                )));
            }
        }

        Ok(Self {
            hide: conf.hide.into_iter().collect(),
            precompressed: conf.precompressed.into_inner(),
            page_404: conf.page_404,
        })
    }
}

fn content_type(path: &str) -> HeaderValue {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    HeaderValue::from_str(mime.as_ref())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"))
}

impl FileServerHandler {
    fn is_hidden(&self, path: &str) -> bool {
        !self.hide.is_empty()
            && path.split('/').any(|segment| {
                let segment = percent_decode_str(segment).decode_utf8_lossy();
                self.hide.contains(segment.as_ref())
            })
    }

    async fn read_contents(
        &self,
        request: &RequestState,
        services: &Services<'_>,
        path: &str,
    ) -> Result<(Bytes, Option<CompressionAlgorithm>), Box<Error>> {
        if let Some(requested) = request.accept_encoding() {
            for algorithm in find_matches(requested, &self.precompressed) {
                let candidate = format!("{path}.{}", algorithm.ext());
                let kind = services
                    .backend
                    .exists(&candidate, services.cancellation)
                    .await?;
                if kind == ResourceKind::File {
                    debug!("Serving pre-compressed file {candidate} for {path}");
                    let contents = services
                        .backend
                        .read(&candidate, services.cancellation)
                        .await?;
                    return Ok((contents, Some(algorithm)));
                }
            }
        }

        let contents = services.backend.read(path, services.cancellation).await?;
        Ok((contents, None))
    }

    fn respond(
        &self,
        request: &mut RequestState,
        status: StatusCode,
        path: &str,
        contents: Bytes,
        encoding: Option<CompressionAlgorithm>,
    ) -> Result<HandlerResult, Box<Error>> {
        let mut response = Response::new(contents);
        *response.status_mut() = status;

        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, content_type(path));
        if let Some(algorithm) = encoding {
            headers.insert(
                header::CONTENT_ENCODING,
                HeaderValue::from_static(algorithm.name()),
            );
        }
        if !self.precompressed.is_empty() {
            headers.insert(header::VARY, HeaderValue::from_static("Accept-Encoding"));
        }

        let mut response = request.finalize(response)?;
        let content_length = response.body().len();
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from(content_length));
        if request.method() == Method::HEAD {
            *response.body_mut() = Bytes::new();
        }
        Ok(HandlerResult::Respond(response))
    }

    async fn not_found(
        &self,
        request: &mut RequestState,
        services: &Services<'_>,
    ) -> Result<HandlerResult, Box<Error>> {
        if let Some(page) = &self.page_404 {
            let kind = services.backend.exists(page, services.cancellation).await?;
            if kind == ResourceKind::File {
                let contents = services.backend.read(page, services.cancellation).await?;
                return self.respond(request, StatusCode::NOT_FOUND, page, contents, None);
            }
            warn!("Configured page_404 {page} doesn’t exist");
        }

        Ok(HandlerResult::Respond(error_response(
            request,
            StatusCode::NOT_FOUND,
        )))
    }
}

#[async_trait]
impl DirectiveHandler for FileServerHandler {
    type Conf = FileServerConf;

    async fn handle(
        &self,
        request: &mut RequestState,
        services: &Services<'_>,
    ) -> Result<HandlerResult, Box<Error>> {
        let path = request.path().to_owned();

        if self.is_hidden(&path) {
            info!("Refusing to serve hidden path {path}");
            return self.not_found(request, services).await;
        }

        let kind = services.backend.exists(&path, services.cancellation).await?;
        if kind != ResourceKind::File {
            trace!("{path} resolved as {kind:?}, not a file");
            return self.not_found(request, services).await;
        }

        if request.method() != Method::GET && request.method() != Method::HEAD {
            warn!("Denying method {} for {path}", request.method());
            return Ok(HandlerResult::Respond(error_response(
                request,
                StatusCode::METHOD_NOT_ALLOWED,
            )));
        }

        let (contents, encoding) = self.read_contents(request, services, &path).await?;
        info!("Serving file {path}, {} bytes", contents.len());
        self.respond(request, StatusCode::OK, &path, contents, encoding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use lantern_module_utils::backend::MemoryBackend;
    use lantern_module_utils::{Cancellation, ErrorType, FromYaml, CONFIGURATION_ERROR};
    use test_log::test;
    use upstream_module::UnavailableDispatcher;

    fn backend() -> MemoryBackend {
        MemoryBackend::new()
            .with_file("/file.txt", "Hello world!\n")
            .with_file("/file.txt.gz", "gzipped")
            .with_file("/index.html", "<p>index</p>")
            .with_file("/404.html", "<p>not here</p>")
            .with_file("/.htaccess", "secret")
            .with_file("/private/.git/config", "secret")
            .with_fault("/broken.txt")
    }

    fn make_handler(conf: &str) -> Result<FileServerHandler, Box<Error>> {
        FileServerHandler::from_conf(FileServerConf::from_yaml(conf)?)
    }

    async fn serve(
        conf: &str,
        method: Method,
        uri: &str,
        accept_encoding: Option<&'static str>,
    ) -> Result<Response<Bytes>, Box<Error>> {
        let handler = make_handler(conf)?;
        let mut request = RequestState::new(method, uri)?;
        if let Some(accept_encoding) = accept_encoding {
            request.headers_mut().insert(
                header::ACCEPT_ENCODING,
                HeaderValue::from_static(accept_encoding),
            );
        }

        let services = Services {
            backend: &backend(),
            upstream: &UnavailableDispatcher,
            cancellation: &Cancellation::new(),
        };
        match handler.handle(&mut request, &services).await? {
            HandlerResult::Respond(response) => Ok(response),
            HandlerResult::Continue => panic!("file server should be terminal"),
        }
    }

    fn header_value(response: &Response<Bytes>, name: header::HeaderName) -> Option<&str> {
        response
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
    }

    #[test(tokio::test)]
    async fn file() -> Result<(), Box<Error>> {
        let response = serve("{}", Method::GET, "/index.html?a=b", None).await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), b"<p>index</p>");
        assert_eq!(header_value(&response, header::CONTENT_TYPE), Some("text/html"));
        assert_eq!(header_value(&response, header::CONTENT_LENGTH), Some("12"));
        assert_eq!(header_value(&response, header::VARY), None);
        Ok(())
    }

    #[test(tokio::test)]
    async fn head_request() -> Result<(), Box<Error>> {
        let response = serve("{}", Method::HEAD, "/file.txt", None).await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_value(&response, header::CONTENT_LENGTH), Some("13"));
        assert!(response.body().is_empty());
        Ok(())
    }

    #[test(tokio::test)]
    async fn not_found() -> Result<(), Box<Error>> {
        let response = serve("{}", Method::GET, "/missing.txt", None).await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // Directories aren't served
        let response = serve("{}", Method::GET, "/private/", None).await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = serve("{}", Method::GET, "/", None).await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        Ok(())
    }

    #[test(tokio::test)]
    async fn page_404() -> Result<(), Box<Error>> {
        let response = serve("page_404: /404.html", Method::GET, "/missing", None).await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.body().as_ref(), b"<p>not here</p>");
        assert_eq!(header_value(&response, header::CONTENT_TYPE), Some("text/html"));

        let response = serve("page_404: /missing.html", Method::GET, "/missing", None).await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(String::from_utf8_lossy(response.body()).contains("404 Not Found"));
        Ok(())
    }

    #[test(tokio::test)]
    async fn hidden() -> Result<(), Box<Error>> {
        let conf = "hide: [.htaccess, .git]";
        let response = serve(conf, Method::GET, "/.htaccess", None).await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = serve(conf, Method::GET, "/%2Ehtaccess", None).await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = serve(conf, Method::GET, "/private/.git/config", None).await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = serve("{}", Method::GET, "/.htaccess", None).await?;
        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }

    #[test(tokio::test)]
    async fn method_not_allowed() -> Result<(), Box<Error>> {
        let response = serve("{}", Method::POST, "/file.txt", None).await?;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let response = serve("{}", Method::DELETE, "/missing.txt", None).await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        Ok(())
    }

    #[test(tokio::test)]
    async fn precompressed() -> Result<(), Box<Error>> {
        let conf = "precompressed: [br, gz]";

        let response = serve(conf, Method::GET, "/file.txt", Some("gzip, br")).await?;
        assert_eq!(response.body().as_ref(), b"gzipped");
        assert_eq!(header_value(&response, header::CONTENT_ENCODING), Some("gzip"));
        assert_eq!(header_value(&response, header::CONTENT_LENGTH), Some("7"));
        assert_eq!(header_value(&response, header::VARY), Some("Accept-Encoding"));
        assert!(header_value(&response, header::CONTENT_TYPE)
            .is_some_and(|value| value.starts_with("text/plain")));

        let response = serve(conf, Method::GET, "/file.txt", Some("br")).await?;
        assert_eq!(response.body().as_ref(), b"Hello world!\n");
        assert_eq!(header_value(&response, header::CONTENT_ENCODING), None);
        assert_eq!(header_value(&response, header::VARY), Some("Accept-Encoding"));

        let response = serve(conf, Method::GET, "/file.txt", None).await?;
        assert_eq!(response.body().as_ref(), b"Hello world!\n");

        let response = serve("{}", Method::GET, "/file.txt", Some("gzip")).await?;
        assert_eq!(response.body().as_ref(), b"Hello world!\n");
        Ok(())
    }

    #[test(tokio::test)]
    async fn backend_fault() {
        let result = serve("{}", Method::GET, "/broken.txt", None).await;
        assert_eq!(
            result.err().map(|err| err.etype().clone()),
            Some(ErrorType::FileReadError)
        );
    }

    #[test]
    fn invalid_configuration() {
        assert_eq!(
            make_handler("page_404: 404.html")
                .err()
                .map(|err| err.etype().clone()),
            Some(CONFIGURATION_ERROR)
        );
    }
}
