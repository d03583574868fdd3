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

//! # Compression Module for Lantern Web Server
//!
//! This crate contains the `encode` directive handler enabling dynamic compression of responses:
//!
//! ```yaml
//! directives:
//! - encode: [zstd, br, gzip]
//! - encode:
//!     algorithms: gzip
//!     level: 9
//!     minimum_length: 1024
//!   match: /large/*
//! - file_server: {}
//! ```
//!
//! Supported algorithms are `gzip`, `deflate`, `br` (Brotli) and `zstd` (Zstandard). The
//! `Accept-Encoding` request header decides which of the configured algorithms is used.
//!
//! The `encode` directive doesn’t produce a response itself. It registers a transform that is
//! applied when a later directive like `file_server` produces the response. Responses with a
//! status other than 200, responses that are already compressed and responses shorter than
//! `minimum_length` (512 bytes by default) are left alone. Upstream responses are never
//! compressed.

pub mod configuration;
mod encoder;

use async_trait::async_trait;
use lantern_module_utils::compression_algorithm::CompressionAlgorithm;
use lantern_module_utils::{
    configuration_error, DirectiveHandler, Error, HandlerResult, RequestState, Services,
};
use log::{debug, trace};
use std::sync::Arc;

use configuration::EncodeConf;
use encoder::EncodeTransform;

/// Registers dynamic compression of the response
#[derive(Debug, Clone)]
pub struct EncodeHandler {
    transform: Arc<EncodeTransform>,
}

impl TryFrom<EncodeConf> for EncodeHandler {
    type Error = Box<Error>;

    fn try_from(conf: EncodeConf) -> Result<Self, Self::Error> {
        debug!("Encode configuration received: {conf:#?}");

        let algorithms = conf.algorithms.into_inner();
        if algorithms.contains(&CompressionAlgorithm::Compress) {
            return Err(configuration_error(
                "compress algorithm is not supported for dynamic compression",
            ));
        }

        Ok(Self {
            transform: Arc::new(EncodeTransform {
                algorithms,
                level: conf.level,
                minimum_length: conf.minimum_length,
            }),
        })
    }
}

#[async_trait]
impl DirectiveHandler for EncodeHandler {
    type Conf = EncodeConf;

    async fn handle(
        &self,
        request: &mut RequestState,
        _services: &Services<'_>,
    ) -> Result<HandlerResult, Box<Error>> {
        trace!("Enabling compression for {}", request.path());
        request.add_transform(self.transform.clone());
        Ok(HandlerResult::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use bytes::Bytes;
    use http::{header, HeaderValue, Method, Response, StatusCode};
    use lantern_module_utils::backend::MemoryBackend;
    use lantern_module_utils::{Cancellation, FromYaml, CONFIGURATION_ERROR};
    use std::io::Read;
    use test_log::test;
    use upstream_module::UnavailableDispatcher;

    const TEXT: &str = "Lorem ipsum dolor sit amet, consectetur adipiscing elit. ";

    fn make_handler(conf: &str) -> Result<EncodeHandler, Box<Error>> {
        EncodeHandler::from_conf(EncodeConf::from_yaml(conf)?)
    }

    fn response(status: StatusCode, body: &str) -> Response<Bytes> {
        let mut response = Response::new(Bytes::copy_from_slice(body.as_bytes()));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        response
    }

    async fn encode(
        conf: &str,
        accept_encoding: Option<&'static str>,
        response: Response<Bytes>,
    ) -> Result<Response<Bytes>, Box<Error>> {
        let handler = make_handler(conf)?;
        let mut request = RequestState::new(Method::GET, "/file.txt")?;
        if let Some(accept_encoding) = accept_encoding {
            request.headers_mut().insert(
                header::ACCEPT_ENCODING,
                HeaderValue::from_static(accept_encoding),
            );
        }

        let services = Services {
            backend: &MemoryBackend::new(),
            upstream: &UnavailableDispatcher,
            cancellation: &Cancellation::new(),
        };
        assert!(!handler.handle(&mut request, &services).await?.is_terminal());
        assert!(request.has_transforms());
        request.finalize(response)
    }

    #[test(tokio::test)]
    async fn compressed() -> Result<(), Box<Error>> {
        let text = TEXT.repeat(20);
        let response = encode(
            "[gzip, zstd]",
            Some("br, gzip"),
            response(StatusCode::OK, &text),
        )
        .await?;

        assert_eq!(response.headers().get(header::CONTENT_ENCODING).unwrap(), "gzip");
        assert_eq!(response.headers().get(header::VARY).unwrap(), "Accept-Encoding");
        assert_eq!(
            response.headers().get(header::CONTENT_LENGTH).unwrap(),
            &HeaderValue::from(response.body().len())
        );

        let mut decompressed = String::new();
        flate2::read::GzDecoder::new(response.body().as_ref())
            .read_to_string(&mut decompressed)
            .unwrap();
        assert_eq!(decompressed, text);
        Ok(())
    }

    #[test(tokio::test)]
    async fn client_preference() -> Result<(), Box<Error>> {
        let text = TEXT.repeat(20);
        let response = encode(
            "[gzip, zstd, br]",
            Some("gzip;q=0.5, zstd;q=0.8"),
            response(StatusCode::OK, &text),
        )
        .await?;
        assert_eq!(response.headers().get(header::CONTENT_ENCODING).unwrap(), "zstd");
        Ok(())
    }

    #[test(tokio::test)]
    async fn not_compressed() -> Result<(), Box<Error>> {
        let text = TEXT.repeat(20);

        // Client doesn't accept anything configured
        let result = encode("gzip", Some("br"), response(StatusCode::OK, &text)).await?;
        assert!(!result.headers().contains_key(header::CONTENT_ENCODING));
        assert_eq!(result.headers().get(header::VARY).unwrap(), "Accept-Encoding");
        assert_eq!(result.body(), text.as_str());

        // No Accept-Encoding header
        let result = encode("gzip", None, response(StatusCode::OK, &text)).await?;
        assert!(!result.headers().contains_key(header::CONTENT_ENCODING));

        // Body too short
        let result = encode("gzip", Some("gzip"), response(StatusCode::OK, TEXT)).await?;
        assert!(!result.headers().contains_key(header::CONTENT_ENCODING));
        assert_eq!(result.body(), TEXT);

        // Error response
        let result = encode("gzip", Some("gzip"), response(StatusCode::NOT_FOUND, &text)).await?;
        assert!(!result.headers().contains_key(header::CONTENT_ENCODING));
        assert!(!result.headers().contains_key(header::VARY));

        // Already compressed
        let mut precompressed = response(StatusCode::OK, &text);
        precompressed
            .headers_mut()
            .insert(header::CONTENT_ENCODING, HeaderValue::from_static("br"));
        let result = encode("gzip", Some("gzip"), precompressed).await?;
        assert_eq!(result.headers().get(header::CONTENT_ENCODING).unwrap(), "br");
        assert_eq!(result.body(), text.as_str());

        Ok(())
    }

    #[test(tokio::test)]
    async fn minimum_length() -> Result<(), Box<Error>> {
        let result = encode(
            "{algorithms: gzip, minimum_length: 0}",
            Some("gzip"),
            response(StatusCode::OK, TEXT),
        )
        .await?;
        assert_eq!(result.headers().get(header::CONTENT_ENCODING).unwrap(), "gzip");
        Ok(())
    }

    #[test]
    fn compress_rejected() {
        assert_eq!(
            make_handler("[gzip, compress]")
                .err()
                .map(|err| err.etype().clone()),
            Some(CONFIGURATION_ERROR)
        );
    }
}
