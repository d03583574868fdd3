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

//! Dynamic compression of response bodies

use bytes::Bytes;
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use http::{header, HeaderValue, Method, Response, StatusCode};
use lantern_module_utils::compression_algorithm::{find_matches, CompressionAlgorithm};
use lantern_module_utils::transform::BodyTransform;
use lantern_module_utils::{Error, ErrorType, RequestState};
use log::{debug, trace};
use std::io::Write;

const BROTLI_BUFFER_SIZE: usize = 4096;
const BROTLI_WINDOW_SIZE: u32 = 22;

fn compress(
    algorithm: CompressionAlgorithm,
    level: Option<u32>,
    data: &[u8],
) -> std::io::Result<Vec<u8>> {
    match algorithm {
        CompressionAlgorithm::Gzip => {
            let level = level.map_or(Compression::default(), |level| {
                Compression::new(level.min(9))
            });
            let mut encoder = GzEncoder::new(Vec::new(), level);
            encoder.write_all(data)?;
            encoder.finish()
        }
        CompressionAlgorithm::Deflate => {
            let level = level.map_or(Compression::default(), |level| {
                Compression::new(level.min(9))
            });
            let mut encoder = ZlibEncoder::new(Vec::new(), level);
            encoder.write_all(data)?;
            encoder.finish()
        }
        CompressionAlgorithm::Brotli => {
            let quality = level.unwrap_or(4).min(11);
            let mut writer = brotli::CompressorWriter::new(
                Vec::new(),
                BROTLI_BUFFER_SIZE,
                quality,
                BROTLI_WINDOW_SIZE,
            );
            writer.write_all(data)?;
            Ok(writer.into_inner())
        }
        CompressionAlgorithm::Zstandard => {
            let level = level.map_or(zstd::DEFAULT_COMPRESSION_LEVEL, |level| {
                level.clamp(1, 22) as i32
            });
            zstd::stream::encode_all(data, level)
        }
        CompressionAlgorithm::Compress => Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "compress algorithm isn't supported for dynamic compression",
        )),
    }
}

/// Compresses bodies of responses to requests accepting one of the configured algorithms
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EncodeTransform {
    pub(crate) algorithms: Vec<CompressionAlgorithm>,
    pub(crate) level: Option<u32>,
    pub(crate) minimum_length: usize,
}

impl BodyTransform for EncodeTransform {
    fn transform(
        &self,
        request: &RequestState,
        mut response: Response<Bytes>,
    ) -> Result<Response<Bytes>, Box<Error>> {
        if response.status() != StatusCode::OK {
            trace!("Not compressing response with status {}", response.status());
            return Ok(response);
        }

        let headers = response.headers_mut();
        let vary_present = headers
            .get_all(header::VARY)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .any(|value| value.trim().eq_ignore_ascii_case("accept-encoding"));
        if !vary_present {
            headers.append(header::VARY, HeaderValue::from_static("Accept-Encoding"));
        }

        if headers.contains_key(header::CONTENT_ENCODING) {
            trace!("Response is already encoded, not compressing");
            return Ok(response);
        }

        if request.method() == Method::HEAD {
            return Ok(response);
        }

        if response.body().len() < self.minimum_length {
            trace!(
                "Response body has {} bytes, too short for compression",
                response.body().len()
            );
            return Ok(response);
        }

        let Some(algorithm) = request
            .accept_encoding()
            .and_then(|accepted| find_matches(accepted, &self.algorithms).into_iter().next())
        else {
            trace!("Client accepts none of the configured compression algorithms");
            return Ok(response);
        };

        let compressed = compress(algorithm, self.level, response.body()).map_err(|err| {
            Error::because(
                ErrorType::InternalError,
                format!("failed compressing response with {algorithm}"),
                err,
            )
        })?;
        debug!(
            "Compressed response for {} with {algorithm}, {} bytes to {} bytes",
            request.path(),
            response.body().len(),
            compressed.len()
        );

        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_ENCODING,
            HeaderValue::from_static(algorithm.name()),
        );
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(compressed.len()));
        *response.body_mut() = compressed.into();
        Ok(response)
    }
}
