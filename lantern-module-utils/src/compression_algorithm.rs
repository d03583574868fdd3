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

//! Handles various compression algorithms allowed in `Accept-Encoding` and `Content-Encoding` HTTP
//! headers.

use serde::Deserialize;
use std::fmt::Display;
use std::str::FromStr;

/// Represents a compression algorithm choice.
///
/// In configuration files, both the algorithm name (`gzip`) and the corresponding file extension
/// (`gz`) are accepted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum CompressionAlgorithm {
    /// gzip compression
    Gzip,
    /// deflate (zlib) compression
    Deflate,
    /// compress compression
    Compress,
    /// Brotli compression
    Brotli,
    /// Zstandard compression
    Zstandard,
}

impl CompressionAlgorithm {
    /// Returns the file extension corresponding to the algorithm.
    pub fn ext(&self) -> &'static str {
        match self {
            Self::Gzip => "gz",
            Self::Deflate => "zz",
            Self::Compress => "z",
            Self::Brotli => "br",
            Self::Zstandard => "zst",
        }
    }

    /// Determines the algorithm corresponding to the file extension if any.
    pub fn from_ext(ext: &str) -> Option<Self> {
        match ext {
            "gz" => Some(Self::Gzip),
            "zz" => Some(Self::Deflate),
            "z" => Some(Self::Compress),
            "br" => Some(Self::Brotli),
            "zst" => Some(Self::Zstandard),
            _ => None,
        }
    }

    /// Returns the algorithm name as used in `Accept-Encoding` HTTP header.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Deflate => "deflate",
            Self::Compress => "compress",
            Self::Brotli => "br",
            Self::Zstandard => "zstd",
        }
    }

    /// Determines the algorithm corresponding to a name from `Accept-Encoding` HTTP header.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => Some(Self::Gzip),
            "deflate" => Some(Self::Deflate),
            "compress" | "x-compress" => Some(Self::Compress),
            "br" => Some(Self::Brotli),
            "zstd" => Some(Self::Zstandard),
            _ => None,
        }
    }
}

impl FromStr for CompressionAlgorithm {
    type Err = UnsupportedCompressionAlgorithm;

    /// Converts an algorithm name or file extension into a compression algorithm.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CompressionAlgorithm::from_name(s)
            .or_else(|| CompressionAlgorithm::from_ext(s))
            .ok_or_else(|| UnsupportedCompressionAlgorithm(s.to_owned()))
    }
}

impl TryFrom<String> for CompressionAlgorithm {
    type Error = UnsupportedCompressionAlgorithm;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}", self.name())
    }
}

/// The error type returned by `CompressionAlgorithm::from_str()`
#[derive(Debug, PartialEq, Eq)]
pub struct UnsupportedCompressionAlgorithm(String);

impl Display for UnsupportedCompressionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "Unsupported compression algorithm: {}", self.0)
    }
}

impl std::error::Error for UnsupportedCompressionAlgorithm {}

/// Parses an encoding specifier from `Accept-Encoding` HTTP header into an
/// algorithm/quality pair. Quality values are in thousandths.
fn parse_encoding(encoding: &str) -> Option<(&str, u16)> {
    let mut params = encoding.split(';');
    let algorithm = params.next()?.trim();
    if algorithm.is_empty() {
        return None;
    }

    let mut quality = 1000;
    for param in params {
        if let Some((name, value)) = param.split_once('=') {
            if name.trim() == "q" {
                if let Ok(value) = f64::from_str(value.trim()) {
                    quality = (value.clamp(0.0, 1.0) * 1000.0) as u16;
                }
            }
        }
    }
    Some((algorithm, quality))
}

/// Compares the requested encodings from `Accept-Encoding` HTTP header with a list of supported
/// algorithms and returns any matches, sorted by the respective quality value.
///
/// Encodings listed with `q=0` are refused explicitly, a `*` entry never selects them.
pub fn find_matches(
    requested: &str,
    supported: &[CompressionAlgorithm],
) -> Vec<CompressionAlgorithm> {
    let mut requested = requested
        .split(',')
        .filter_map(parse_encoding)
        .collect::<Vec<_>>();
    // Stable sort, equal quality values keep the client's order
    requested.sort_by_key(|(_, quality)| std::cmp::Reverse(*quality));

    let refused = requested
        .iter()
        .filter(|(_, quality)| *quality == 0)
        .filter_map(|(name, _)| CompressionAlgorithm::from_name(name))
        .collect::<Vec<_>>();

    let mut result = Vec::new();
    for (algorithm, quality) in requested {
        if quality == 0 {
            break;
        }

        if algorithm == "*" {
            for algorithm in supported {
                if !result.contains(algorithm) && !refused.contains(algorithm) {
                    result.push(*algorithm);
                }
            }
            break;
        } else if let Some(algorithm) = CompressionAlgorithm::from_name(algorithm) {
            if supported.contains(&algorithm) && !result.contains(&algorithm) {
                result.push(algorithm);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    const ALL: [CompressionAlgorithm; 4] = [
        CompressionAlgorithm::Gzip,
        CompressionAlgorithm::Deflate,
        CompressionAlgorithm::Brotli,
        CompressionAlgorithm::Zstandard,
    ];

    #[test]
    fn parsing() {
        assert_eq!("gzip".parse::<CompressionAlgorithm>(), Ok(CompressionAlgorithm::Gzip));
        assert_eq!("gz".parse::<CompressionAlgorithm>(), Ok(CompressionAlgorithm::Gzip));
        assert_eq!("zstd".parse::<CompressionAlgorithm>(), Ok(CompressionAlgorithm::Zstandard));
        assert_eq!("zst".parse::<CompressionAlgorithm>(), Ok(CompressionAlgorithm::Zstandard));
        assert_eq!(
            "lzma".parse::<CompressionAlgorithm>(),
            Err(UnsupportedCompressionAlgorithm("lzma".to_owned()))
        );
    }

    #[test]
    fn nothing_acceptable() {
        assert_eq!(find_matches("", &ALL), Vec::new());
        assert_eq!(find_matches("identity", &ALL), Vec::new());
        assert_eq!(
            find_matches("gzip", &[CompressionAlgorithm::Brotli]),
            Vec::new()
        );
    }

    #[test]
    fn wildcard() {
        assert_eq!(
            find_matches(
                "*",
                &[CompressionAlgorithm::Gzip, CompressionAlgorithm::Brotli]
            ),
            vec![CompressionAlgorithm::Gzip, CompressionAlgorithm::Brotli]
        );

        assert_eq!(
            find_matches(
                "br, *",
                &[CompressionAlgorithm::Gzip, CompressionAlgorithm::Brotli]
            ),
            vec![CompressionAlgorithm::Brotli, CompressionAlgorithm::Gzip]
        );

        assert_eq!(
            find_matches(
                "gzip;q=0, *",
                &[CompressionAlgorithm::Gzip, CompressionAlgorithm::Brotli]
            ),
            vec![CompressionAlgorithm::Brotli]
        );
    }

    #[test]
    fn quality_order() {
        assert_eq!(
            find_matches(
                "br;q=0.9, *",
                &[CompressionAlgorithm::Gzip, CompressionAlgorithm::Brotli]
            ),
            vec![CompressionAlgorithm::Gzip, CompressionAlgorithm::Brotli]
        );

        assert_eq!(
            find_matches("deflate;q=0.7, gzip;q=0.9, zstd;q=0.8, br;q=1.0", &ALL),
            vec![
                CompressionAlgorithm::Brotli,
                CompressionAlgorithm::Gzip,
                CompressionAlgorithm::Zstandard,
                CompressionAlgorithm::Deflate,
            ]
        );

        assert_eq!(
            find_matches("gzip, deflate, br;q=0", &ALL),
            vec![CompressionAlgorithm::Gzip, CompressionAlgorithm::Deflate]
        );
    }
}
