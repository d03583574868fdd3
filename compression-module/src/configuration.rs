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

//! Structures required to deserialize Compression Module configuration from YAML configuration
//! files.

use lantern_module_utils::compression_algorithm::CompressionAlgorithm;
use lantern_module_utils::OneOrMany;
use serde::Deserialize;

/// Responses shorter than this many bytes aren't compressed unless configured otherwise
pub const DEFAULT_MINIMUM_LENGTH: usize = 512;

fn default_algorithms() -> OneOrMany<CompressionAlgorithm> {
    vec![CompressionAlgorithm::Gzip, CompressionAlgorithm::Zstandard].into()
}

fn default_minimum_length() -> usize {
    DEFAULT_MINIMUM_LENGTH
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EncodeConfForm {
    Short(OneOrMany<CompressionAlgorithm>),
    Full {
        #[serde(default)]
        algorithms: OneOrMany<CompressionAlgorithm>,
        #[serde(default)]
        level: Option<u32>,
        #[serde(default = "default_minimum_length")]
        minimum_length: usize,
    },
}

/// Configuration of an `encode` directive
///
/// The short form `encode: gzip` or `encode: [gzip, br]` only lists the algorithms. An empty
/// algorithm list means gzip and Zstandard.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "EncodeConfForm")]
pub struct EncodeConf {
    /// Compression algorithms to use, out of `gzip`, `deflate`, `br` and `zstd`. The client's
    /// preferences decide which one is used.
    pub algorithms: OneOrMany<CompressionAlgorithm>,

    /// Compression level, the default level of the respective algorithm is used if omitted.
    /// Values beyond the maximal level of an algorithm are reduced accordingly.
    pub level: Option<u32>,

    /// Responses with shorter bodies are left uncompressed
    pub minimum_length: usize,
}

impl Default for EncodeConf {
    fn default() -> Self {
        Self {
            algorithms: default_algorithms(),
            level: None,
            minimum_length: DEFAULT_MINIMUM_LENGTH,
        }
    }
}

impl From<EncodeConfForm> for EncodeConf {
    fn from(value: EncodeConfForm) -> Self {
        let (algorithms, level, minimum_length) = match value {
            EncodeConfForm::Short(algorithms) => (algorithms, None, DEFAULT_MINIMUM_LENGTH),
            EncodeConfForm::Full {
                algorithms,
                level,
                minimum_length,
            } => (algorithms, level, minimum_length),
        };

        Self {
            algorithms: if algorithms.is_empty() {
                default_algorithms()
            } else {
                algorithms
            },
            level,
            minimum_length,
        }
    }
}
