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

//! Interfaces of the external collaborators: the resource backend providing files and the
//! upstream dispatcher forwarding requests to other servers.

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Debug, Display, Formatter};

use crate::{Cancellation, Error, ErrorType};

/// Result of an existence check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// A regular file that can be read
    File,
    /// A directory
    Directory,
    /// Nothing exists at this location
    Absent,
}

/// Existence and content lookups for root-relative paths like `/dir/file.txt`
///
/// Implementations have to allow concurrent calls. A missing resource is not an error: `exists`
/// reports it as [`ResourceKind::Absent`]. Errors are reserved for backend faults like permission
/// problems or I/O failures.
#[async_trait]
pub trait ResourceBackend: Debug + Send + Sync {
    /// Determines what exists at the given path.
    async fn exists(
        &self,
        path: &str,
        cancellation: &Cancellation,
    ) -> Result<ResourceKind, Box<Error>>;

    /// Reads the contents of the file at the given path. Reading a missing file results in an
    /// `HTTPStatus(404)` error.
    async fn read(&self, path: &str, cancellation: &Cancellation) -> Result<Bytes, Box<Error>>;
}

/// An upstream server as selected by configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    /// Host name or IP address to connect to
    pub host: String,
    /// Port to connect to
    pub port: u16,
    /// `true` if the connection should use TLS
    pub tls: bool,
    /// `host` or `host:port` of the upstream server, as to be sent in the `Host` header
    pub host_port: String,
}

impl Display for Upstream {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let scheme = if self.tls { "https" } else { "http" };
        write!(f, "{scheme}://{}", self.host_port)
    }
}

/// Forwards requests to upstream servers
///
/// Connection failures should be reported as connection errors like [`ErrorType::ConnectError`],
/// these result in a 502 Bad Gateway response. An [`ErrorType::HTTPStatus`] error lets the
/// dispatcher choose a different status code.
#[async_trait]
pub trait UpstreamDispatcher: Debug + Send + Sync {
    /// Sends the request to the upstream server and returns its response.
    async fn forward(
        &self,
        request: Request<Bytes>,
        upstream: &Upstream,
        cancellation: &Cancellation,
    ) -> Result<Response<Bytes>, Box<Error>>;
}

/// A resource backend keeping all files in memory
///
/// Directories are implied by the files: `/dir` exists as a directory if some file path starts
/// with `/dir/`. The root directory always exists.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    files: BTreeMap<String, Bytes>,
    faulty: BTreeSet<String>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file, the path should start with `/`.
    pub fn with_file(mut self, path: impl Into<String>, contents: impl Into<Bytes>) -> Self {
        self.files.insert(path.into(), contents.into());
        self
    }

    /// Marks a path as faulty, any access to it produces an I/O error.
    pub fn with_fault(mut self, path: impl Into<String>) -> Self {
        self.faulty.insert(path.into());
        self
    }

    fn check_fault(&self, path: &str) -> Result<(), Box<Error>> {
        if self.faulty.contains(path) {
            Err(Error::explain(
                ErrorType::FileReadError,
                format!("simulated I/O failure accessing {path}"),
            ))
        } else {
            Ok(())
        }
    }

    fn is_directory(&self, path: &str) -> bool {
        let dir = path.trim_end_matches('/');
        if dir.is_empty() {
            return true;
        }

        let prefix = format!("{dir}/");
        self.files
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(name, _)| name.starts_with(&prefix))
    }
}

#[async_trait]
impl ResourceBackend for MemoryBackend {
    async fn exists(
        &self,
        path: &str,
        _cancellation: &Cancellation,
    ) -> Result<ResourceKind, Box<Error>> {
        self.check_fault(path)?;

        Ok(if !path.ends_with('/') && self.files.contains_key(path) {
            ResourceKind::File
        } else if self.is_directory(path) {
            ResourceKind::Directory
        } else {
            ResourceKind::Absent
        })
    }

    async fn read(&self, path: &str, _cancellation: &Cancellation) -> Result<Bytes, Box<Error>> {
        self.check_fault(path)?;

        self.files.get(path).cloned().ok_or_else(|| {
            Error::explain(ErrorType::HTTPStatus(404), format!("file {path} not found"))
        })
    }
}
