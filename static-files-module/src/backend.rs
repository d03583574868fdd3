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

//! Resource backend serving files from a directory on disk

use async_trait::async_trait;
use bytes::Bytes;
use lantern_module_utils::{Cancellation, Error, ErrorType, ResourceBackend, ResourceKind};
use log::{debug, error, warn};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::path::resolve_uri;

fn cancelled(path: &str) -> Box<Error> {
    Error::explain(
        ErrorType::ConnectionClosed,
        format!("request cancelled while accessing {path}"),
    )
}

fn is_missing(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory)
}

/// Resource backend mapping root-relative paths to files below a root directory
///
/// Paths resolving outside the root directory (e.g. via `..` or symbolic links) are rejected with
/// 400 Bad Request. Paths running through a regular file like `/file.txt/foo` don’t exist. Other
/// I/O errors, permission errors included, are backend faults.
#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    /// Creates a new backend for the given root directory. This will canonicalize the path to the
    /// root directory and might result in an error if that path isn’t accessible.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, Box<Error>> {
        let root = root.as_ref();
        let canonical = root.canonicalize().map_err(|err| {
            Error::because(
                ErrorType::InternalError,
                format!("Failed accessing root path {root:?}"),
                err,
            )
        })?;
        if !canonical.is_dir() {
            return Err(Error::explain(
                ErrorType::InternalError,
                format!("Root path {root:?} isn’t a directory"),
            ));
        }

        debug!("Initialized file system backend for {canonical:?}");
        Ok(Self { root: canonical })
    }

    /// Returns the canonical path of the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn resolve(&self, path: &str) -> Result<Option<PathBuf>, Box<Error>> {
        match resolve_uri(path, &self.root).await {
            Ok(resolved) => Ok(Some(resolved)),
            Err(err) => resolve_error(path, err),
        }
    }
}

fn resolve_error(path: &str, err: std::io::Error) -> Result<Option<PathBuf>, Box<Error>> {
    match err.kind() {
        ErrorKind::NotFound | ErrorKind::NotADirectory => Ok(None),
        ErrorKind::InvalidInput => {
            warn!("rejecting invalid path {path}");
            Err(Error::explain(
                ErrorType::HTTPStatus(400),
                format!("invalid path {path}"),
            ))
        }
        ErrorKind::InvalidData => {
            warn!("Requested path outside root directory: {path}");
            Err(Error::explain(
                ErrorType::HTTPStatus(400),
                format!("path {path} outside root directory"),
            ))
        }
        _ => {
            error!("failed canonicalizing the path {path}: {err}");
            Err(Error::because(
                ErrorType::FileReadError,
                format!("failed resolving {path}"),
                err,
            ))
        }
    }
}

#[async_trait]
impl ResourceBackend for FsBackend {
    async fn exists(
        &self,
        path: &str,
        cancellation: &Cancellation,
    ) -> Result<ResourceKind, Box<Error>> {
        let lookup = async {
            let Some(resolved) = self.resolve(path).await? else {
                return Ok(ResourceKind::Absent);
            };

            let metadata = match tokio::fs::metadata(&resolved).await {
                Ok(metadata) => metadata,
                Err(err) if is_missing(&err) => return Ok(ResourceKind::Absent),
                Err(err) => {
                    error!("failed retrieving metadata for path {resolved:?}: {err}");
                    return Err(Error::because(
                        ErrorType::FileReadError,
                        format!("failed retrieving metadata of {path}"),
                        err,
                    ));
                }
            };

            Ok(if metadata.is_dir() {
                ResourceKind::Directory
            } else if metadata.is_file() && !path.ends_with('/') {
                ResourceKind::File
            } else {
                ResourceKind::Absent
            })
        };

        cancellation
            .run(lookup)
            .await
            .unwrap_or_else(|| Err(cancelled(path)))
    }

    async fn read(&self, path: &str, cancellation: &Cancellation) -> Result<Bytes, Box<Error>> {
        let read = async {
            let Some(resolved) = self.resolve(path).await? else {
                return Err(Error::explain(
                    ErrorType::HTTPStatus(404),
                    format!("file {path} not found"),
                ));
            };

            let contents = tokio::fs::read(&resolved).await.map_err(|err| {
                let etype = if is_missing(&err) {
                    ErrorType::HTTPStatus(404)
                } else {
                    error!("failed reading file {resolved:?}: {err}");
                    ErrorType::FileReadError
                };
                Error::because(etype, format!("failed reading {path}"), err)
            })?;
            Ok(Bytes::from(contents))
        };

        cancellation
            .run(read)
            .await
            .unwrap_or_else(|| Err(cancelled(path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    fn backend() -> FsBackend {
        let mut path: PathBuf = env!("CARGO_MANIFEST_DIR").into();
        path.push("testdata");
        path.push("root");
        FsBackend::new(path).unwrap()
    }

    fn status<T>(result: Result<T, Box<Error>>) -> Option<ErrorType> {
        result.err().map(|err| err.etype().clone())
    }

    #[test(tokio::test)]
    async fn exists() -> Result<(), Box<Error>> {
        let backend = backend();
        let cancellation = Cancellation::new();

        assert_eq!(
            backend.exists("/file.txt", &cancellation).await?,
            ResourceKind::File
        );
        assert_eq!(
            backend.exists("/docs", &cancellation).await?,
            ResourceKind::Directory
        );
        assert_eq!(
            backend.exists("/docs/", &cancellation).await?,
            ResourceKind::Directory
        );
        assert_eq!(backend.exists("/", &cancellation).await?, ResourceKind::Directory);
        assert_eq!(
            backend.exists("/file.txt/", &cancellation).await?,
            ResourceKind::Absent
        );
        assert_eq!(
            backend.exists("/missing", &cancellation).await?,
            ResourceKind::Absent
        );

        // Running through a regular file
        assert_eq!(
            backend.exists("/file.txt/foo", &cancellation).await?,
            ResourceKind::Absent
        );
        assert_eq!(
            backend.exists("/x/template.html/foo", &cancellation).await?,
            ResourceKind::Absent
        );
        Ok(())
    }

    #[test(tokio::test)]
    async fn read() -> Result<(), Box<Error>> {
        let backend = backend();
        let cancellation = Cancellation::new();

        assert_eq!(
            backend.read("/file.txt", &cancellation).await?,
            Bytes::from_static(b"Hello world!\n")
        );
        assert_eq!(
            status(backend.read("/missing", &cancellation).await),
            Some(ErrorType::HTTPStatus(404))
        );
        assert_eq!(
            status(backend.read("/docs", &cancellation).await),
            Some(ErrorType::FileReadError)
        );
        assert_eq!(
            status(backend.read("/file.txt/foo", &cancellation).await),
            Some(ErrorType::HTTPStatus(404))
        );
        Ok(())
    }

    #[test(tokio::test)]
    async fn outside_root() {
        let backend = backend();
        let cancellation = Cancellation::new();

        assert_eq!(
            status(backend.exists("/../../Cargo.toml", &cancellation).await),
            Some(ErrorType::HTTPStatus(400))
        );
        assert_eq!(
            status(backend.read("/../../Cargo.toml", &cancellation).await),
            Some(ErrorType::HTTPStatus(400))
        );
        assert_eq!(
            status(backend.exists("relative", &cancellation).await),
            Some(ErrorType::HTTPStatus(400))
        );
    }

    #[test]
    fn resolve_errors() {
        let error = |kind: ErrorKind| resolve_error("/path", std::io::Error::from(kind));

        assert_eq!(error(ErrorKind::NotFound).ok(), Some(None));
        assert_eq!(error(ErrorKind::NotADirectory).ok(), Some(None));
        assert_eq!(
            status(error(ErrorKind::PermissionDenied)),
            Some(ErrorType::FileReadError)
        );
        assert_eq!(
            status(error(ErrorKind::InvalidData)),
            Some(ErrorType::HTTPStatus(400))
        );
    }

    #[test(tokio::test)]
    async fn cancelled_request() {
        let backend = backend();
        let cancellation = Cancellation::new();
        cancellation.cancel();

        assert_eq!(
            status(backend.read("/file.txt", &cancellation).await),
            Some(ErrorType::ConnectionClosed)
        );
    }

    #[test]
    fn invalid_root() {
        let mut path: PathBuf = env!("CARGO_MANIFEST_DIR").into();
        path.push("testdata");
        path.push("does-not-exist");
        assert!(FsBackend::new(&path).is_err());

        path.pop();
        path.push("root");
        path.push("file.txt");
        assert!(FsBackend::new(&path).is_err());
    }
}
