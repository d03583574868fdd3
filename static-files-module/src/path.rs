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

//! Path resolution logic

use percent_encoding::percent_decode_str;
use std::io::{Error, ErrorKind};
use std::path::{Path, PathBuf};

#[cfg(unix)]
fn path_from_bytes(bytes: &[u8]) -> &std::ffi::OsStr {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    OsStr::from_bytes(bytes)
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: &[u8]) -> String {
    // With this fallback non-Unicode file names cannot be found.
    String::from_utf8_lossy(bytes).into_owned()
}

/// Resolves a root-relative URI path against the path to a canonical root directory.
///
/// This will return an error under the following conditions:
///
/// * Invalid path, not starting with a slash (/): results in [`ErrorKind::InvalidInput`]
/// * Resolved path outside the root directory: results in [`ErrorKind::InvalidData`]
/// * [`tokio::fs::canonicalize()`] failed: results in [`ErrorKind::NotFound`],
///   [`ErrorKind::NotADirectory`] (path running through a regular file),
///   [`ErrorKind::PermissionDenied`] and other errors
pub(crate) async fn resolve_uri(uri_path: &str, root: &Path) -> Result<PathBuf, Error> {
    let uri_path = uri_path.strip_prefix('/').ok_or(ErrorKind::InvalidInput)?;
    let uri_path = uri_path.strip_suffix('/').unwrap_or(uri_path);

    let mut path = root.to_path_buf();
    if !uri_path.is_empty() {
        for component in uri_path.split('/') {
            let decoded = percent_decode_str(component).collect::<Vec<_>>();
            if decoded.contains(&b'/') || decoded.contains(&0) {
                return Err(ErrorKind::InvalidInput.into());
            }
            path.push(path_from_bytes(&decoded));
        }
    }

    let path = tokio::fs::canonicalize(path).await?;
    if path.starts_with(root) {
        Ok(path)
    } else {
        Err(ErrorKind::InvalidData.into())
    }
}
