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

//! # Static Files Module for Lantern Web Server
//!
//! This crate serves local content: the `file_server` directive handler serves files from the
//! resource backend, the `templates` directive handler executes served text files as templates.
//! [`FsBackend`] is a resource backend mapping request paths to files below a root directory.
//!
//! ## Supported functionality
//!
//! * `GET` and `HEAD` requests
//! * Page configurable to display on 404 Not Found errors instead of the standard error page
//! * File names that are never served, e.g. `.htaccess`
//! * Serving pre-compressed versions of the files (gzip, zlib deflate, compress, Brotli,
//!   Zstandard algorithms supported)
//! * Templates with request properties and placeholders
//!
//! Directories are never served. Index files are resolved by a `try_files` directive declared
//! before `file_server`:
//!
//! ```yaml
//! directives:
//! - templates: {}
//!   match: {prefix: /docs}
//! - try_files: ["{path}index.html", "{path}"]
//! - file_server:
//!     hide: .htaccess
//!     precompressed: [br, gz]
//!     page_404: /404.html
//! ```
//!
//! ## Compression support
//!
//! With `precompressed: [br, gz]` a client requesting `file.txt` and sending HTTP header
//! `Accept-Encoding: br, gzip` will receive `file.txt.br` file or, if not found, `file.txt.gz`
//! file. The order in which the handler looks for pre-compressed files is determined by the
//! client’s compression algorithm preferences.
//!
//! Dynamic compression is provided by the `encode` directive of `compression-module`. It leaves
//! pre-compressed responses alone.
//!
//! ## Templates
//!
//! A `templates` directive doesn’t produce a response, it registers a transformation for the
//! response served later. Responses with a MIME type listed in `mime_types` (`text/html`,
//! `text/plain` and `text/markdown` by default) are executed as templates:
//!
//! ```text
//! <p>You requested {{.Path}} on {{.Host}} with {{placeholder "header.User-Agent"}}</p>
//! ```
//!
//! Malformed templates or unknown actions result in 500 Internal Server Error.

mod backend;
pub mod configuration;
mod file_server;
mod mime_matcher;
mod path;
mod templates;


pub use backend::FsBackend;
pub use file_server::FileServerHandler;
pub use templates::TemplatesHandler;
