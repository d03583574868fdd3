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

//! # Rewrite Module for Lantern Web Server
//!
//! This crate contains the directive handlers changing where a request goes: `redir` makes the
//! client request a different URL, `rewrite` changes the request path internally and `try_files`
//! rewrites the request to the first candidate existing in the resource backend.
//!
//! ```yaml
//! directives:
//! - redir: /x/
//!   match: /x
//! - try_files: ["{path}", "{path}/", "{path}.html"]
//! - rewrite: /x/template.html
//!   match: /x/*
//! - redir:
//!     to: https://example.com{path}
//!     status: permanent
//!   match: {prefix: /moved}
//! ```
//!
//! ## Redirects
//!
//! A `redir` directive always terminates the request with a redirect response. `to` is the
//! redirect target, placeholders like `{path}` or `{host}` are resolved. `status` defaults to
//! 302 and has to be a 3xx status code, `temporary` (302) and `permanent` (301) are accepted as
//! well.
//!
//! ## Internal rewrites
//!
//! A `rewrite` directive replaces the current path, the client never sees the change. The query
//! string is kept unless the target contains a `?`. Directives that follow see the new path, the
//! ones already processed are never revisited.
//!
//! ## Trying files
//!
//! `try_files` lists candidate paths. A candidate ending with `/` has to exist as a directory,
//! other candidates have to exist as files. The request is rewritten to the first candidate that
//! exists. If none exists, the request continues unchanged unless the last candidate is a status
//! code like `=404`.

pub mod configuration;
mod redirect;
mod rewrite;
mod try_files;

pub use redirect::RedirectHandler;
pub use rewrite::RewriteHandler;
pub use try_files::TryFilesHandler;
