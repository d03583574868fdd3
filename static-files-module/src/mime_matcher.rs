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

//! Matching MIME types against a list

use mime_guess::Mime;
use std::collections::HashSet;

use crate::configuration::MimeMatch;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct MimeMatcher {
    exact: HashSet<String>,
    type_: HashSet<String>,
    prefix: Vec<String>,
    suffix: Vec<String>,
}

impl MimeMatcher {
    pub(crate) fn add(&mut self, mime: MimeMatch) {
        match mime {
            MimeMatch::Exact(essence) => {
                self.exact.insert(essence);
            }
            MimeMatch::Type(type_) => {
                self.type_.insert(type_);
            }
            MimeMatch::Prefix(prefix) => self.prefix.push(prefix),
            MimeMatch::Suffix(suffix) => self.suffix.push(suffix),
        }
    }

    /// Checks a MIME type, parameters like `charset` are ignored.
    pub(crate) fn matches(&self, mime: &Mime) -> bool {
        let essence = mime.essence_str();
        self.exact.contains(essence)
            || self.type_.contains(mime.type_().as_str())
            || self.prefix.iter().any(|prefix| essence.starts_with(prefix))
            || self.suffix.iter().any(|suffix| essence.ends_with(suffix))
    }
}

impl FromIterator<MimeMatch> for MimeMatcher {
    fn from_iter<I: IntoIterator<Item = MimeMatch>>(iter: I) -> Self {
        let mut matcher = Self::default();
        for mime in iter {
            matcher.add(mime);
        }
        matcher
    }
}
