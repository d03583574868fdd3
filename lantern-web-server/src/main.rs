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

use bytes::Bytes;
use clap::Parser;
use http::{HeaderName, HeaderValue, Method, Request};
use lantern_module_utils::{Error, ErrorType, FromYaml};
use lantern_web_server::configuration::PipelineConf;
use lantern_web_server::Pipeline;
use log::error;
use static_files_module::FsBackend;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use upstream_module::UnavailableDispatcher;

/// Evaluate requests against a Lantern Web Server configuration
#[derive(Debug, Parser)]
struct Opt {
    /// Configuration file to load
    #[clap(short, long)]
    conf: PathBuf,

    /// Root directory of the files to serve
    #[clap(short, long, default_value = ".")]
    root: PathBuf,

    /// Request method
    #[clap(short, long, default_value = "GET")]
    method: String,

    /// Request header like "Accept-Encoding: gzip", can be specified multiple times
    #[clap(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Request URIs like /docs/ or http://localhost/docs/
    #[clap(required = true)]
    uris: Vec<String>,
}

fn invalid_option(message: String) -> Box<Error> {
    Error::explain(ErrorType::InternalError, message)
}

fn build_request(opt: &Opt, uri: &str) -> Result<Request<Bytes>, Box<Error>> {
    let method = Method::from_bytes(opt.method.to_ascii_uppercase().as_bytes())
        .map_err(|_| invalid_option(format!("invalid request method {}", opt.method)))?;

    let mut request = Request::new(Bytes::new());
    *request.method_mut() = method;
    *request.uri_mut() = uri
        .parse()
        .map_err(|_| invalid_option(format!("invalid request URI {uri}")))?;

    for header in &opt.headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| invalid_option(format!("header {header} lacks a colon")))?;
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|_| invalid_option(format!("invalid header name in {header}")))?;
        let value = HeaderValue::from_str(value.trim())
            .map_err(|_| invalid_option(format!("invalid header value in {header}")))?;
        request.headers_mut().append(name, value);
    }

    Ok(request)
}

fn run(opt: &Opt) -> Result<(), Box<Error>> {
    let conf = PipelineConf::load_from_yaml(&opt.conf)?;
    let pipeline = Pipeline::from_conf(
        conf,
        Arc::new(FsBackend::new(&opt.root)?),
        Arc::new(UnavailableDispatcher),
    )?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .map_err(|err| Error::because(ErrorType::InternalError, "failed starting runtime", err))?;

    let mut stdout = std::io::stdout().lock();
    for uri in &opt.uris {
        let request = build_request(opt, uri)?;
        let response = runtime.block_on(pipeline.handle(request));

        let mut output = format!("{uri}: {:?} {}\n", response.version(), response.status());
        for (name, value) in response.headers() {
            output.push_str(&format!("{name}: {}\n", String::from_utf8_lossy(value.as_bytes())));
        }
        output.push('\n');

        stdout
            .write_all(output.as_bytes())
            .and_then(|()| stdout.write_all(response.body()))
            .and_then(|()| stdout.write_all(b"\n"))
            .map_err(|err| Error::because(ErrorType::WriteError, "failed writing output", err))?;
    }
    Ok(())
}

fn main() {
    env_logger::init();

    let opt = Opt::parse();
    if let Err(err) = run(&opt) {
        error!("{err}");
    }
}
