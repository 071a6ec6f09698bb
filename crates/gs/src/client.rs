//! Google Cloud Storage client implementation
//!
//! Talks to the GCS JSON API with a blocking reqwest agent. The bucket is the
//! URI host and the object name is the path without its leading `/`. Uploads
//! are spooled to an anonymous temporary file and sent as one media upload on
//! commit, so an aborted writer never creates or replaces an object.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::sync::Arc;

use reqwest::StatusCode;
use reqwest::blocking::{Client as HttpAgent, RequestBuilder, Response};
use reqwest::header::CONTENT_TYPE;
use url::Url;
use urio_core::{
    Capabilities, Client, ConnectionDescriptor, Entry, Error, Listable, Listing, Operation,
    ReadStream, Removable, Result, Secret, Target, Uri, WriteAdapter, WriteMode, WriteStream,
};

use crate::objects::ObjectPage;

pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";
pub const TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

const USER_AGENT: &str = concat!("urio/", env!("CARGO_PKG_VERSION"));

/// Options carried in the URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GsOptions {
    pub endpoint: Url,
    pub token: Option<Secret>,
    /// Project billed for requester-pays buckets
    pub user_project: Option<String>,
}

impl GsOptions {
    pub fn from_uri(uri: &Uri) -> Result<Self> {
        let raw = uri.query_param("endpoint").unwrap_or(DEFAULT_ENDPOINT);
        let endpoint = Url::parse(raw)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| Error::MalformedUri {
                uri: uri.redacted(),
                reason: format!("invalid endpoint '{raw}'"),
            })?;

        let token = uri
            .query_param("token")
            .map(Secret::new)
            .or_else(|| uri.password().cloned())
            .or_else(|| {
                std::env::var(TOKEN_ENV)
                    .ok()
                    .filter(|t| !t.is_empty())
                    .map(Secret::new)
            });

        Ok(Self {
            endpoint,
            token,
            user_project: uri.query_param("user_project").map(str::to_string),
        })
    }
}

/// Shared by the client and its writers
struct Api {
    agent: HttpAgent,
    target: Target,
    bucket: String,
    options: GsOptions,
}

impl Api {
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.options.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| self.target.connection(Operation::Connect, "endpoint cannot be a base URL"))?
            .pop_if_empty()
            .extend(segments);
        if let Some(project) = &self.options.user_project {
            url.query_pairs_mut().append_pair("userProject", project);
        }
        Ok(url)
    }

    fn object_url(&self, name: &str) -> Result<Url> {
        self.url(&["storage", "v1", "b", &self.bucket, "o", name])
    }

    fn objects_url(&self) -> Result<Url> {
        self.url(&["storage", "v1", "b", &self.bucket, "o"])
    }

    fn send(&self, operation: Operation, path: &str, request: RequestBuilder) -> Result<Response> {
        let request = match &self.options.token {
            Some(token) => request.bearer_auth(token.expose()),
            None => request,
        };
        request
            .send()
            .map_err(|e| classify_error(&self.target, operation, e))
            .and_then(|response| check_status(&self.target, operation, path, response))
    }

    fn list_page(&self, prefix: &str, page_token: Option<&str>, max: Option<u32>) -> Result<ObjectPage> {
        let mut url = self.objects_url()?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("prefix", prefix).append_pair("delimiter", "/");
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
            if let Some(max) = max {
                query.append_pair("maxResults", &max.to_string());
            }
        }
        let response = self.send(Operation::List, prefix, self.agent.get(url))?;
        serde_json::from_reader(response)
            .map_err(|e| self.target.transfer(Operation::List, format!("bad listing: {e}")))
    }
}

/// GCS client for one bucket
pub struct GsClient {
    api: Arc<Api>,
}

impl GsClient {
    pub fn connect(descriptor: &ConnectionDescriptor) -> Result<Self> {
        let uri = &descriptor.uri;
        let target = descriptor.target();
        let bucket = uri
            .host()
            .ok_or_else(|| Error::MalformedUri {
                uri: uri.redacted(),
                reason: "missing bucket".into(),
            })?
            .to_string();
        let options = GsOptions::from_uri(uri)?;
        if options.token.is_none() {
            tracing::debug!(target = %target, "No access token, sending anonymous requests");
        }

        let agent = HttpAgent::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(descriptor.connect_timeout())
            .timeout(descriptor.io_timeout())
            .build()
            .map_err(|e| target.connection(Operation::Connect, e))?;

        tracing::debug!(target = %target, bucket = %bucket, "Created GCS client");
        Ok(Self {
            api: Arc::new(Api {
                agent,
                target,
                bucket,
                options,
            }),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.api.bucket
    }

    fn object_name(&self, operation: Operation, path: &str) -> Result<String> {
        let name = path.trim_start_matches('/');
        if name.is_empty() {
            return Err(self
                .api
                .target
                .transfer(operation, "an object name is required"));
        }
        Ok(name.to_string())
    }
}

impl Client for GsClient {
    fn target(&self) -> &Target {
        &self.api.target
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            append: false,
            ..Capabilities::all()
        }
    }

    fn get_reader(&self, path: &str) -> Result<ReadStream> {
        let name = self.object_name(Operation::Open, path)?;
        let mut url = self.api.object_url(&name)?;
        url.query_pairs_mut().append_pair("alt", "media");
        tracing::debug!(target = %self.api.target, object = %name, "Downloading object");
        let response = self.api.send(Operation::Open, path, self.api.agent.get(url))?;
        Ok(ReadStream::from_reader(self.api.target.clone(), path, response))
    }

    fn get_writer(&self, path: &str, mode: WriteMode) -> Result<WriteStream> {
        if mode == WriteMode::Append {
            return Err(self.api.target.unsupported(Operation::Append));
        }
        let name = self.object_name(Operation::Write, path)?;
        let spool = tempfile::tempfile().map_err(|e| self.api.target.io(Operation::Write, path, e))?;
        let adapter = GsWriter {
            api: Arc::clone(&self.api),
            spool: Some(spool),
            name,
            path: path.to_string(),
        };
        Ok(WriteStream::new(self.api.target.clone(), path, adapter))
    }

    fn exists(&self, path: &str) -> Result<bool> {
        let name = path.trim_start_matches('/');
        if name.is_empty() {
            let url = self.api.url(&["storage", "v1", "b", &self.api.bucket])?;
            return found(self.api.send(Operation::Exists, path, self.api.agent.get(url)));
        }

        let url = self.api.object_url(name)?;
        if found(self.api.send(Operation::Exists, path, self.api.agent.get(url)))? {
            return Ok(true);
        }
        // Folders only exist as name prefixes
        let prefix = format!("{}/", name.trim_end_matches('/'));
        let page = self.api.list_page(&prefix, None, Some(1))?;
        Ok(!page.items.is_empty() || !page.prefixes.is_empty())
    }

    fn as_listable(&self) -> Option<&dyn Listable> {
        Some(self)
    }

    fn as_removable(&self) -> Option<&dyn Removable> {
        Some(self)
    }
}

impl Listable for GsClient {
    fn list(&self, prefix: &str) -> Result<Listing> {
        Ok(Box::new(GsListing {
            api: Arc::clone(&self.api),
            prefix: list_prefix(prefix),
            page_token: None,
            pending: VecDeque::new(),
            done: false,
        }))
    }
}

impl Removable for GsClient {
    fn remove(&self, path: &str) -> Result<()> {
        let name = self.object_name(Operation::Remove, path)?;
        let url = self.api.object_url(&name)?;
        self.api
            .send(Operation::Remove, path, self.api.agent.delete(url))?;
        tracing::debug!(target = %self.api.target, object = %name, "Deleted object");
        Ok(())
    }
}

/// Spools writes locally and uploads them in one request on commit
struct GsWriter {
    api: Arc<Api>,
    spool: Option<File>,
    name: String,
    path: String,
}

impl GsWriter {
    fn spool(&mut self) -> Result<&mut File> {
        self.spool
            .as_mut()
            .ok_or_else(|| self.api.target.transfer(Operation::Write, "upload already finished"))
    }
}

impl WriteAdapter for GsWriter {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let result = self.spool()?.write(buf);
        result.map_err(|e| self.api.target.io(Operation::Write, &self.path, e))
    }

    fn flush(&mut self) -> Result<()> {
        let result = self.spool()?.flush();
        result.map_err(|e| self.api.target.io(Operation::Flush, &self.path, e))
    }

    fn commit(&mut self) -> Result<()> {
        let Some(mut spool) = self.spool.take() else {
            return Ok(());
        };
        spool
            .seek(SeekFrom::Start(0))
            .map_err(|e| self.api.target.io(Operation::Close, &self.path, e))?;

        let mut url = self.api.url(&["upload", "storage", "v1", "b", &self.api.bucket, "o"])?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", &self.name);
        let content_type = mime_guess::from_path(&self.name)
            .first_or_octet_stream()
            .to_string();

        let request = self
            .api
            .agent
            .post(url)
            .header(CONTENT_TYPE, content_type)
            .body(spool);
        self.api.send(Operation::Close, &self.path, request)?;
        tracing::debug!(target = %self.api.target, object = %self.name, "Uploaded object");
        Ok(())
    }

    fn abort(&mut self) -> Result<()> {
        if self.spool.take().is_some() {
            tracing::debug!(target = %self.api.target, object = %self.name, "Discarded upload");
        }
        Ok(())
    }
}

/// Lazy, page-by-page listing
struct GsListing {
    api: Arc<Api>,
    prefix: String,
    page_token: Option<String>,
    pending: VecDeque<Entry>,
    done: bool,
}

impl Iterator for GsListing {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.pending.pop_front() {
                return Some(Ok(entry));
            }
            if self.done {
                return None;
            }
            match self.api.list_page(&self.prefix, self.page_token.as_deref(), None) {
                Ok(mut page) => {
                    self.page_token = page.next_page_token.take();
                    self.done = self.page_token.is_none();
                    self.pending.extend(page.entries(&self.prefix));
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Turn a URI path into an `objects.list` prefix
fn list_prefix(path: &str) -> String {
    let name = path.trim_start_matches('/');
    if name.is_empty() || name.ends_with('/') {
        name.to_string()
    } else {
        format!("{name}/")
    }
}

fn found(response: Result<Response>) -> Result<bool> {
    match response {
        Ok(_) => Ok(true),
        Err(Error::NotFound { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

fn classify_error(target: &Target, operation: Operation, err: reqwest::Error) -> Error {
    let err = err.without_url();
    if err.is_timeout() {
        target.timeout(operation, err)
    } else if err.is_connect() {
        target.connection(operation, err)
    } else {
        target.transfer(operation, err)
    }
}

fn check_status(
    target: &Target,
    operation: Operation,
    path: &str,
    response: Response,
) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(status_error(target, operation, path, status))
}

fn status_error(target: &Target, operation: Operation, path: &str, status: StatusCode) -> Error {
    match status {
        StatusCode::NOT_FOUND => target.not_found(operation, path),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            target.connection(operation, format!("HTTP {status}"))
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            target.timeout(operation, format!("HTTP {status}"))
        }
        _ => target.transfer(operation, format!("HTTP {status}")),
    }
}
