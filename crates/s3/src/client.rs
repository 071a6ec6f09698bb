//! S3 client implementation
//!
//! Wraps aws-sdk-s3 and implements the urio `Client` contract. The bucket is
//! the URI host and the object key is the path without its leading `/`.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region};
use tokio::io::{AsyncRead, AsyncReadExt};
use urio_core::{
    BlockingRuntime, Capabilities, Client, ConnectionDescriptor, Entry, Error, Listable, Listing,
    Operation, ReadAdapter, ReadStream, Removable, Result, Target, Uri, WriteMode, WriteStream,
};

use crate::error::classify;
use crate::multipart::{MultipartConfig, S3Writer};

/// Region used when only a custom endpoint is given
const FALLBACK_REGION: &str = "us-east-1";

/// Options carried in the URI query string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct S3Options {
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores
    pub endpoint: Option<String>,
    pub path_style: bool,
    pub multipart: MultipartConfig,
}

impl S3Options {
    pub fn from_uri(uri: &Uri) -> Result<Self> {
        let invalid = |key: &str, value: &str| Error::MalformedUri {
            uri: uri.redacted(),
            reason: format!("invalid value '{value}' for {key}"),
        };

        let path_style = match uri.query_param("path_style") {
            None => false,
            Some("true" | "1" | "yes") => true,
            Some("false" | "0" | "no") => false,
            Some(other) => return Err(invalid("path_style", other)),
        };

        let mut multipart = MultipartConfig::default();
        if let Some(raw) = uri.query_param("part_size") {
            let size = raw.parse::<u64>().map_err(|_| invalid("part_size", raw))?;
            multipart = multipart.part_size(size);
        }

        Ok(Self {
            region: uri.query_param("region").map(str::to_string),
            endpoint: uri.query_param("endpoint").map(str::to_string),
            path_style,
            multipart,
        })
    }
}

/// S3 client wrapper
pub struct S3Client {
    inner: aws_sdk_s3::Client,
    runtime: Arc<BlockingRuntime>,
    target: Target,
    bucket: String,
    options: S3Options,
    io_timeout: Duration,
}

impl S3Client {
    /// Create a new S3 client from a resolved connection
    ///
    /// Credentials come from the URI userinfo when present, otherwise from
    /// the default AWS provider chain.
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
        let options = S3Options::from_uri(uri)?;
        let runtime = BlockingRuntime::new().map_err(|e| target.connection(Operation::Connect, e))?;

        let timeouts = TimeoutConfig::builder()
            .connect_timeout(descriptor.connect_timeout())
            .read_timeout(descriptor.io_timeout())
            .build();

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .retry_config(RetryConfig::disabled())
            .timeout_config(timeouts);

        if let (Some(access_key), Some(secret_key)) = (uri.username(), uri.password()) {
            let credentials = aws_credential_types::Credentials::new(
                access_key,
                secret_key.expose(),
                uri.query_param("session_token").map(str::to_string),
                None,
                "urio-uri-credentials",
            );
            loader = loader.credentials_provider(credentials);
        }

        match (&options.region, &options.endpoint) {
            (Some(region), _) => loader = loader.region(Region::new(region.clone())),
            (None, Some(_)) => loader = loader.region(Region::new(FALLBACK_REGION)),
            (None, None) => {}
        }
        if let Some(endpoint) = &options.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let config = runtime.block_on(loader.load());
        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(options.path_style)
            .build();

        tracing::debug!(target = %target, bucket = %bucket, "Created S3 client");

        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
            runtime: Arc::new(runtime),
            target,
            bucket,
            options,
            io_timeout: descriptor.io_timeout(),
        })
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn object_key(&self, operation: Operation, path: &str) -> Result<String> {
        let key = path.trim_start_matches('/');
        if key.is_empty() {
            return Err(self
                .target
                .transfer(operation, "an object key is required"));
        }
        Ok(key.to_string())
    }

    fn prefix_exists(&self, key: &str) -> Result<bool> {
        let prefix = format!("{}/", key.trim_end_matches('/'));
        let response = self
            .runtime
            .block_on(
                self.inner
                    .list_objects_v2()
                    .bucket(&self.bucket)
                    .prefix(&prefix)
                    .max_keys(1)
                    .send(),
            )
            .map_err(|e| classify(&self.target, Operation::Exists, key, e))?;
        Ok(response.key_count().unwrap_or(0) > 0 || !response.contents().is_empty())
    }
}

impl Client for S3Client {
    fn target(&self) -> &Target {
        &self.target
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            append: false,
            ..Capabilities::all()
        }
    }

    fn get_reader(&self, path: &str) -> Result<ReadStream> {
        let key = self.object_key(Operation::Open, path)?;
        let response = self
            .runtime
            .block_on(self.inner.get_object().bucket(&self.bucket).key(&key).send())
            .map_err(|e| classify(&self.target, Operation::Open, path, e))?;

        let adapter = S3Reader {
            body: Some(Box::pin(response.body.into_async_read())),
            runtime: Arc::clone(&self.runtime),
            target: self.target.clone(),
            path: path.to_string(),
            io_timeout: self.io_timeout,
        };
        Ok(ReadStream::new(self.target.clone(), path, adapter))
    }

    fn get_writer(&self, path: &str, mode: WriteMode) -> Result<WriteStream> {
        if mode == WriteMode::Append {
            return Err(self.target.unsupported(Operation::Append));
        }
        self.object_key(Operation::Write, path)?;
        let adapter = S3Writer::new(
            self.inner.clone(),
            Arc::clone(&self.runtime),
            self.target.clone(),
            self.bucket.clone(),
            path,
            self.options.multipart,
        );
        Ok(WriteStream::new(self.target.clone(), path, adapter))
    }

    fn exists(&self, path: &str) -> Result<bool> {
        let key = path.trim_start_matches('/');
        if key.is_empty() {
            let result = self
                .runtime
                .block_on(self.inner.head_bucket().bucket(&self.bucket).send());
            return match result {
                Ok(_) => Ok(true),
                Err(e) if e.as_service_error().is_some_and(|s| s.is_not_found()) => Ok(false),
                Err(e) => Err(classify(&self.target, Operation::Exists, path, e)),
            };
        }

        let result = self
            .runtime
            .block_on(self.inner.head_object().bucket(&self.bucket).key(key).send());
        match result {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|s| s.is_not_found()) => {
                self.prefix_exists(key)
            }
            Err(e) => Err(classify(&self.target, Operation::Exists, path, e)),
        }
    }

    fn as_listable(&self) -> Option<&dyn Listable> {
        Some(self)
    }

    fn as_removable(&self) -> Option<&dyn Removable> {
        Some(self)
    }
}

impl Listable for S3Client {
    fn list(&self, prefix: &str) -> Result<Listing> {
        Ok(Box::new(S3Listing {
            client: self.inner.clone(),
            runtime: Arc::clone(&self.runtime),
            target: self.target.clone(),
            bucket: self.bucket.clone(),
            prefix: list_prefix(prefix),
            continuation_token: None,
            pending: VecDeque::new(),
            done: false,
        }))
    }
}

impl Removable for S3Client {
    fn remove(&self, path: &str) -> Result<()> {
        let key = self.object_key(Operation::Remove, path)?;
        self.runtime
            .block_on(
                self.inner
                    .delete_object()
                    .bucket(&self.bucket)
                    .key(&key)
                    .send(),
            )
            .map_err(|e| classify(&self.target, Operation::Remove, path, e))?;
        tracing::debug!(target = %self.target, key = %key, "Deleted object");
        Ok(())
    }
}

/// Turn a URI path into a ListObjectsV2 prefix
fn list_prefix(path: &str) -> String {
    let key = path.trim_start_matches('/');
    if key.is_empty() || key.ends_with('/') {
        key.to_string()
    } else {
        format!("{key}/")
    }
}

struct S3Reader {
    body: Option<Pin<Box<dyn AsyncRead + Send>>>,
    runtime: Arc<BlockingRuntime>,
    target: Target,
    path: String,
    io_timeout: Duration,
}

impl ReadAdapter for S3Reader {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(body) = self.body.as_mut() else {
            return Ok(0);
        };
        match self.runtime.block_on_timeout(self.io_timeout, body.read(buf)) {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) => Err(self.target.io(Operation::Read, &self.path, e)),
            Err(_) => Err(self.target.timeout(
                Operation::Read,
                format!("no data within {:?}", self.io_timeout),
            )),
        }
    }

    fn release(&mut self) -> Result<()> {
        self.body = None;
        Ok(())
    }
}

/// Lazy, page-by-page listing
struct S3Listing {
    client: aws_sdk_s3::Client,
    runtime: Arc<BlockingRuntime>,
    target: Target,
    bucket: String,
    prefix: String,
    continuation_token: Option<String>,
    pending: VecDeque<Entry>,
    done: bool,
}

impl S3Listing {
    fn fetch_page(&mut self) -> Result<()> {
        let response = self
            .runtime
            .block_on(
                self.client
                    .list_objects_v2()
                    .bucket(&self.bucket)
                    .prefix(&self.prefix)
                    .delimiter("/")
                    .set_continuation_token(self.continuation_token.take())
                    .send(),
            )
            .map_err(|e| classify(&self.target, Operation::List, &self.prefix, e))?;

        for common in response.common_prefixes() {
            if let Some(p) = common.prefix() {
                let rel = p.strip_prefix(&self.prefix).unwrap_or(p);
                self.pending.push_back(Entry::dir(rel));
            }
        }

        for object in response.contents() {
            let key = object.key().unwrap_or_default();
            let rel = key.strip_prefix(&self.prefix).unwrap_or(key);
            if rel.is_empty() {
                continue;
            }
            let modified = object
                .last_modified()
                .and_then(|m| jiff::Timestamp::from_second(m.secs()).ok());
            let size = object.size().unwrap_or(0).max(0) as u64;
            self.pending
                .push_back(Entry::file(rel, size).with_last_modified(modified));
        }

        self.continuation_token = response.next_continuation_token().map(str::to_string);
        self.done = !response.is_truncated().unwrap_or(false) || self.continuation_token.is_none();
        Ok(())
    }
}

impl Iterator for S3Listing {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.pending.pop_front() {
                return Some(Ok(entry));
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.fetch_page() {
                self.done = true;
                return Some(Err(e));
            }
        }
    }
}
