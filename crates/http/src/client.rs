//! HTTP client implementation

use reqwest::StatusCode;
use reqwest::blocking::{Client as HttpAgent, RequestBuilder, Response};
use url::Url;
use urio_core::resolver::{CONNECT_TIMEOUT_PARAM, IO_TIMEOUT_PARAM};
use urio_core::{
    Capabilities, Client, ConnectionDescriptor, Error, Operation, ReadStream, Result, Secret,
    Target, Uri,
};

const USER_AGENT: &str = concat!("urio/", env!("CARGO_PKG_VERSION"));

/// Blocking HTTP client for one origin
pub struct HttpClient {
    target: Target,
    agent: HttpAgent,
    origin: Url,
    query: Vec<(String, String)>,
    user: Option<String>,
    password: Option<Secret>,
}

impl HttpClient {
    pub fn connect(descriptor: &ConnectionDescriptor) -> Result<Self> {
        let uri = &descriptor.uri;
        let target = descriptor.target();
        let origin = origin(uri)?;

        let agent = HttpAgent::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(descriptor.connect_timeout())
            .timeout(descriptor.io_timeout())
            .build()
            .map_err(|e| target.connection(Operation::Connect, e))?;

        let query = uri
            .query()
            .iter()
            .filter(|(key, _)| *key != CONNECT_TIMEOUT_PARAM && *key != IO_TIMEOUT_PARAM)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(Self {
            target,
            agent,
            origin,
            query,
            user: uri.username().map(str::to_string),
            password: uri.password().cloned(),
        })
    }

    /// Full request URL for `path`
    pub fn url_for(&self, path: &str) -> Url {
        let mut url = self.origin.clone();
        url.set_path(path);
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        url
    }

    fn send(&self, operation: Operation, path: &str, request: RequestBuilder) -> Result<Response> {
        let request = match &self.user {
            Some(user) => request.basic_auth(user, self.password.as_ref().map(Secret::expose)),
            None => request,
        };
        request
            .send()
            .map_err(|e| classify_error(&self.target, operation, e))
            .and_then(|response| check_status(&self.target, operation, path, response))
    }
}

impl Client for HttpClient {
    fn target(&self) -> &Target {
        &self.target
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            exists: true,
            ..Capabilities::read_only()
        }
    }

    fn get_reader(&self, path: &str) -> Result<ReadStream> {
        let url = self.url_for(path);
        tracing::debug!(target = %self.target, path, "GET");
        let response = self.send(Operation::Open, path, self.agent.get(url))?;
        Ok(ReadStream::from_reader(self.target.clone(), path, response))
    }

    fn exists(&self, path: &str) -> Result<bool> {
        let url = self.url_for(path);
        match self.send(Operation::Exists, path, self.agent.head(url)) {
            Ok(_) => Ok(true),
            Err(Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn origin(uri: &Uri) -> Result<Url> {
    let host = uri.host().ok_or_else(|| Error::MalformedUri {
        uri: uri.redacted(),
        reason: "missing host".into(),
    })?;
    let raw = match uri.port() {
        Some(port) => format!("{}://{host}:{port}/", uri.scheme()),
        None => format!("{}://{host}/", uri.scheme()),
    };
    Url::parse(&raw).map_err(|e| Error::MalformedUri {
        uri: uri.redacted(),
        reason: e.to_string(),
    })
}

fn classify_error(target: &Target, operation: Operation, err: reqwest::Error) -> Error {
    // The URL may carry credential query parameters
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
        StatusCode::NOT_FOUND | StatusCode::GONE => target.not_found(operation, path),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            target.connection(operation, format!("HTTP {status}"))
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            target.timeout(operation, format!("HTTP {status}"))
        }
        _ => target.transfer(operation, format!("HTTP {status}")),
    }
}
