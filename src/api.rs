// Transport session: a single blocking HTTP client with a cookie jar,
// reused for every request the process makes. Connection problems and
// non-2xx answers to POSTs surface as transport errors, before anybody
// looks at the call headers.

use crate::encoder::Attachment;
use crate::error::{ClientError, Result};
use reqwest::blocking::{multipart, Client};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::Url;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Header telling whether the call itself succeeded (`True`/`False`).
pub const CALL_SUCCESS_HEADER: &str = "x-callsuccess";
/// Error kind tag on failed calls.
pub const ERROR_TYPE_HEADER: &str = "x-errortype";
/// Server path to poll for a generated file.
pub const DOWNLOAD_HEADER: &str = "x-download";
/// Suggested file name for the download.
pub const DOWNLOAD_NAME_HEADER: &str = "x-download-defaultname";

pub const CALL_PATH: &str = "/api/call";
pub const LOGIN_PATH: &str = "/api/login";

/// Body of a POST request.
#[derive(Debug)]
pub enum PostBody {
    Json(Value),
    /// JSON under the `request` field plus one file part per attachment.
    Multipart {
        request: Value,
        attachments: Vec<Attachment>,
    },
    Form(Vec<(String, String)>),
}

/// What came back from the server. Header names are lowercase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Reply {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// The call succeeded only when the server says exactly `True`.
    pub fn call_succeeded(&self) -> bool {
        self.header(CALL_SUCCESS_HEADER) == Some("True")
    }

    /// Explicit `False` in the success header.
    pub fn call_failed(&self) -> bool {
        self.header(CALL_SUCCESS_HEADER) == Some("False")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// The HTTP operations the call protocol needs.
pub trait Transport {
    /// POST to `path`. Non-2xx statuses are errors.
    fn post(&self, path: &str, body: PostBody) -> Result<Reply>;

    /// Plain GET used for download polling. Any status is returned as-is.
    fn get(&self, path: &str) -> Result<Reply>;

    /// Cookies the jar would send to the host, as a `Cookie` header value.
    fn cookie_blob(&self) -> Option<String>;

    /// Put previously saved cookies back into the jar.
    fn restore_cookies(&self, blob: &str);

    fn host(&self) -> &str;
}

/// reqwest backed transport holding the base URL and the shared jar.
pub struct ApiClient {
    client: Client,
    base_url: Url,
    host: String,
    jar: Arc<Jar>,
}

impl ApiClient {
    pub fn new(host: &str, verify_certificate: bool) -> Result<Self> {
        let base_url = Url::parse(host).map_err(|_| ClientError::InvalidHost(host.to_string()))?;
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .danger_accept_invalid_certs(!verify_certificate)
            .build()
            .map_err(|source| ClientError::Transport {
                host: host.to_string(),
                source,
            })?;
        Ok(ApiClient {
            client,
            base_url,
            host: host.trim_end_matches('/').to_string(),
            jar,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.host, path.trim_start_matches('/'))
    }

    fn transport_error(&self, source: reqwest::Error) -> ClientError {
        ClientError::Transport {
            host: self.host.clone(),
            source,
        }
    }

    fn read_reply(&self, res: reqwest::blocking::Response) -> Result<Reply> {
        let status = res.status().as_u16();
        let headers = res
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = res.bytes().map_err(|e| self.transport_error(e))?.to_vec();
        Ok(Reply {
            status,
            headers,
            body,
        })
    }
}

impl Transport for ApiClient {
    fn post(&self, path: &str, body: PostBody) -> Result<Reply> {
        let url = self.url(path);
        let req = self.client.post(&url);
        let req = match body {
            PostBody::Json(value) => req
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(value.to_string()),
            PostBody::Multipart {
                request,
                attachments,
            } => {
                let mut form = multipart::Form::new().text("request", request.to_string());
                for attachment in attachments {
                    let file_name = attachment
                        .path
                        .file_name()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_else(|| attachment.field.clone());
                    // A sized part lets the form send Content-Length instead
                    // of a chunked body.
                    let length = attachment
                        .file
                        .metadata()
                        .map_err(|source| ClientError::Attachment {
                            path: attachment.path.clone(),
                            source,
                        })?
                        .len();
                    let part = multipart::Part::reader_with_length(attachment.file, length)
                        .file_name(file_name);
                    form = form.part(attachment.field, part);
                }
                req.multipart(form)
            }
            PostBody::Form(fields) => req.form(&fields),
        };

        tracing::debug!(%url, "POST");
        let res = req.send().map_err(|e| self.transport_error(e))?;
        if !res.status().is_success() {
            return Err(ClientError::HttpStatus {
                url,
                status: res.status().as_u16(),
            });
        }
        self.read_reply(res)
    }

    fn get(&self, path: &str) -> Result<Reply> {
        let url = self.url(path);
        tracing::debug!(%url, "GET");
        let res = self
            .client
            .get(&url)
            .send()
            .map_err(|e| self.transport_error(e))?;
        self.read_reply(res)
    }

    fn cookie_blob(&self) -> Option<String> {
        self.jar
            .cookies(&self.base_url)
            .and_then(|v| v.to_str().ok().map(str::to_string))
    }

    fn restore_cookies(&self, blob: &str) {
        for pair in blob.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            self.jar.add_cookie_str(pair, &self.base_url);
        }
    }

    fn host(&self) -> &str {
        &self.host
    }
}
