use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, CONNECTION};
use serde::de::DeserializeOwned;

use super::{
    quote_path, AddedEntry, IpfsApi, LsResponse, PublishedName, RemovedPins, ResolvedPath,
    VersionInfo,
};
use crate::config::RemoteConfig;
use crate::error::ApiError;

/// Blocking HTTP client for the daemon API. All endpoints are POST with
/// query-string arguments; responses are JSON except `cat` (raw bytes) and
/// `add` (newline-delimited JSON).
pub struct IpfsClient {
    http: Client,
    base: String,
    auth: Option<(String, String)>,
    cid_version: String,
    chunker: String,
}

impl IpfsClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        // Some daemon versions misbehave behind keep-alive; close after
        // each request, matching HTTP/1.0 connection semantics.
        headers.insert(CONNECTION, HeaderValue::from_static("close"));

        let http = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base: format!(
                "{}:{}/{}",
                config.url,
                config.port,
                quote_path(&config.version_prefix)
            ),
            auth: config
                .auth()
                .map(|(user, password)| (user.to_string(), password.to_string())),
            cid_version: config.cid_version.to_string(),
            chunker: config.chunker.clone(),
        })
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.base, name)
    }

    fn post(&self, name: &str) -> RequestBuilder {
        let mut request = self.http.post(self.endpoint(name));
        if let Some((user, password)) = &self.auth {
            request = request.basic_auth(user, Some(password));
        }
        request
    }

    fn check(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().unwrap_or_default().trim().to_string();
        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }

    fn json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let body = Self::check(response)?.bytes()?;
        serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

impl IpfsApi for IpfsClient {
    fn version(&self) -> Result<VersionInfo, ApiError> {
        Self::json(self.post("version").send()?)
    }

    fn ls(&self, path: &str) -> Result<LsResponse, ApiError> {
        Self::json(self.post("ls").query(&[("arg", path)]).send()?)
    }

    fn cat(&self, path: &str) -> Result<Vec<u8>, ApiError> {
        let response = Self::check(self.post("cat").query(&[("arg", path)]).send()?)?;
        Ok(response.bytes()?.to_vec())
    }

    fn add(&self, files: &[(String, Vec<u8>)]) -> Result<Vec<AddedEntry>, ApiError> {
        let mut form = multipart::Form::new();
        for (name, content) in files {
            let part = multipart::Part::bytes(content.clone())
                .file_name(quote_path(name))
                .mime_str("application/octet-stream")?;
            form = form.part("file", part);
        }

        let response = Self::check(
            self.post("add")
                .query(&[
                    ("wrap-with-directory", "true"),
                    ("pin", "true"),
                    ("raw-leaves", "true"),
                    ("cid-version", self.cid_version.as_str()),
                    ("chunker", self.chunker.as_str()),
                ])
                .multipart(form)
                .send()?,
        )?;

        parse_add_response(&response.text()?)
    }

    fn name_resolve(&self, name: &str) -> Result<ResolvedPath, ApiError> {
        Self::json(self.post("name/resolve").query(&[("arg", name)]).send()?)
    }

    fn name_publish(
        &self,
        cid: &str,
        key: &str,
        lifetime: &str,
    ) -> Result<PublishedName, ApiError> {
        Self::json(
            self.post("name/publish")
                .query(&[
                    ("arg", cid),
                    ("key", key),
                    ("lifetime", lifetime),
                    ("allow-offline", "true"),
                    ("resolve", "true"),
                    ("ipns-base", "base36"),
                ])
                .send()?,
        )
    }

    fn pin_rm(&self, path: &str) -> Result<RemovedPins, ApiError> {
        Self::json(
            self.post("pin/rm")
                .query(&[("arg", path), ("recursive", "true")])
                .send()?,
        )
    }
}

/// The `add` endpoint streams one JSON object per line; the wrapper
/// directory is the last one.
fn parse_add_response(body: &str) -> Result<Vec<AddedEntry>, ApiError> {
    let mut entries = Vec::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let entry: AddedEntry =
            serde_json::from_str(line).map_err(|e| ApiError::Decode(e.to_string()))?;
        entries.push(entry);
    }
    if entries.is_empty() {
        return Err(ApiError::Decode("empty add response".to_string()));
    }
    Ok(entries)
}
