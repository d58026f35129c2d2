//! AXIS network camera over VAPIX HTTP with digest authentication.
//!
//! The first request goes out without credentials; a `401` carrying a
//! `WWW-Authenticate: Digest` challenge is answered and retried once. The
//! challenge is kept so later requests authenticate up front with an
//! increasing nonce count, and replaced whenever the camera rejects it.

use async_trait::async_trait;
use digest_auth::{AuthContext, WwwAuthenticateHeader};
use reqwest::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{Client, Response, StatusCode, Url};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::{Camera, CameraError};
use crate::config::{CameraConfig, Credentials};

const GOOD_STATUS: [StatusCode; 2] = [StatusCode::OK, StatusCode::NO_CONTENT];

pub struct AxisCamera {
    client: Client,
    base: Url,
    ptz_path: String,
    jpeg_path: String,
    zoom: u32,
    username: String,
    password: String,
    challenge: Mutex<Option<WwwAuthenticateHeader>>,
}

impl AxisCamera {
    pub fn new(credentials: &Credentials, camera: &CameraConfig, timeout: Duration) -> Result<Self, CameraError> {
        let base = if credentials.host.contains("://") {
            credentials.host.clone()
        } else {
            format!("http://{}", credentials.host)
        };
        let base = Url::parse(&base).map_err(|e| CameraError::Url(format!("{}: {}", base, e)))?;
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base,
            ptz_path: camera.ptz_path.clone(),
            jpeg_path: camera.jpeg_path.clone(),
            zoom: camera.zoom,
            username: credentials.username.clone(),
            password: credentials.password.clone(),
            challenge: Mutex::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, CameraError> {
        self.base
            .join(path)
            .map_err(|e| CameraError::Url(format!("{}: {}", path, e)))
    }

    /// `ptz.cgi?pan=<p>&tilt=<t>&zoom=<z>`
    pub fn ptz_url(&self, pan: i32, tilt: i32) -> Result<Url, CameraError> {
        let mut url = self.endpoint(&self.ptz_path)?;
        url.query_pairs_mut()
            .append_pair("pan", &pan.to_string())
            .append_pair("tilt", &tilt.to_string())
            .append_pair("zoom", &self.zoom.to_string());
        Ok(url)
    }

    pub fn jpeg_url(&self) -> Result<Url, CameraError> {
        self.endpoint(&self.jpeg_path)
    }

    fn cached_challenge(&self) -> MutexGuard<'_, Option<WwwAuthenticateHeader>> {
        self.challenge.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn context<'a>(&'a self, url: &Url) -> AuthContext<'a> {
        let uri = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        AuthContext::new(self.username.as_str(), self.password.as_str(), uri)
    }

    /// Authorization from the cached challenge, if there is one.
    fn preemptive_authorization(&self, url: &Url) -> Option<String> {
        let context = self.context(url);
        let mut cached = self.cached_challenge();
        let prompt = cached.as_mut()?;
        match prompt.respond(&context) {
            Ok(answer) => Some(answer.to_header_string()),
            Err(e) => {
                tracing::debug!("Discarding cached digest challenge: {}", e);
                *cached = None;
                None
            }
        }
    }

    fn answer_challenge(&self, url: &Url, header: &str) -> Result<String, CameraError> {
        let mut prompt = digest_auth::parse(header).map_err(|e| CameraError::Auth(e.to_string()))?;
        let answer = prompt
            .respond(&self.context(url))
            .map_err(|e| CameraError::Auth(e.to_string()))?;
        *self.cached_challenge() = Some(prompt);
        Ok(answer.to_header_string())
    }

    async fn send(&self, url: &Url, authorization: Option<&str>) -> Result<Response, CameraError> {
        let mut request = self.client.get(url.clone());
        if let Some(value) = authorization {
            request = request.header(AUTHORIZATION, value);
        }
        Ok(request.send().await?)
    }

    /// GET with digest authentication.
    async fn get(&self, url: &Url) -> Result<Response, CameraError> {
        let authorization = self.preemptive_authorization(url);
        let response = self.send(url, authorization.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(header) = response.headers().get(WWW_AUTHENTICATE) else {
            return Ok(response);
        };
        let header = header
            .to_str()
            .map_err(|e| CameraError::Auth(format!("unreadable challenge: {}", e)))?
            .to_string();
        tracing::debug!("Answering digest challenge for {}", url.path());
        let authorization = self.answer_challenge(url, &header)?;
        self.send(url, Some(&authorization)).await
    }

    fn check_status(url: &Url, response: &Response) -> Result<(), CameraError> {
        if GOOD_STATUS.contains(&response.status()) {
            Ok(())
        } else {
            Err(CameraError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            })
        }
    }
}

#[async_trait]
impl Camera for AxisCamera {
    async fn move_to(&self, pan: i32, tilt: i32) -> Result<(), CameraError> {
        let url = self.ptz_url(pan, tilt)?;
        let response = self.get(&url).await?;
        Self::check_status(&url, &response)?;
        tracing::info!("Moved camera to pan={} tilt={} zoom={}", pan, tilt, self.zoom);
        Ok(())
    }

    async fn capture_frame(&self) -> Result<Vec<u8>, CameraError> {
        let url = self.jpeg_url()?;
        let response = self.get(&url).await?;
        Self::check_status(&url, &response)?;
        Ok(response.bytes().await?.to_vec())
    }
}

impl std::fmt::Debug for AxisCamera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AxisCamera")
            .field("base", &self.base.as_str())
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}
