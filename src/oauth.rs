// Delegated identity login. The server hands out OAuth2 client keys; the
// user signs in with the third party and we get back an access token
// plus the email address the provider vouches for.

use crate::error::{ClientError, Result};
use crate::ui::Console;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::thread;
use std::time::{Duration, Instant};

/// Bootstrap call returning the OAuth2 client keys.
pub const OAUTH_KEYS_CALL: &str = "get_oauth2_keys";

const DEVICE_CODE_URL: &str = "https://oauth2.googleapis.com/device/code";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const SCOPE: &str = "https://www.googleapis.com/auth/userinfo.email";
const DEVICE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct OAuthKeys {
    #[serde(rename = "CLIENT_ID")]
    pub client_id: String,
    #[serde(rename = "CLIENT_SECRET")]
    pub client_secret: String,
}

/// Who the third party says the user is.
#[derive(Debug, Clone, PartialEq)]
pub struct DelegatedIdentity {
    pub email: String,
    pub verified: bool,
    pub access_token: String,
}

pub trait IdentityProvider {
    fn authorize(&mut self, keys: &OAuthKeys, console: &mut dyn Console)
        -> Result<DelegatedIdentity>;
}

#[derive(Deserialize, Debug)]
struct DeviceCode {
    device_code: String,
    user_code: String,
    #[serde(alias = "verification_uri")]
    verification_url: String,
    expires_in: u64,
    interval: Option<u64>,
}

#[derive(Deserialize, Debug, Default)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Deserialize, Debug)]
struct UserInfo {
    email: String,
    #[serde(default)]
    verified_email: bool,
}

#[derive(Debug, PartialEq)]
enum TokenPoll {
    Ready(String),
    Pending,
    SlowDown,
    Failed(String),
}

impl From<TokenResponse> for TokenPoll {
    fn from(res: TokenResponse) -> Self {
        if let Some(token) = res.access_token {
            return TokenPoll::Ready(token);
        }
        match res.error.as_deref() {
            Some("authorization_pending") => TokenPoll::Pending,
            Some("slow_down") => TokenPoll::SlowDown,
            Some(other) => TokenPoll::Failed(match res.error_description {
                Some(desc) => format!("{}: {}", other, desc),
                None => other.to_string(),
            }),
            None => TokenPoll::Failed("token endpoint returned neither token nor error".into()),
        }
    }
}

fn oauth_err(e: reqwest::Error) -> ClientError {
    ClientError::OAuth(e.to_string())
}

/// Google sign-in using the OAuth2 device authorization grant.
pub struct GoogleDeviceFlow {
    client: Client,
}

impl GoogleDeviceFlow {
    pub fn new() -> Result<Self> {
        let client = Client::builder().build().map_err(oauth_err)?;
        Ok(GoogleDeviceFlow { client })
    }

    fn request_token(&self, keys: &OAuthKeys, code: &DeviceCode, console: &mut dyn Console) -> Result<String> {
        let deadline = Instant::now() + Duration::from_secs(code.expires_in);
        let mut interval = Duration::from_secs(code.interval.unwrap_or(5));
        console.waiting("Waiting for you to approve the sign-in...");
        let token = loop {
            if Instant::now() >= deadline {
                break Err(ClientError::OAuth("device code expired".into()));
            }
            thread::sleep(interval);
            let res: TokenResponse = self
                .client
                .post(TOKEN_URL)
                .form(&[
                    ("client_id", keys.client_id.as_str()),
                    ("client_secret", keys.client_secret.as_str()),
                    ("device_code", code.device_code.as_str()),
                    ("grant_type", DEVICE_GRANT),
                ])
                .send()
                .and_then(|r| r.json())
                .map_err(oauth_err)?;
            match TokenPoll::from(res) {
                TokenPoll::Ready(token) => break Ok(token),
                TokenPoll::Pending => {}
                TokenPoll::SlowDown => interval += Duration::from_secs(5),
                TokenPoll::Failed(msg) => break Err(ClientError::OAuth(msg)),
            }
        };
        console.done_waiting();
        token
    }
}

impl IdentityProvider for GoogleDeviceFlow {
    fn authorize(&mut self, keys: &OAuthKeys, console: &mut dyn Console) -> Result<DelegatedIdentity> {
        let code: DeviceCode = self
            .client
            .post(DEVICE_CODE_URL)
            .form(&[("client_id", keys.client_id.as_str()), ("scope", SCOPE)])
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(oauth_err)?;

        console.say(&format!(
            "To sign in, visit {} and enter the code {}",
            code.verification_url, code.user_code
        ));
        let access_token = self.request_token(keys, &code, console)?;

        let info: UserInfo = self
            .client
            .get(USERINFO_URL)
            .bearer_auth(&access_token)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(oauth_err)?;

        Ok(DelegatedIdentity {
            email: info.email,
            verified: info.verified_email,
            access_token,
        })
    }
}
