// Client context: everything one invocation needs, built once at startup
// and passed to each operation.

use crate::api::{ApiClient, Transport};
use crate::config::Config;
use crate::descriptor::{self, ApiDescriptor, API_INFO_CALL};
use crate::dispatch::{bootstrap_call, CancelToken, DownloadPolicy};
use crate::error::{ClientError, Result};
use crate::oauth::{GoogleDeviceFlow, IdentityProvider};
use crate::session::SessionStore;
use crate::ui::{Console, TerminalConsole};

pub struct ClientContext {
    pub config: Config,
    pub transport: Box<dyn Transport>,
    pub console: Box<dyn Console>,
    pub identity_provider: Box<dyn IdentityProvider>,
    pub sessions: SessionStore,
    pub descriptor: Option<ApiDescriptor>,
    pub download: DownloadPolicy,
    pub cancel: CancelToken,
}

impl ClientContext {
    /// Context wired to the real network and terminal.
    pub fn from_config(config: Config) -> Result<Self> {
        let transport = ApiClient::new(&config.host, config.verify_certificate)?;
        Ok(Self::with_parts(
            config,
            Box::new(transport),
            Box::new(TerminalConsole::new()),
            Box::new(GoogleDeviceFlow::new()?),
        ))
    }

    pub fn with_parts(
        config: Config,
        transport: Box<dyn Transport>,
        console: Box<dyn Console>,
        identity_provider: Box<dyn IdentityProvider>,
    ) -> Self {
        let download = DownloadPolicy {
            interval: config.download_interval(),
            max_attempts: config.download_max_attempts,
        };
        ClientContext {
            sessions: SessionStore::in_dir(&config.tmp_dir()),
            config,
            transport,
            console,
            identity_provider,
            descriptor: None,
            download,
            cancel: CancelToken::default(),
        }
    }

    /// Load the descriptor from the cache file, or fetch it from the
    /// server and write the cache. Done once per process.
    pub fn ensure_descriptor(&mut self) -> Result<&ApiDescriptor> {
        if self.descriptor.is_none() {
            let path = descriptor::cache_path(&self.config.tmp_dir());
            let loaded = match descriptor::load_cache(&path)? {
                Some(cached) => cached,
                None => {
                    tracing::info!("no cached API description, asking the server");
                    let body = bootstrap_call(self, API_INFO_CALL)?;
                    let fetched = ApiDescriptor::from_json(&body).map_err(|source| {
                        ClientError::MalformedReply {
                            call: API_INFO_CALL.to_string(),
                            source,
                        }
                    })?;
                    descriptor::save_cache(&path, &body)?;
                    fetched
                }
            };
            self.descriptor = Some(loaded);
        }
        Ok(self.descriptor.get_or_insert_with(ApiDescriptor::default))
    }

    /// Attach saved cookies when they belong to `identity`.
    pub fn resume_session(&self, identity: &str) -> bool {
        match self.sessions.load_for(identity) {
            Some(cookies) => {
                self.transport.restore_cookies(&cookies);
                tracing::debug!(identity, "resumed saved session");
                true
            }
            None => false,
        }
    }
}
