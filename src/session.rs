// Session persistence: the cookies from the last successful login, keyed
// by the identity they belong to. Loading never fails the program; a
// missing or broken file just means starting unauthenticated.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const SESSION_FILE: &str = "session.json";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub identity: String,
    pub cookies: String,
}

/// File backed store for a single saved session.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: PathBuf) -> Self {
        SessionStore { path }
    }

    /// Store living in the scratch directory under the client home.
    pub fn in_dir(tmp_dir: &Path) -> Self {
        SessionStore::new(tmp_dir.join(SESSION_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Option<StoredSession> {
        let text = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&text) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "ignoring unreadable session file");
                None
            }
        }
    }

    /// Saved cookies, but only when they belong to `identity`.
    pub fn load_for(&self, identity: &str) -> Option<String> {
        self.load()
            .filter(|s| s.identity == identity)
            .map(|s| s.cookies)
    }

    pub fn save(&self, cookies: &str, identity: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let session = StoredSession {
            identity: identity.to_string(),
            cookies: cookies.to_string(),
        };
        let text = serde_json::to_string(&session).map_err(std::io::Error::from)?;
        fs::write(&self.path, text)?;
        tracing::info!(identity, path = %self.path.display(), "session saved");
        Ok(())
    }
}
