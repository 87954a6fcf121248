// Scripted stand-ins for the network, the terminal and the identity
// provider, so the call protocol can be exercised without either.

use crate::api::{PostBody, Reply, Transport, CALL_SUCCESS_HEADER, ERROR_TYPE_HEADER, LOGIN_PATH};
use crate::error::{ClientError, Result};
use crate::oauth::{DelegatedIdentity, IdentityProvider, OAuthKeys};
use crate::ui::Console;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Successful call reply with a plain text body.
pub fn call_ok(body: &str) -> Reply {
    Reply::new(200, body)
        .with_header("Content-Type", "text/plain; charset=utf-8")
        .with_header(CALL_SUCCESS_HEADER, "True")
}

/// Failed call reply, optionally tagged with an error kind.
pub fn call_failed(body: &str, error_type: Option<&str>) -> Reply {
    let reply = Reply::new(200, body)
        .with_header("Content-Type", "text/plain")
        .with_header(CALL_SUCCESS_HEADER, "False");
    match error_type {
        Some(kind) => reply.with_header(ERROR_TYPE_HEADER, kind),
        None => reply,
    }
}

pub fn permission_denied() -> Reply {
    call_failed("You must be logged in to do that.", Some("PermissionError"))
}

/// Download not generated yet.
pub fn not_ready() -> Reply {
    Reply::new(204, Vec::new())
}

/// What a request looked like when it reached the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Json { path: String, body: Value },
    Multipart {
        path: String,
        request: Value,
        attachments: Vec<(String, PathBuf)>,
    },
    Form {
        path: String,
        fields: Vec<(String, String)>,
    },
    Get { path: String },
}

#[derive(Default)]
struct TransportState {
    replies: VecDeque<Reply>,
    requests: Vec<Recorded>,
    cookies: Option<String>,
    login_cookie: Option<String>,
}

/// Transport answering from a queue of canned replies.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    state: Rc<RefCell<TransportState>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, reply: Reply) -> &Self {
        self.state.borrow_mut().replies.push_back(reply);
        self
    }

    /// Cookie the server sets on a successful login.
    pub fn set_login_cookie(&self, cookie: &str) {
        self.state.borrow_mut().login_cookie = Some(cookie.to_string());
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.borrow().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.borrow().requests.len()
    }

    pub fn remaining_replies(&self) -> usize {
        self.state.borrow().replies.len()
    }

    fn next_reply(&self) -> Result<Reply> {
        self.state
            .borrow_mut()
            .replies
            .pop_front()
            .ok_or_else(|| ClientError::Io(std::io::Error::other("no scripted reply left")))
    }
}

impl Transport for ScriptedTransport {
    fn post(&self, path: &str, body: PostBody) -> Result<Reply> {
        let recorded = match body {
            PostBody::Json(body) => Recorded::Json {
                path: path.to_string(),
                body,
            },
            PostBody::Multipart {
                request,
                attachments,
            } => Recorded::Multipart {
                path: path.to_string(),
                request,
                attachments: attachments.into_iter().map(|a| (a.field, a.path)).collect(),
            },
            PostBody::Form(fields) => Recorded::Form {
                path: path.to_string(),
                fields,
            },
        };
        self.state.borrow_mut().requests.push(recorded);

        let reply = self.next_reply()?;
        if !reply.is_success() {
            return Err(ClientError::HttpStatus {
                url: path.to_string(),
                status: reply.status,
            });
        }
        let mut state = self.state.borrow_mut();
        if path == LOGIN_PATH && reply.call_succeeded() {
            if let Some(cookie) = state.login_cookie.clone() {
                state.cookies = Some(cookie);
            }
        }
        Ok(reply)
    }

    fn get(&self, path: &str) -> Result<Reply> {
        self.state.borrow_mut().requests.push(Recorded::Get {
            path: path.to_string(),
        });
        self.next_reply()
    }

    fn cookie_blob(&self) -> Option<String> {
        self.state.borrow().cookies.clone()
    }

    fn restore_cookies(&self, blob: &str) {
        self.state.borrow_mut().cookies = Some(blob.to_string());
    }

    fn host(&self) -> &str {
        "http://scripted.invalid"
    }
}

#[derive(Default)]
struct ConsoleState {
    lines: Vec<String>,
    save_paths: VecDeque<String>,
    overwrite_answers: VecDeque<bool>,
    passwords: VecDeque<String>,
    password_prompts: usize,
}

/// Console that records output and answers prompts from a script.
/// Unscripted prompts get an empty answer or "no".
#[derive(Clone, Default)]
pub struct ScriptedConsole {
    state: Rc<RefCell<ConsoleState>>,
}

impl ScriptedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer_save_path(&self, path: &str) -> &Self {
        self.state.borrow_mut().save_paths.push_back(path.to_string());
        self
    }

    pub fn answer_overwrite(&self, yes: bool) -> &Self {
        self.state.borrow_mut().overwrite_answers.push_back(yes);
        self
    }

    pub fn answer_password(&self, password: &str) -> &Self {
        self.state.borrow_mut().passwords.push_back(password.to_string());
        self
    }

    pub fn lines(&self) -> Vec<String> {
        self.state.borrow().lines.clone()
    }

    pub fn password_prompts(&self) -> usize {
        self.state.borrow().password_prompts
    }
}

impl Console for ScriptedConsole {
    fn say(&mut self, line: &str) {
        self.state.borrow_mut().lines.push(line.to_string());
    }

    fn ask_save_path(&mut self, _default: &str) -> std::io::Result<String> {
        Ok(self.state.borrow_mut().save_paths.pop_front().unwrap_or_default())
    }

    fn confirm_overwrite(&mut self, _path: &Path) -> std::io::Result<bool> {
        Ok(self
            .state
            .borrow_mut()
            .overwrite_answers
            .pop_front()
            .unwrap_or(false))
    }

    fn ask_password(&mut self, _identity: &str) -> std::io::Result<String> {
        let mut state = self.state.borrow_mut();
        state.password_prompts += 1;
        Ok(state.passwords.pop_front().unwrap_or_default())
    }
}

/// Identity provider that vouches for a fixed email.
#[derive(Clone)]
pub struct FixedIdentity {
    identity: DelegatedIdentity,
    seen_keys: Rc<RefCell<Vec<OAuthKeys>>>,
}

impl FixedIdentity {
    pub fn new(email: &str, verified: bool) -> Self {
        FixedIdentity {
            identity: DelegatedIdentity {
                email: email.to_string(),
                verified,
                access_token: "delegated-token".to_string(),
            },
            seen_keys: Rc::default(),
        }
    }

    pub fn seen_keys(&self) -> Vec<OAuthKeys> {
        self.seen_keys.borrow().clone()
    }
}

impl IdentityProvider for FixedIdentity {
    fn authorize(&mut self, keys: &OAuthKeys, _console: &mut dyn Console) -> Result<DelegatedIdentity> {
        self.seen_keys.borrow_mut().push(keys.clone());
        Ok(self.identity.clone())
    }
}
