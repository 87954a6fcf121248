// Call dispatcher: one API invocation from encoded arguments to a typed
// outcome. Interactive calls also print the result and, when the server
// asks for it, poll for a generated file and save it.

use crate::api::{
    PostBody, Reply, Transport, CALL_PATH, DOWNLOAD_HEADER, DOWNLOAD_NAME_HEADER,
    ERROR_TYPE_HEADER,
};
use crate::context::ClientContext;
use crate::encoder::{encode, CallArgs, CallRequest, Payload};
use crate::error::{ClientError, Result};
use crate::ui::Console;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Error kind the server uses for missing or expired authorization.
pub const PERMISSION_ERROR: &str = "PermissionError";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_DOWNLOAD_NAME: &str = "downloaded_file";

const EXPECTED_CONTENT_TYPE: &str = "text/plain";

/// How the server judged a call that reached it.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    Success(String),
    /// Authorization is missing or expired; logging in may help.
    NeedsAuth(String),
    Failure(String),
}

impl CallOutcome {
    pub fn into_result(self) -> Result<String> {
        match self {
            CallOutcome::Success(body) => Ok(body),
            CallOutcome::NeedsAuth(text) => Err(ClientError::Permission(text)),
            CallOutcome::Failure(text) => Err(ClientError::Server(text)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Print the result and handle downloads.
    Interactive,
    /// Return the body untouched.
    Backend,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadPolicy {
    pub interval: Duration,
    /// `None` polls until the server answers one way or the other.
    pub max_attempts: Option<u32>,
}

impl Default for DownloadPolicy {
    fn default() -> Self {
        DownloadPolicy {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
        }
    }
}

/// Shared flag that stops download polling.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of polling a download ticket.
#[derive(Debug, PartialEq)]
pub enum PollResult {
    Ready(Vec<u8>),
    /// The server gave up; carries its explanation.
    Failed(String),
}

/// Read the call headers of a reply that already passed the transport
/// checks.
pub fn interpret(reply: &Reply) -> CallOutcome {
    let text = reply.text();
    if reply.call_succeeded() {
        CallOutcome::Success(text)
    } else if reply.header(ERROR_TYPE_HEADER) == Some(PERMISSION_ERROR) {
        CallOutcome::NeedsAuth(text)
    } else {
        CallOutcome::Failure(text)
    }
}

fn send(transport: &dyn Transport, request: CallRequest) -> Result<Reply> {
    let name = request.name().to_string();
    // Attachments are opened here; a bad path stops us before any I/O.
    let Payload { json, attachments } = request.into_payload()?;
    let body = if attachments.is_empty() {
        PostBody::Json(json)
    } else {
        PostBody::Multipart {
            request: json,
            attachments,
        }
    };

    tracing::debug!(call = %name, "sending call");
    let reply = transport.post(CALL_PATH, body)?;

    let content_type = reply.header("content-type").unwrap_or_default();
    if !content_type.starts_with(EXPECTED_CONTENT_TYPE) {
        tracing::warn!(
            "expecting {} content, got {}; you may need to update this program",
            EXPECTED_CONTENT_TYPE,
            content_type.split(';').next().unwrap_or_default()
        );
    }
    Ok(reply)
}

/// Invoke `name` with `args`. Transport and local failures are errors;
/// whatever the server decided about the call is the outcome.
pub fn invoke(ctx: &mut ClientContext, mode: Mode, name: &str, args: CallArgs) -> Result<CallOutcome> {
    let request = encode(name, args, ctx.descriptor.as_ref())?;
    let reply = send(ctx.transport.as_ref(), request)?;
    let outcome = interpret(&reply);

    if mode == Mode::Backend {
        return Ok(outcome);
    }
    if let CallOutcome::Success(body) = &outcome {
        ctx.console.say(body);
        if let Some(ticket) = reply.header(DOWNLOAD_HEADER) {
            let default_name = reply
                .header(DOWNLOAD_NAME_HEADER)
                .unwrap_or(DEFAULT_DOWNLOAD_NAME);
            download(ctx, ticket, default_name)?;
        }
    }
    Ok(outcome)
}

/// Argument-less call made while bootstrapping (descriptor, OAuth keys).
/// Arguments pass through raw and anything but success is an error.
pub fn bootstrap_call(ctx: &mut ClientContext, name: &str) -> Result<String> {
    let request = encode(name, CallArgs::default(), None)?;
    let reply = send(ctx.transport.as_ref(), request)?;
    interpret(&reply).into_result()
}

fn download(ctx: &mut ClientContext, ticket: &str, default_name: &str) -> Result<()> {
    let console = ctx.console.as_mut();
    console.say("The server is requesting that you download a file...");

    let default_path = format!("./{}", default_name);
    let answer = console.ask_save_path(&default_path)?;
    let save_to = match answer.trim() {
        "" => PathBuf::from(default_path),
        path => PathBuf::from(path),
    };

    if save_to.is_file() && !console.confirm_overwrite(&save_to)? {
        return Err(ClientError::Aborted);
    }

    match poll_download(
        ctx.transport.as_ref(),
        console,
        ticket,
        &ctx.download,
        &ctx.cancel,
    )? {
        PollResult::Ready(content) => {
            fs::write(&save_to, content)?;
            console.say(&format!("File saved to {}.", save_to.display()));
        }
        PollResult::Failed(text) => {
            console.say(&format!("Server could not create archive: {}", text));
        }
    }
    Ok(())
}

/// Poll `ticket` until the file is ready or the server reports failure.
/// Any status other than 200 means "not yet".
pub fn poll_download(
    transport: &dyn Transport,
    console: &mut dyn Console,
    ticket: &str,
    policy: &DownloadPolicy,
    cancel: &CancelToken,
) -> Result<PollResult> {
    let mut attempts = 0u32;
    let result = loop {
        if cancel.is_cancelled() {
            break Err(ClientError::Cancelled);
        }
        if policy.max_attempts.is_some_and(|max| attempts >= max) {
            break Err(ClientError::DownloadExhausted { attempts });
        }
        attempts += 1;

        let reply = match transport.get(ticket) {
            Ok(reply) => reply,
            Err(e) => break Err(e),
        };
        if reply.call_failed() {
            break Ok(PollResult::Failed(reply.text()));
        }
        if reply.status == 200 {
            break Ok(PollResult::Ready(reply.body));
        }

        tracing::debug!(status = reply.status, attempts, "download not ready");
        console.waiting(&format!(
            "Download not ready yet, waiting for server... Retrying in {} seconds...",
            policy.interval.as_secs()
        ));
        thread::sleep(policy.interval);
    };
    console.done_waiting();
    result
}
