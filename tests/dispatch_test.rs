//! Integration tests for the call dispatcher and the download polling,
//! driven through scripted transport and console doubles.

use std::fs;
use std::path::Path;
use std::time::Duration;

use rstest::rstest;
use serde_json::json;
use tempfile::TempDir;

use galah_apiclient::api::{Reply, CALL_PATH, DOWNLOAD_HEADER, DOWNLOAD_NAME_HEADER};
use galah_apiclient::config::Config;
use galah_apiclient::descriptor::ApiDescriptor;
use galah_apiclient::dispatch::{
    interpret, invoke, poll_download, CallOutcome, CancelToken, DownloadPolicy, Mode, PollResult,
};
use galah_apiclient::encoder::CallArgs;
use galah_apiclient::testing::{
    call_failed, call_ok, not_ready, permission_denied, FixedIdentity, Recorded, ScriptedConsole,
    ScriptedTransport,
};
use galah_apiclient::ui::Console;
use galah_apiclient::{ClientContext, ClientError};

const DESCRIPTOR: &str = r#"[
    {"name": "get_submissions", "args": [{"name": "assignment"}, {"name": "email"}]},
    {"name": "upload_harness", "args": [{"name": "assignment"}, {"name": "harness", "takes_file": true}]}
]"#;

fn context(home: &TempDir) -> (ClientContext, ScriptedTransport, ScriptedConsole) {
    let transport = ScriptedTransport::new();
    let console = ScriptedConsole::new();
    let config = Config {
        home: home.path().to_path_buf(),
        ..Config::default()
    };
    let mut ctx = ClientContext::with_parts(
        config,
        Box::new(transport.clone()),
        Box::new(console.clone()),
        Box::new(FixedIdentity::new("nobody@example.edu", true)),
    );
    ctx.descriptor = Some(ApiDescriptor::from_json(DESCRIPTOR).unwrap());
    ctx.download = DownloadPolicy {
        interval: Duration::ZERO,
        max_attempts: None,
    };
    (ctx, transport, console)
}

fn with_download(reply: Reply, ticket: &str) -> Reply {
    reply.with_header(DOWNLOAD_HEADER, ticket)
}

// ============================================================
// interpreting replies
// ============================================================

#[rstest]
#[case(call_ok("fine"), CallOutcome::Success("fine".into()))]
#[case(permission_denied(), CallOutcome::NeedsAuth("You must be logged in to do that.".into()))]
#[case(call_failed("no such assignment", None), CallOutcome::Failure("no such assignment".into()))]
#[case(call_failed("bad", Some("UserError")), CallOutcome::Failure("bad".into()))]
fn replies_map_to_outcomes(#[case] reply: Reply, #[case] expected: CallOutcome) {
    assert_eq!(interpret(&reply), expected);
}

#[test]
fn permission_type_without_failure_flag_is_success() {
    let reply = call_ok("ok").with_header("X-ErrorType", "PermissionError");
    assert_eq!(interpret(&reply), CallOutcome::Success("ok".into()));
}

// ============================================================
// invoke
// ============================================================

#[test]
fn backend_call_returns_body_without_printing() {
    let home = TempDir::new().unwrap();
    let (mut ctx, transport, console) = context(&home);
    transport.push(with_download(call_ok("[1, 2, 3]"), "downloads/1"));

    let outcome = invoke(
        &mut ctx,
        Mode::Backend,
        "get_submissions",
        CallArgs::positional(["ASSIGN123"]),
    )
    .unwrap();

    assert_eq!(outcome, CallOutcome::Success("[1, 2, 3]".into()));
    assert!(console.lines().is_empty());
    // The download header is ignored for backend calls.
    assert_eq!(transport.request_count(), 1);
}

#[test]
fn interactive_call_prints_body_and_stops() {
    let home = TempDir::new().unwrap();
    let (mut ctx, transport, console) = context(&home);
    transport.push(call_ok("3 submissions"));

    let outcome = invoke(
        &mut ctx,
        Mode::Interactive,
        "get_submissions",
        CallArgs::positional(["ASSIGN123"]),
    )
    .unwrap();

    assert_eq!(outcome, CallOutcome::Success("3 submissions".into()));
    assert_eq!(console.lines(), vec!["3 submissions"]);
    assert_eq!(
        transport.requests(),
        vec![Recorded::Json {
            path: CALL_PATH.into(),
            body: json!({"assignment": "ASSIGN123", "api_name": "get_submissions"}),
        }]
    );
}

#[test]
fn failed_call_prints_nothing() {
    let home = TempDir::new().unwrap();
    let (mut ctx, transport, console) = context(&home);
    transport.push(call_failed("no such assignment", None));

    let outcome = invoke(
        &mut ctx,
        Mode::Interactive,
        "get_submissions",
        CallArgs::positional(["NOPE"]),
    )
    .unwrap();

    assert_eq!(outcome, CallOutcome::Failure("no such assignment".into()));
    assert!(console.lines().is_empty());
}

#[test]
fn unexpected_content_type_is_not_fatal() {
    let home = TempDir::new().unwrap();
    let (mut ctx, transport, _console) = context(&home);
    transport.push(call_ok("{}").with_header("Content-Type", "application/json"));

    let outcome = invoke(&mut ctx, Mode::Backend, "get_submissions", CallArgs::default()).unwrap();

    assert_eq!(outcome, CallOutcome::Success("{}".into()));
}

#[test]
fn http_error_status_is_a_transport_failure() {
    let home = TempDir::new().unwrap();
    let (mut ctx, transport, _console) = context(&home);
    transport.push(Reply::new(502, "Bad Gateway"));

    let err = invoke(&mut ctx, Mode::Interactive, "get_submissions", CallArgs::default())
        .unwrap_err();

    assert!(err.is_transport());
}

#[test]
fn attachments_go_out_as_multipart() {
    let home = TempDir::new().unwrap();
    let (mut ctx, transport, _console) = context(&home);
    let harness = home.path().join("harness.tar.gz");
    fs::write(&harness, b"tarball").unwrap();
    transport.push(call_ok("uploaded"));

    invoke(
        &mut ctx,
        Mode::Backend,
        "upload_harness",
        CallArgs::positional(["hw1", harness.to_str().unwrap()]),
    )
    .unwrap();

    assert_eq!(
        transport.requests(),
        vec![Recorded::Multipart {
            path: CALL_PATH.into(),
            request: json!({"assignment": "hw1", "api_name": "upload_harness"}),
            attachments: vec![("harness".into(), harness)],
        }]
    );
}

#[test]
fn missing_attachment_aborts_before_any_request() {
    let home = TempDir::new().unwrap();
    let (mut ctx, transport, _console) = context(&home);
    transport.push(call_ok("should never be read"));

    let err = invoke(
        &mut ctx,
        Mode::Interactive,
        "upload_harness",
        CallArgs::positional(["hw1", "/no/such/harness.tar.gz"]),
    )
    .unwrap_err();

    assert!(matches!(err, ClientError::Attachment { .. }));
    assert_eq!(transport.request_count(), 0);
}

#[test]
fn too_many_arguments_aborts_before_any_request() {
    let home = TempDir::new().unwrap();
    let (mut ctx, transport, _console) = context(&home);

    let err = invoke(
        &mut ctx,
        Mode::Interactive,
        "get_submissions",
        CallArgs::positional(["a", "b", "c"]),
    )
    .unwrap_err();

    assert!(matches!(err, ClientError::TooManyArguments { expected: 2 }));
    assert_eq!(transport.request_count(), 0);
}

// ============================================================
// download sub-protocol
// ============================================================

#[test]
fn download_waits_then_saves_final_body_once() {
    let home = TempDir::new().unwrap();
    let (mut ctx, transport, console) = context(&home);
    let target = home.path().join("archive.tar.gz");
    console.answer_save_path(target.to_str().unwrap());
    transport
        .push(with_download(call_ok("Archive queued"), "/downloads/42"))
        .push(not_ready())
        .push(Reply::new(404, "not yet"))
        .push(not_ready())
        .push(Reply::new(200, "ARCHIVE-BYTES"));

    invoke(&mut ctx, Mode::Interactive, "get_submissions", CallArgs::positional(["hw1"])).unwrap();

    assert_eq!(fs::read(&target).unwrap(), b"ARCHIVE-BYTES");
    let gets = transport
        .requests()
        .into_iter()
        .filter(|r| matches!(r, Recorded::Get { path } if path == "/downloads/42"))
        .count();
    assert_eq!(gets, 4);
    assert_eq!(transport.remaining_replies(), 0);
    let lines = console.lines();
    assert_eq!(lines.first().map(String::as_str), Some("Archive queued"));
    assert_eq!(
        lines.last().cloned(),
        Some(format!("File saved to {}.", target.display()))
    );
}

#[test]
fn server_side_download_failure_writes_nothing() {
    let home = TempDir::new().unwrap();
    let (mut ctx, transport, console) = context(&home);
    let target = home.path().join("archive.tar.gz");
    console.answer_save_path(target.to_str().unwrap());
    transport
        .push(with_download(call_ok("Archive queued"), "downloads/42"))
        .push(not_ready())
        .push(call_failed("disk full", None))
        .push(Reply::new(200, "never fetched"));

    let outcome =
        invoke(&mut ctx, Mode::Interactive, "get_submissions", CallArgs::default()).unwrap();

    assert_eq!(outcome, CallOutcome::Success("Archive queued".into()));
    assert!(!target.exists());
    assert_eq!(transport.remaining_replies(), 1);
    assert!(console
        .lines()
        .contains(&"Server could not create archive: disk full".to_string()));
}

#[test]
fn declined_overwrite_aborts_without_polling() {
    let home = TempDir::new().unwrap();
    let (mut ctx, transport, console) = context(&home);
    let target = home.path().join("existing.tar.gz");
    fs::write(&target, b"keep me").unwrap();
    console
        .answer_save_path(target.to_str().unwrap())
        .answer_overwrite(false);
    transport.push(with_download(call_ok("Archive queued"), "downloads/42"));

    let err = invoke(&mut ctx, Mode::Interactive, "get_submissions", CallArgs::default())
        .unwrap_err();

    assert!(matches!(err, ClientError::Aborted));
    assert_eq!(transport.request_count(), 1);
    assert_eq!(fs::read(&target).unwrap(), b"keep me");
}

#[test]
fn accepted_overwrite_replaces_file() {
    let home = TempDir::new().unwrap();
    let (mut ctx, transport, console) = context(&home);
    let target = home.path().join("existing.tar.gz");
    fs::write(&target, b"old").unwrap();
    console
        .answer_save_path(target.to_str().unwrap())
        .answer_overwrite(true);
    transport
        .push(with_download(call_ok("Archive queued"), "downloads/42"))
        .push(Reply::new(200, "new"));

    invoke(&mut ctx, Mode::Interactive, "get_submissions", CallArgs::default()).unwrap();

    assert_eq!(fs::read(&target).unwrap(), b"new");
}

#[test]
fn empty_answer_uses_server_suggested_name() {
    let home = TempDir::new().unwrap();
    let (mut ctx, transport, console) = context(&home);
    let name = format!("galah-test-{}.zip", std::process::id());
    transport
        .push(
            with_download(call_ok("Archive queued"), "downloads/42")
                .with_header(DOWNLOAD_NAME_HEADER, &name),
        )
        .push(Reply::new(200, "zip"));

    invoke(&mut ctx, Mode::Interactive, "get_submissions", CallArgs::default()).unwrap();

    let saved = std::path::PathBuf::from(format!("./{}", name));
    assert_eq!(fs::read(&saved).unwrap(), b"zip");
    fs::remove_file(&saved).unwrap();
    assert!(console
        .lines()
        .contains(&format!("File saved to ./{}.", name)));
}

#[test]
fn bounded_policy_gives_up() {
    let transport = ScriptedTransport::new();
    let mut console = ScriptedConsole::new();
    transport.push(not_ready()).push(not_ready()).push(not_ready());
    let policy = DownloadPolicy {
        interval: Duration::ZERO,
        max_attempts: Some(2),
    };

    let err = poll_download(&transport, &mut console, "downloads/1", &policy, &CancelToken::default())
        .unwrap_err();

    assert!(matches!(err, ClientError::DownloadExhausted { attempts: 2 }));
    assert_eq!(transport.request_count(), 2);
}

#[test]
fn cancelled_poll_makes_no_request() {
    let transport = ScriptedTransport::new();
    let mut console = ScriptedConsole::new();
    let cancel = CancelToken::default();
    cancel.cancel();

    let err = poll_download(&transport, &mut console, "downloads/1", &DownloadPolicy::default(), &cancel)
        .unwrap_err();

    assert!(matches!(err, ClientError::Cancelled));
    assert_eq!(transport.request_count(), 0);
}

/// Console that cancels the poll the first time it is told to wait, the
/// way another thread holding the token would.
struct CancelOnWait {
    inner: ScriptedConsole,
    cancel: CancelToken,
}

impl Console for CancelOnWait {
    fn say(&mut self, line: &str) {
        self.inner.say(line);
    }

    fn ask_save_path(&mut self, default: &str) -> std::io::Result<String> {
        self.inner.ask_save_path(default)
    }

    fn confirm_overwrite(&mut self, path: &Path) -> std::io::Result<bool> {
        self.inner.confirm_overwrite(path)
    }

    fn ask_password(&mut self, identity: &str) -> std::io::Result<String> {
        self.inner.ask_password(identity)
    }

    fn waiting(&mut self, message: &str) {
        self.inner.say(message);
        self.cancel.cancel();
    }
}

#[test]
fn cancel_while_waiting_stops_the_next_poll() {
    let transport = ScriptedTransport::new();
    transport.push(not_ready()).push(not_ready());
    let cancel = CancelToken::default();
    let mut console = CancelOnWait {
        inner: ScriptedConsole::new(),
        cancel: cancel.clone(),
    };
    let policy = DownloadPolicy {
        interval: Duration::ZERO,
        max_attempts: None,
    };

    let err = poll_download(&transport, &mut console, "downloads/1", &policy, &cancel).unwrap_err();

    assert!(matches!(err, ClientError::Cancelled));
    assert_eq!(transport.request_count(), 1);
    assert_eq!(transport.remaining_replies(), 1);
}

#[test]
fn poll_returns_only_the_final_body() {
    let transport = ScriptedTransport::new();
    let mut console = ScriptedConsole::new();
    transport
        .push(Reply::new(202, "partial-1"))
        .push(Reply::new(202, "partial-2"))
        .push(Reply::new(200, "complete"));
    let policy = DownloadPolicy {
        interval: Duration::ZERO,
        max_attempts: None,
    };

    let result = poll_download(&transport, &mut console, "d/1", &policy, &CancelToken::default()).unwrap();

    assert_eq!(result, PollResult::Ready(b"complete".to_vec()));
}
