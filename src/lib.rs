// Library root
// -----------
// Client for the Galah remote call API. The binary (`main.rs`) parses the
// command line, builds a `ClientContext` and hands the requested call to
// `auth::run`.
//
// Module responsibilities:
// - `encoder`: maps call arguments onto the API description, picking out
//   file uploads.
// - `api`: the HTTP transport with its cookie jar.
// - `dispatch`: one call, its response headers and the download polling.
// - `auth`: login and the single retry after a permission failure.
// - `session`, `descriptor`, `config`: what is kept on disk between runs.
// - `ui`: terminal prompts and output.
pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod dispatch;
pub mod encoder;
pub mod error;
pub mod oauth;
pub mod session;
pub mod testing;
pub mod ui;

pub use context::ClientContext;
pub use error::{ClientError, Result};
