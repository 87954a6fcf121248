// Authentication manager. Calls run unauthenticated (or with a resumed
// session) first; a permission failure leads to exactly one login and
// one retry. Every other outcome of the first attempt is final.

use crate::api::{PostBody, Transport, LOGIN_PATH};
use crate::config::Config;
use crate::context::ClientContext;
use crate::dispatch::{bootstrap_call, invoke, CallOutcome, Mode};
use crate::encoder::CallArgs;
use crate::error::{ClientError, Result};
use crate::oauth::{OAuthKeys, OAUTH_KEYS_CALL};

#[derive(Debug, Clone, PartialEq)]
pub enum LoginMethod {
    /// Email and password. `None` means ask at the terminal.
    Password(Option<String>),
    /// Third party identity provider.
    Delegated,
}

/// Who we act as and how to log in when the server asks.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginPlan {
    pub identity: String,
    pub method: LoginMethod,
}

impl LoginPlan {
    pub fn new(identity: impl Into<String>, method: LoginMethod) -> Self {
        LoginPlan {
            identity: identity.into(),
            method,
        }
    }

    pub fn from_config(
        config: &Config,
        identity: String,
        env_password: Option<String>,
        delegated: bool,
    ) -> Self {
        let method = if delegated {
            LoginMethod::Delegated
        } else {
            LoginMethod::Password(config.resolve_password(env_password))
        };
        LoginPlan::new(identity, method)
    }
}

enum Step {
    TryCall,
    Login,
    RetryCall,
}

/// Run a call, logging in and retrying once if the server wants
/// authorization first.
pub fn run(
    ctx: &mut ClientContext,
    plan: &LoginPlan,
    mode: Mode,
    name: &str,
    args: CallArgs,
) -> Result<String> {
    let mut step = Step::TryCall;
    loop {
        step = match step {
            Step::TryCall => match invoke(ctx, mode, name, args.clone())? {
                CallOutcome::NeedsAuth(text) => {
                    tracing::info!(identity = %plan.identity, reason = %text, "call needs authorization, logging in");
                    Step::Login
                }
                outcome => return outcome.into_result(),
            },
            Step::Login => {
                login(ctx, plan)?;
                let cookies = ctx.transport.cookie_blob().unwrap_or_default();
                ctx.sessions.save(&cookies, &plan.identity)?;
                Step::RetryCall
            }
            Step::RetryCall => return invoke(ctx, mode, name, args)?.into_result(),
        };
    }
}

/// Log in according to `plan`, leaving the session cookies in the
/// transport's jar.
pub fn login(ctx: &mut ClientContext, plan: &LoginPlan) -> Result<()> {
    match &plan.method {
        LoginMethod::Password(stored) => {
            let password = match stored {
                Some(p) => p.clone(),
                None => ctx.console.ask_password(&plan.identity)?,
            };
            if password.is_empty() {
                return Err(ClientError::NoPassword(plan.identity.clone()));
            }
            post_login(
                ctx.transport.as_ref(),
                vec![
                    ("email".into(), plan.identity.clone()),
                    ("password".into(), password),
                ],
            )?;
        }
        LoginMethod::Delegated => delegated_login(ctx, &plan.identity)?,
    }
    tracing::info!(identity = %plan.identity, "logged in");
    Ok(())
}

fn delegated_login(ctx: &mut ClientContext, identity: &str) -> Result<()> {
    let body = bootstrap_call(ctx, OAUTH_KEYS_CALL)?;
    let keys: OAuthKeys = serde_json::from_str(&body).map_err(|source| ClientError::MalformedReply {
        call: OAUTH_KEYS_CALL.to_string(),
        source,
    })?;

    let who = ctx.identity_provider.authorize(&keys, ctx.console.as_mut())?;
    if who.email != identity {
        return Err(ClientError::IdentityMismatch {
            requested: identity.to_string(),
            actual: who.email,
        });
    }
    if !who.verified {
        return Err(ClientError::UnverifiedIdentity(who.email));
    }

    post_login(
        ctx.transport.as_ref(),
        vec![("access_token".into(), who.access_token)],
    )?;
    Ok(())
}

fn post_login(transport: &dyn Transport, fields: Vec<(String, String)>) -> Result<String> {
    let reply = transport.post(LOGIN_PATH, PostBody::Form(fields))?;
    if reply.call_succeeded() {
        Ok(reply.text())
    } else {
        Err(ClientError::LoginRejected(reply.text()))
    }
}
