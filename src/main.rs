// Entrypoint for the CLI application.
// - Keeps `main` small: parse flags, load config, build the client context
//   and hand the call to `auth::run`.
// - Every failure ends in a message on stderr and exit status 1.

use anyhow::bail;
use clap::Parser;
use galah_apiclient::auth::{self, LoginPlan};
use galah_apiclient::config::{self, Config, PASSWORD_ENV};
use galah_apiclient::dispatch::Mode;
use galah_apiclient::encoder::CallArgs;
use galah_apiclient::{ui, ClientContext, ClientError};
use std::io::Write;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Command line interface to Galah for use by instructors and administrators.
#[derive(Parser, Debug)]
#[command(
    name = "galah",
    version,
    about,
    after_help = "Example: GALAH_PASSWORD=test galah -u john@doe.com get_submissions SOME0ASSIGNMENT0ID"
)]
struct Cli {
    /// User to authenticate as. The password is read from GALAH_PASSWORD
    /// when set
    #[arg(short, long, value_name = "USERNAME")]
    user: Option<String>,

    /// Configuration file to use instead of searching for one
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log in with a Google account matching the user
    #[arg(short, long)]
    oauth: bool,

    /// Do not use Google login even if the configuration asks for it
    #[arg(long)]
    no_oauth: bool,

    /// Show the places searched for a configuration file and exit
    #[arg(long = "config-path")]
    show_config_path: bool,

    /// Print full error details
    #[arg(short, long)]
    debug: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// API call to make
    #[arg(required_unless_present = "show_config_path")]
    call: Option<String>,

    /// Call arguments; `name=value` passes a named argument. Values
    /// starting with `-` go after `--`
    args: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(&cli) {
        report(&e, cli.debug);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    if cli.show_config_path {
        return ui::print_config_paths(&config::search_paths());
    }
    let Some(call) = cli.call.as_deref() else {
        bail!("at least one argument must be supplied");
    };

    let config = Config::load(cli.config.as_deref())?;
    let identity = config.identity(cli.user.as_deref());
    let plan = LoginPlan::from_config(
        &config,
        identity.clone(),
        std::env::var(PASSWORD_ENV).ok(),
        config.delegated_login(cli.oauth, cli.no_oauth),
    );

    let mut ctx = ClientContext::from_config(config)?;
    // Cookies from the last run, if they are ours.
    ctx.resume_session(&identity);
    ctx.ensure_descriptor()?;

    announce(&mut std::io::stdout().lock(), &identity)?;
    auth::run(
        &mut ctx,
        &plan,
        Mode::Interactive,
        call,
        CallArgs::from_cli(&cli.args),
    )?;
    Ok(())
}

/// The acting identity goes on stdout, ahead of the call output.
fn announce(out: &mut impl Write, identity: &str) -> std::io::Result<()> {
    writeln!(out, "--Acting as user {}--", identity)
}

fn report(err: &anyhow::Error, debug: bool) {
    if debug {
        eprintln!("{:?}", err);
        return;
    }
    match err.downcast_ref::<ClientError>() {
        Some(ClientError::Transport { host, source }) => {
            eprintln!("Could not connect with the given url '{}':", host);
            eprintln!("\t{}", source);
        }
        _ => eprintln!("{}", err),
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(filter)
        .init();
}
