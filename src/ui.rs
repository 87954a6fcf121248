// UI layer: everything that talks to the person at the terminal goes
// through `Console`, so the call protocol can be driven by a script in
// tests. `TerminalConsole` is the real one, built on `dialoguer` prompts
// and an `indicatif` spinner while we wait on the server.

use anyhow::Context as _;
use dialoguer::{Confirm, Input, Password};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// Terminal interaction needed by the call protocol.
pub trait Console {
    /// Print a line of output for the user.
    fn say(&mut self, line: &str);

    /// Ask where to save a download. An empty answer means `default`.
    fn ask_save_path(&mut self, default: &str) -> std::io::Result<String>;

    /// Ask whether an existing file may be overwritten.
    fn confirm_overwrite(&mut self, path: &Path) -> std::io::Result<bool>;

    /// Ask for a password with echo suppressed.
    fn ask_password(&mut self, identity: &str) -> std::io::Result<String>;

    /// Show that we are waiting on the server.
    fn waiting(&mut self, message: &str) {
        self.say(message);
    }

    /// Waiting is over.
    fn done_waiting(&mut self) {}
}

/// Console backed by stdin/stdout.
#[derive(Default)]
pub struct TerminalConsole {
    spinner: Option<ProgressBar>,
}

impl TerminalConsole {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Console for TerminalConsole {
    fn say(&mut self, line: &str) {
        match &self.spinner {
            Some(spinner) => spinner.println(line),
            None => println!("{}", line),
        }
    }

    fn ask_save_path(&mut self, default: &str) -> std::io::Result<String> {
        Input::<String>::new()
            .with_prompt(format!(
                "Where would you like to save it (default: {})?",
                default
            ))
            .allow_empty(true)
            .interact_text()
    }

    fn confirm_overwrite(&mut self, path: &Path) -> std::io::Result<bool> {
        Confirm::new()
            .with_prompt(format!(
                "File {} already exists, would you like to overwrite it?",
                path.display()
            ))
            .default(false)
            .interact()
    }

    fn ask_password(&mut self, identity: &str) -> std::io::Result<String> {
        // `Password` hides input in the terminal.
        Password::new()
            .with_prompt(format!("Please enter password for user {}", identity))
            .allow_empty_password(true)
            .interact()
    }

    fn waiting(&mut self, message: &str) {
        let spinner = self.spinner.get_or_insert_with(|| {
            let spinner = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
                spinner.set_style(style);
            }
            spinner.enable_steady_tick(Duration::from_millis(120));
            spinner
        });
        spinner.set_message(message.to_string());
    }

    fn done_waiting(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

/// Print the config search list, top first.
pub fn print_config_paths(paths: &[std::path::PathBuf]) -> anyhow::Result<()> {
    use std::io::Write;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "Places to search for configuration (top first):")
        .context("writing to stdout")?;
    for path in paths {
        writeln!(out, "\t{}", path.display()).context("writing to stdout")?;
    }
    Ok(())
}
