mod app;
mod config;
mod launcher;
mod manifest;
mod model;
mod selector;

use std::env;
use std::path::Path;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use launcher::{LaunchContext, Shell};
use model::{Entry, ScriptCatalog};
use selector::{SelectorAction, SelectorOptions, Theme};

const LOG_ENV: &str = "SCRIPTPICK_LOG";

#[derive(Debug, Parser)]
#[command(
    name = "scriptpick",
    version,
    about = "Pick a package.json script from a searchable list and run it"
)]
struct Cli {}

fn main() {
    init_logging();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        process::exit(1);
    }
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .compact()
        .init();
}

fn run() -> Result<()> {
    let _cli = Cli::parse();
    let cwd = env::current_dir().context("failed to resolve current directory")?;
    debug!(dir = %cwd.display(), "working directory");

    let loaded = config::load(&cwd)?;
    match &loaded.path {
        Some(path) => debug!(path = %path.display(), "using config"),
        None => debug!("no config file, using defaults"),
    }

    let manifest = manifest::load(&cwd)?;
    let catalog = ScriptCatalog::from_scripts(&manifest.scripts, &loaded.config.list.hide)?;
    debug!(
        manifest = %manifest::manifest_path(&cwd).display(),
        count = catalog.len(),
        "loaded scripts"
    );

    let action = app::run_tui(
        catalog.into_vec(),
        SelectorOptions::from(&loaded.config),
        Theme::new(loaded.config.layout),
    )?;

    let SelectorAction::Selected(entry) = action else {
        return Ok(());
    };
    launch(&entry, &cwd, Shell::new(loaded.config.launch.shell.as_str()));
    Ok(())
}

/// Starts the script and returns without waiting for it. A failed start is
/// reported but does not change the exit status.
fn launch(entry: &Entry, cwd: &Path, shell: Shell) {
    println!("scriptpick: {}", entry.name);
    println!("$ {}", entry.command);

    let context = LaunchContext::new(entry.command.as_str(), cwd, shell);
    match launcher::start(context) {
        Ok(handle) => {
            // Never joined; the child outlives this process in its own group.
            let _watcher = launcher::spawn_completion_watcher(handle);
        }
        Err(err) => error!(script = %entry.name, "{err}"),
    }
}
