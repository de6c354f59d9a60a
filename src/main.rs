#[macro_use]
extern crate prettytable;

use std::io::{self, BufReader};

use structopt::StructOpt;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;
mod clock;
mod config;
mod interface;
mod model;
mod session;
mod ticker;

use crate::cli::CommandLineArgs;
use crate::clock::SystemClock;
use crate::config::Settings;
use crate::interface::Renderer;
use crate::model::TaskTimerStore;

/// Logs go to stderr so they never mix with the task list. `-v` and `-vv`
/// win over RUST_LOG; without either only warnings are shown.
fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dayfocus=warn"))
        }
        1 => EnvFilter::new("dayfocus=debug"),
        _ => EnvFilter::new("dayfocus=trace"),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = CommandLineArgs::from_args();
    init_tracing(args.verbose);

    let settings = Settings::resolve(args.config.as_deref())?.with_args(&args);
    settings.validate()?;
    tracing::debug!(?settings, "settings");

    let mut store = TaskTimerStore::new(SystemClock, settings.store_options());
    store.subscribe(Renderer::new(io::stdout(), settings.live));

    session::run(
        store,
        settings.tick,
        BufReader::new(io::stdin()),
        io::stdout(),
    )
}
