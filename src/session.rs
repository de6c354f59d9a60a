use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{select, unbounded, Receiver};
use humantime::format_duration;
use tracing::{debug, info};

use crate::cli::Command;
use crate::clock::Clock;
use crate::interface::{self, Flow};
use crate::model::TaskTimerStore;
use crate::ticker::Ticker;

/// Forward input lines to a channel from a thread of their own, so that
/// reading never holds up the ticks. The channel closes at end of input.
fn spawn_reader<R>(input: R) -> Result<Receiver<io::Result<String>>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = unbounded();
    thread::Builder::new()
        .name("dayfocus-input".into())
        .spawn(move || {
            for line in input.lines() {
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .context("Failed to spawn the input thread.")?;
    Ok(rx)
}

/// Parse and run one line. Mistakes are reported to the user and never end
/// the session.
pub fn handle_line<C: Clock, W: Write>(
    store: &mut TaskTimerStore<C>,
    line: &str,
    out: &mut W,
) -> Result<Flow> {
    let command = match Command::parse_line(line) {
        Ok(Some(command)) => command,
        Ok(None) => return Ok(Flow::Continue),
        Err(err) => {
            writeln!(out, "{}", err.message)?;
            return Ok(Flow::Continue);
        }
    };
    debug!(?command, "command");
    match interface::execute(store, command, out) {
        Ok(flow) => Ok(flow),
        Err(err) => {
            writeln!(out, "{}", err)?;
            Ok(Flow::Continue)
        }
    }
}

/// Drive the store until `quit` or end of input. Input lines and ticks are
/// handled one at a time, each to completion, on this thread only.
pub fn run<C, R, W>(
    mut store: TaskTimerStore<C>,
    period: Duration,
    input: R,
    mut out: W,
) -> Result<()>
where
    C: Clock,
    R: BufRead + Send + 'static,
    W: Write,
{
    let (ticker, ticks) = Ticker::spawn(period)?;
    let lines = spawn_reader(input)?;

    info!(
        tasks = store.tasks().len(),
        tick = %format_duration(ticker.period()),
        "session started"
    );
    writeln!(
        out,
        "{} task slot(s) for today. Type 'help' for commands.",
        store.tasks().len()
    )?;
    out.flush()?;

    loop {
        select! {
            recv(lines) -> line => match line {
                Ok(line) => {
                    let line = line.context("Failed to read input.")?;
                    let flow = handle_line(&mut store, &line, &mut out)?;
                    out.flush()?;
                    if flow == Flow::Quit {
                        break;
                    }
                }
                Err(_) => {
                    debug!("end of input");
                    break;
                }
            },
            recv(ticks) -> _ => store.tick(),
        }
    }

    ticker.cancel();
    info!(
        completed = store.completed_count(),
        total = store.total_tasks(),
        focus_secs = store.total_focus_time(),
        "session ended"
    );
    Ok(())
}
