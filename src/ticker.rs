use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use humantime::format_duration;
use tracing::{debug, trace};

/// A background clock that delivers an instant on a channel once per
/// period. Cancelling (or dropping) the ticker stops and joins its thread,
/// so no tick can arrive after the owner is gone.
pub struct Ticker {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    period: Duration,
}

impl Ticker {
    /// Start ticking every `period`. Returns the ticker and the receiving
    /// end of its ticks. Ticks that are not consumed in time are dropped,
    /// never queued up.
    pub fn spawn(period: Duration) -> Result<(Ticker, Receiver<Instant>)> {
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let (tick_tx, tick_rx) = bounded::<Instant>(1);

        let handle = thread::Builder::new()
            .name("dayfocus-ticker".into())
            .spawn(move || run(period, stop_rx, tick_tx))
            .context("Failed to spawn the ticker thread.")?;

        debug!(period = %format_duration(period), "ticker started");
        Ok((
            Ticker {
                stop: Some(stop_tx),
                handle: Some(handle),
                period,
            },
            tick_rx,
        ))
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Stop ticking and wait for the thread to finish.
    pub fn cancel(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the sender disconnects the stop channel, which wakes the
        // thread immediately.
        if self.stop.take().is_none() {
            return;
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                debug!("ticker thread panicked");
            }
        }
        debug!("ticker stopped");
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(period: Duration, stop: Receiver<()>, ticks: Sender<Instant>) {
    loop {
        match stop.recv_timeout(period) {
            Err(RecvTimeoutError::Timeout) => {
                match ticks.try_send(Instant::now()) {
                    Ok(()) => trace!("tick"),
                    Err(TrySendError::Full(_)) => trace!("tick dropped, previous one unread"),
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_ticks_until_cancelled() {
        let (ticker, ticks) = Ticker::spawn(Duration::from_millis(5)).unwrap();
        assert_eq!(ticker.period(), Duration::from_millis(5));

        for _ in 0..3 {
            ticks
                .recv_timeout(Duration::from_secs(2))
                .expect("tick should arrive");
        }

        ticker.cancel();
        // Drain a tick that may have been sent just before the cancel.
        while ticks.try_recv().is_ok() {}
        assert!(ticks.recv_timeout(Duration::from_millis(50)).is_err());
        assert!(ticks.is_empty());
    }

    #[test]
    fn dropping_the_ticker_disconnects_the_channel() {
        let (ticker, ticks) = Ticker::spawn(Duration::from_millis(5)).unwrap();
        drop(ticker);

        while ticks.try_recv().is_ok() {}
        assert_eq!(
            ticks.recv_timeout(Duration::from_millis(50)),
            Err(RecvTimeoutError::Disconnected)
        );
    }

    #[test]
    fn stops_on_its_own_when_nobody_listens() {
        let (ticker, ticks) = Ticker::spawn(Duration::from_millis(1)).unwrap();
        drop(ticks);
        // Joining must not hang even though the thread may already be gone.
        ticker.cancel();
    }

    #[test]
    fn slow_consumers_do_not_build_a_backlog() {
        let (ticker, ticks) = Ticker::spawn(Duration::from_millis(1)).unwrap();
        thread::sleep(Duration::from_millis(30));
        assert!(ticks.len() <= 1);
        ticker.cancel();
    }
}
