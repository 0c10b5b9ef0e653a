//! Register polling and change notification.

use std::time::Duration;

use modbus_push_framework::ShutdownSignal;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::client::{Connector, RegisterClient};
use crate::notifier::{Notifier, deliver, value_changed_message};
use crate::session::{ConnectionManager, Session};

/// Poll behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// Send a notification on every tick while a register reads nonzero,
    /// on top of the change notification. Enabled by default, which means
    /// a register that changes to a nonzero value is announced twice.
    pub repeat_nonzero: bool,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            repeat_nonzero: true,
        }
    }
}

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub registers_read: usize,
    pub read_failures: usize,
    pub changes: usize,
    pub notifications_sent: usize,
    pub notifications_failed: usize,
}

impl TickReport {
    fn record_delivery(&mut self, delivered: bool) {
        if delivered {
            self.notifications_sent += 1;
        } else {
            self.notifications_failed += 1;
        }
    }
}

/// Poll every register of `session` once.
///
/// Read failures skip the register for this cycle. Notification failures
/// are logged and counted; neither touches the register table.
pub async fn poll_once<C, N>(
    session: &mut Session<C>,
    notifier: &N,
    options: &PollOptions,
) -> TickReport
where
    C: RegisterClient,
    N: Notifier + ?Sized,
{
    let Session {
        client,
        registers,
        webhook,
    } = session;
    let mut report = TickReport::default();

    for (&address, stored) in registers.iter_mut() {
        let value = match client.read_holding_register(address).await {
            Ok(value) => value,
            Err(e) => {
                warn!(address, error = %e, "Failed to read register");
                report.read_failures += 1;
                continue;
            }
        };
        report.registers_read += 1;

        if options.repeat_nonzero && value != 0 {
            let message = value_changed_message(address, value);
            report.record_delivery(deliver(notifier, webhook, &message).await);
        }

        if value != *stored {
            info!(address, previous = *stored, value, "Register value changed");
            report.changes += 1;

            let message = value_changed_message(address, value);
            report.record_delivery(deliver(notifier, webhook, &message).await);

            *stored = value;
        }
    }

    report
}

/// Tick `manager` every `period` until `shutdown` fires, then disconnect.
///
/// The first tick happens one `period` after the call. A tick always runs
/// to completion before the next one starts; ticks missed while a slow
/// cycle was in flight are not made up.
///
/// Panics if `period` is zero.
pub async fn run_poll_loop<K, N>(
    mut manager: ConnectionManager<K, N>,
    period: Duration,
    mut shutdown: ShutdownSignal,
) -> ConnectionManager<K, N>
where
    K: Connector,
    N: Notifier,
{
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval_ms = period.as_millis() as u64, "Starting poll loop");

    while !*shutdown.borrow() {
        tokio::select! {
            _ = interval.tick() => {
                let report = manager.tick().await;
                debug!(?report, "Poll cycle complete");
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    info!("Poll loop stopping");
    manager.disconnect().await;

    manager
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_repeat_nonzero() {
        assert!(PollOptions::default().repeat_nonzero);
    }

    #[test]
    fn test_report_counts_deliveries() {
        let mut report = TickReport::default();
        report.record_delivery(true);
        report.record_delivery(false);
        report.record_delivery(true);

        assert_eq!(report.notifications_sent, 2);
        assert_eq!(report.notifications_failed, 1);
    }
}
