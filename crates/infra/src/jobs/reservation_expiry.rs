//! Reservation expiry sweep.
//!
//! Candidates come from the reservation read model; each one is expired in
//! its own unit of work, so one failure never blocks the others. The
//! aggregate is the final judge: a reservation the read model still shows as
//! pending but that was settled in the meantime is rejected by the aggregate
//! and counted as skipped. Running a sweep twice therefore releases stock
//! only once.

use std::io;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use branchpos_core::AccountId;
use branchpos_events::{EventBus, EventEnvelope};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;
use crate::projections::ReadModels;
use crate::workers::WorkerHandle;
use crate::workflows::reservations::expire_reservation;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: u64,
    pub expired: u64,
    /// Already completed, cancelled or expired by the time we got there.
    pub skipped: u64,
    pub failed: u64,
}

impl SweepReport {
    fn merge(&mut self, other: SweepReport) {
        self.examined += other.examined;
        self.expired += other.expired;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

#[derive(Debug)]
pub struct ReservationExpirySweeper<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    read_models: Arc<ReadModels>,
}

impl<S, B> ReservationExpirySweeper<S, B>
where
    S: EventStore + 'static,
    B: EventBus<EventEnvelope<JsonValue>> + 'static,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>, read_models: Arc<ReadModels>) -> Self {
        Self {
            dispatcher,
            read_models,
        }
    }

    /// Sweep every known account.
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        for account_id in self.read_models.accounts() {
            report.merge(self.sweep_account(account_id, now));
        }
        if report.examined > 0 {
            tracing::info!(
                examined = report.examined,
                expired = report.expired,
                skipped = report.skipped,
                failed = report.failed,
                "reservation expiry sweep finished"
            );
        }
        report
    }

    pub fn sweep_account(&self, account_id: AccountId, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        for candidate in self.read_models.reservations.pending_expired(account_id, now) {
            report.examined += 1;
            let reservation_id = candidate.reservation_id;

            match self
                .dispatcher
                .transact(account_id, |uow| expire_reservation(uow, reservation_id, now))
            {
                Ok(_) => report.expired += 1,
                Err(DispatchError::InvariantViolation(reason)) => {
                    tracing::debug!(%account_id, %reservation_id, %reason, "reservation no longer expirable");
                    report.skipped += 1;
                }
                Err(err) => {
                    tracing::warn!(%account_id, %reservation_id, error = %err, "failed to expire reservation");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Run [`sweep`](Self::sweep) every `interval` on a background thread.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> io::Result<WorkerHandle>
    where
        S: Send + Sync,
        B: Send + Sync,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let join = thread::Builder::new()
            .name("reservation-expiry".to_string())
            .spawn(move || {
                loop {
                    match shutdown_rx.recv_timeout(interval) {
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            self.sweep(Utc::now());
                        }
                        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    }
                }
            })?;
        Ok(WorkerHandle::new(shutdown_tx, join))
    }
}
