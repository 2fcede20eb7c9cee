//! Tick barrier and module workers.
//!
//! One worker thread per module, synchronized to the supervisor through
//! a monotonic tick gate. The supervisor publishes a new tick number and
//! wakes everyone; each worker runs exactly one module tick, reports
//! back over a channel, and parks again. The guarded predicate
//! (`released epoch > last processed epoch`) makes spurious wakeups
//! harmless: a stale wakeup finds nothing new and goes back to sleep.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use crate::job::{JobRef, Stage};
use crate::power::SharedPower;
use crate::process::{ProcessModule, StageEvent};
use crate::sim::orbit::OrbitOracle;
use crate::telemetry::TelemetryWriter;

/// Number of module workers the supervisor drives.
pub const WORKER_COUNT: usize = 3;

/// What a parked worker saw when it woke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateSignal {
    /// A new epoch was released. Epoch `e` corresponds to tick `e - 1`.
    Tick(u64),
    /// The shutdown flag is set; exit the worker loop.
    Shutdown,
}

/// Monotonic tick gate.
///
/// Epoch 0 means "nothing released yet"; releasing tick `t` publishes
/// epoch `t + 1`. Workers remember the last epoch they processed and
/// only act on strictly newer ones.
#[derive(Debug, Default)]
pub struct TickGate {
    released: AtomicU64,
    shutdown: AtomicBool,
    lock: Mutex<()>,
    wakeup: Condvar,
}

impl TickGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes tick `tick` and wakes all workers. Supervisor only; the
    /// power bus must already be refreshed for this tick.
    pub fn release(&self, tick: u64) {
        self.released.store(tick + 1, Ordering::Release);
        let _guard = self.lock.lock();
        self.wakeup.notify_all();
    }

    /// Parks until an epoch newer than `last_epoch` is released or
    /// shutdown is signalled.
    pub fn await_tick(&self, last_epoch: u64) -> GateSignal {
        let mut guard = self.lock.lock();
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return GateSignal::Shutdown;
            }
            let released = self.released.load(Ordering::Acquire);
            if released > last_epoch {
                return GateSignal::Tick(released);
            }
            self.wakeup.wait(&mut guard);
        }
    }

    /// Poisons the gate: every parked or arriving worker sees shutdown.
    pub fn shut_down(&self) {
        self.shutdown.store(true, Ordering::Release);
        let _guard = self.lock.lock();
        self.wakeup.notify_all();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

/// Supervisor-to-worker instruction, applied between ticks.
#[derive(Debug)]
pub enum ModuleCommand {
    /// Append a job to the module's FIFO.
    Enqueue(JobRef),
    /// Drop a job from the queue or active slot.
    Discard(String),
}

/// One worker's completion report for one tick.
#[derive(Debug)]
pub struct WorkerReport {
    pub stage: Stage,
    pub minute: u64,
    /// Finished job handed off at this tick boundary, if any.
    pub event: Option<StageEvent>,
}

/// Spawns the worker thread owning `module`.
///
/// The worker applies pending supervisor commands, runs exactly one
/// module tick per released epoch, and reports completion. It exits when
/// the gate shuts down or the supervisor side of the report channel is
/// gone. A worker that already passed the gate finishes its tick (and
/// telemetry row) before observing shutdown; one parked at the gate
/// exits without another row.
///
/// # Errors
///
/// Returns an `io::Error` if the OS refuses to spawn the thread.
pub fn spawn_worker<M>(
    mut module: M,
    gate: Arc<TickGate>,
    oracle: OrbitOracle,
    power: SharedPower,
    telemetry: Arc<TelemetryWriter>,
    commands: Receiver<ModuleCommand>,
    reports: Sender<WorkerReport>,
) -> std::io::Result<JoinHandle<()>>
where
    M: ProcessModule + Send + 'static,
{
    let stage = module.stage();
    thread::Builder::new()
        .name(stage.label().to_string())
        .spawn(move || {
            let mut last_epoch = 0u64;
            loop {
                match gate.await_tick(last_epoch) {
                    GateSignal::Shutdown => break,
                    GateSignal::Tick(epoch) => {
                        last_epoch = epoch;
                        let minute = epoch - 1;

                        while let Ok(command) = commands.try_recv() {
                            match command {
                                ModuleCommand::Enqueue(job) => module.enqueue(job),
                                ModuleCommand::Discard(id) => module.discard(&id),
                            }
                        }

                        let orbit = oracle.phase(minute);
                        module.tick(minute, orbit, &power, &telemetry);
                        let event = module.take_finished();
                        let report = WorkerReport {
                            stage,
                            minute,
                            event,
                        };
                        if reports.send(report).is_err() {
                            break;
                        }
                    }
                }
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OrbitConfig, StageConfig};
    use crate::job::{Job, PhaseState};
    use crate::process::Deposition;
    use crate::process::test_support::{ample_power, null_telemetry};
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn gate_epochs_are_monotonic_and_guarded() {
        let gate = TickGate::new();

        gate.release(0);
        assert_eq!(gate.await_tick(0), GateSignal::Tick(1));
        // A worker that already processed epoch 1 would park; a stale
        // caller sees the epoch again without double-release.
        assert_eq!(gate.await_tick(0), GateSignal::Tick(1));

        gate.release(1);
        assert_eq!(gate.await_tick(1), GateSignal::Tick(2));
    }

    #[test]
    fn shutdown_unparks_waiters() {
        let gate = Arc::new(TickGate::new());
        let waiter = {
            let gate = gate.clone();
            thread::spawn(move || gate.await_tick(0))
        };
        // Give the waiter time to park before poisoning the gate.
        thread::sleep(Duration::from_millis(20));
        gate.shut_down();
        assert_eq!(waiter.join().expect("join"), GateSignal::Shutdown);
        assert!(gate.is_shut_down());
    }

    #[test]
    fn released_tick_wakes_parked_worker() {
        let gate = Arc::new(TickGate::new());
        let waiter = {
            let gate = gate.clone();
            thread::spawn(move || gate.await_tick(0))
        };
        thread::sleep(Duration::from_millis(20));
        gate.release(0);
        assert_eq!(waiter.join().expect("join"), GateSignal::Tick(1));
    }

    #[test]
    fn worker_runs_one_tick_per_release_and_reports() {
        let gate = Arc::new(TickGate::new());
        let oracle = OrbitOracle::new(&OrbitConfig::default());
        let power = ample_power();
        let telemetry = Arc::new(null_telemetry());
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (report_tx, report_rx) = mpsc::channel();

        let job = Job::new(
            "T_1",
            [
                PhaseState::new(2, 0.0),
                PhaseState::new(20, 0.0),
                PhaseState::new(120, 0.0),
            ],
        );
        let module = Deposition::new(
            &StageConfig {
                power_w: 300,
                required_ticks: 2,
                defect_chance: 0.0,
            },
            1,
        );
        let handle = spawn_worker(
            module,
            gate.clone(),
            oracle,
            power.clone(),
            telemetry.clone(),
            cmd_rx,
            report_tx,
        )
        .expect("spawn");

        cmd_tx
            .send(ModuleCommand::Enqueue(job.clone()))
            .expect("send");

        power.refresh(0, oracle.phase(0));
        gate.release(0);
        let first = report_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("first report");
        assert_eq!(first.minute, 0);
        assert!(first.event.is_none());

        power.refresh(1, oracle.phase(1));
        gate.release(1);
        let second = report_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("second report");
        assert_eq!(second.minute, 1);
        assert!(matches!(second.event, Some(StageEvent::Completed(_))));

        gate.shut_down();
        handle.join().expect("worker exits cleanly");
        assert_eq!(telemetry.rows_written(), 2);
        assert_eq!(job.phase_snapshot(Stage::Deposition).elapsed_time, 2);
    }
}
