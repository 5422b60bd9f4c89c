//! Process supervisor.
//!
//! The hub runs every registered [`Process`] concurrently and turns the first process exit
//! or an external cancellation into one coordinated shutdown:
//!
//! * state moves `Init -> Running -> Stopped` and never back;
//! * registrations are serialized through a coordinator task that owns the stopper list;
//! * the first process exit wins, later exits are ignored;
//! * every stopper is called once, in registration order, even if some fail;
//! * [`Hub::wait`] returns only after every started process has returned.
use std::{
    panic::AssertUnwindSafe,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicU8, Ordering},
    },
};

use eyre::{Report, Result, eyre};
use futures_util::FutureExt;
use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;

use crate::{metrics::ProcessGuard, utils::process::Process};

const STATE_INIT: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOPPED: u8 = 2;

/// Returned by [`Hub::wait`] when shutdown was requested from outside and nothing failed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("hub is stopped by signal without errors")]
pub struct HubStopped;

/// Whether a report is the clean-shutdown sentinel.
pub fn is_clean_stop(report: &Report) -> bool {
    report.downcast_ref::<HubStopped>().is_some()
}

/// Lifecycle state of a hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubState {
    Init,
    Running,
    Stopped,
}

struct ProcessExit {
    name: String,
    result: Result<()>,
}

enum Command {
    Register(Arc<dyn Process>),
    Shutdown(oneshot::Sender<Option<Report>>),
}

struct Shared {
    state: AtomicU8,
    fired: AtomicBool,
    exit_tx: Mutex<Option<oneshot::Sender<ProcessExit>>>,
}

impl Shared {
    fn state(&self) -> HubState {
        match self.state.load(Ordering::Acquire) {
            STATE_INIT => HubState::Init,
            STATE_RUNNING => HubState::Running,
            _ => HubState::Stopped,
        }
    }

    /// Latch the first process exit; later ones and those after stop are dropped.
    fn report(&self, exit: ProcessExit) {
        if self.state() == HubState::Stopped {
            tracing::debug!(process = %exit.name, "process exited after hub stop");
            return;
        }
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(process = %exit.name, "process exited after hub was triggered");
            return;
        }

        let sender = self
            .exit_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sender) = sender {
            let _ = sender.send(exit);
        }
    }

    /// Move to Stopped; true only for the caller that made the transition.
    fn transition_to_stopped(&self) -> bool {
        [STATE_INIT, STATE_RUNNING].into_iter().any(|from| {
            self.state
                .compare_exchange(from, STATE_STOPPED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        })
    }
}

pub struct Hub {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
    exit_rx: tokio::sync::Mutex<Option<oneshot::Receiver<ProcessExit>>>,
    cancel: CancellationToken,
}

impl Hub {
    /// Create a hub bound to an external cancellation token.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(cancel: CancellationToken) -> Self {
        let (exit_tx, exit_rx) = oneshot::channel();
        let shared = Arc::new(Shared {
            state: AtomicU8::new(STATE_INIT),
            fired: AtomicBool::new(false),
            exit_tx: Mutex::new(Some(exit_tx)),
        });
        let (commands, receiver) = mpsc::unbounded_channel();
        tokio::spawn(coordinate(shared.clone(), receiver));

        Self {
            shared,
            commands,
            exit_rx: tokio::sync::Mutex::new(Some(exit_rx)),
            cancel,
        }
    }

    pub fn state(&self) -> HubState {
        self.shared.state()
    }

    /// Register and start a process.
    ///
    /// Registrations are handled in call order with the stop path, so a process added before
    /// the hub begins stopping is started and then stopped. One that reaches the hub after the
    /// stop path ran is accepted but never started.
    pub fn add_proc(&self, process: Arc<dyn Process>) {
        let name = process.name().to_string();
        if self.commands.send(Command::Register(process)).is_err() {
            tracing::warn!(process = %name, "hub coordinator is gone, process not started");
        }
    }

    /// Block until the first process exits or the cancellation token fires, then stop
    /// everything and wait for all started processes to return.
    pub async fn wait(&self) -> Result<()> {
        let exit_rx = self
            .exit_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| eyre!("hub wait called more than once"))?;

        let exit = tokio::select! {
            exit = exit_rx => exit.ok(),
            () = self.cancel.cancelled() => None,
        };

        match &exit {
            Some(ProcessExit { name, result: Err(e) }) => {
                tracing::error!(process = %name, error = %format!("{e:#}"), "process failed, stopping hub");
            }
            Some(ProcessExit { name, result: Ok(()) }) => {
                tracing::info!(process = %name, "process exited, stopping hub");
            }
            None => tracing::info!("shutdown requested, stopping hub"),
        }

        let stopped = self.stop().await.unwrap_or(Ok(()));

        match exit {
            Some(ProcessExit {
                name,
                result: Err(e),
            }) => Err(e.wrap_err(format!("process {name} failed"))),
            Some(ProcessExit { result: Ok(()), .. }) => stopped,
            None => stopped.and(Err(HubStopped.into())),
        }
    }

    /// Run the stop path once. `None` when another caller already stopped the hub.
    async fn stop(&self) -> Option<Result<()>> {
        if !self.shared.transition_to_stopped() {
            return None;
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(reply_tx)).is_err() {
            return Some(Err(eyre!("hub coordinator is gone")));
        }
        Some(match reply_rx.await {
            Ok(None) => Ok(()),
            Ok(Some(e)) => Err(e),
            Err(_) => Err(eyre!("hub coordinator dropped the shutdown reply")),
        })
    }
}

/// Single owner of the stopper list and the start tasks.
async fn coordinate(shared: Arc<Shared>, mut commands: mpsc::UnboundedReceiver<Command>) {
    let mut stoppers: Vec<Arc<dyn Process>> = Vec::new();
    let mut tasks: JoinSet<()> = JoinSet::new();
    let mut stopped = false;
    let mut late = 0usize;

    while let Some(command) = commands.recv().await {
        match command {
            Command::Register(process) => {
                let _ = shared.state.compare_exchange(
                    STATE_INIT,
                    STATE_RUNNING,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
                if stopped {
                    late += 1;
                    tracing::debug!(process = process.name(), late, "hub stopped, process not started");
                    continue;
                }

                stoppers.push(process.clone());
                let shared = shared.clone();
                tasks.spawn(async move {
                    let _running = ProcessGuard::new();
                    tracing::debug!(process = process.name(), "process starting");
                    let result = match AssertUnwindSafe(process.start()).catch_unwind().await {
                        Ok(result) => result,
                        Err(_) => Err(eyre!("process panicked")),
                    };
                    shared.report(ProcessExit {
                        name: process.name().to_string(),
                        result,
                    });
                });
            }
            Command::Shutdown(reply) => {
                stopped = true;
                let mut first_error = None;
                for process in &stoppers {
                    if let Err(e) = process.stop().await {
                        tracing::warn!(process = process.name(), error = %format!("{e:#}"), "process stop failed");
                        if first_error.is_none() {
                            first_error =
                                Some(e.wrap_err(format!("failed to stop process {}", process.name())));
                        }
                    }
                }

                while let Some(joined) = tasks.join_next().await {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "process task aborted");
                    }
                }

                tracing::debug!(processes = stoppers.len(), "hub stopped");
                let _ = reply.send(first_error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::AtomicUsize,
        time::Duration,
    };

    use async_trait::async_trait;
    use futures_util::future::BoxFuture;

    use super::*;

    /// Runs until stopped; records its stop calls into a shared journal.
    struct Blocking {
        name: String,
        stopped: CancellationToken,
        journal: Arc<Mutex<Vec<String>>>,
        stop_calls: AtomicUsize,
        fail_stop: bool,
    }

    impl Blocking {
        fn new(name: &str, journal: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                stopped: CancellationToken::new(),
                journal,
                stop_calls: AtomicUsize::new(0),
                fail_stop: false,
            })
        }
    }

    #[async_trait]
    impl Process for Blocking {
        fn name(&self) -> &str {
            &self.name
        }

        async fn start(&self) -> Result<()> {
            self.stopped.cancelled().await;
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
            self.journal.lock().unwrap().push(self.name.clone());
            self.stopped.cancel();
            if self.fail_stop {
                Err(eyre!("{} refused to stop", self.name))
            } else {
                Ok(())
            }
        }
    }

    /// Fails right away.
    struct Failing;

    #[async_trait]
    impl Process for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn start(&self) -> Result<()> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err(eyre!("listener crashed"))
        }

        async fn stop(&self) -> Result<()> {
            Ok(())
        }
    }

    fn journal() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn cancellation_stops_everything_cleanly() {
        let cancel = CancellationToken::new();
        let hub = Hub::new(cancel.clone());
        let journal = journal();
        let a = Blocking::new("a", journal.clone());
        let b = Blocking::new("b", journal.clone());
        hub.add_proc(a.clone());
        hub.add_proc(b.clone());
        settle().await;
        assert_eq!(hub.state(), HubState::Running);

        cancel.cancel();
        let err = hub.wait().await.unwrap_err();

        assert!(is_clean_stop(&err));
        assert_eq!(err.to_string(), "hub is stopped by signal without errors");
        assert_eq!(*journal.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(a.stop_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.stop_calls.load(Ordering::SeqCst), 1);
        assert_eq!(hub.state(), HubState::Stopped);
    }

    #[tokio::test]
    async fn process_failure_stops_the_others() {
        let hub = Hub::new(CancellationToken::new());
        let journal = journal();
        let a = Blocking::new("a", journal.clone());
        hub.add_proc(a.clone());
        hub.add_proc(Arc::new(Failing));

        let err = tokio::time::timeout(Duration::from_secs(2), hub.wait())
            .await
            .expect("hub did not stop")
            .unwrap_err();

        assert!(!is_clean_stop(&err));
        assert!(format!("{err:#}").contains("listener crashed"));
        assert_eq!(a.stop_calls.load(Ordering::SeqCst), 1);
        assert!(a.stopped.is_cancelled());
    }

    #[tokio::test]
    async fn stop_errors_do_not_skip_later_stoppers() {
        let cancel = CancellationToken::new();
        let hub = Hub::new(cancel.clone());
        let journal = journal();
        let first = Arc::new(Blocking {
            name: "first".to_string(),
            stopped: CancellationToken::new(),
            journal: journal.clone(),
            stop_calls: AtomicUsize::new(0),
            fail_stop: true,
        });
        let second = Blocking::new("second", journal.clone());
        hub.add_proc(first);
        hub.add_proc(second.clone());
        settle().await;

        cancel.cancel();
        let err = hub.wait().await.unwrap_err();

        assert!(!is_clean_stop(&err));
        assert!(format!("{err:#}").contains("first refused to stop"));
        assert_eq!(*journal.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(second.stop_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_path_runs_once() {
        let hub = Hub::new(CancellationToken::new());
        let journal = journal();
        let a = Blocking::new("a", journal.clone());
        hub.add_proc(a.clone());
        settle().await;

        let (first, second) = tokio::join!(hub.stop(), hub.stop());
        assert_eq!(
            [first.is_some(), second.is_some()]
                .iter()
                .filter(|ran| **ran)
                .count(),
            1
        );
        assert_eq!(a.stop_calls.load(Ordering::SeqCst), 1);
        assert!(hub.stop().await.is_none());
    }

    #[tokio::test]
    async fn late_registration_is_never_started() {
        struct Tracking(AtomicUsize);

        #[async_trait]
        impl Process for Tracking {
            fn name(&self) -> &str {
                "late"
            }

            async fn start(&self) -> Result<()> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }

            async fn stop(&self) -> Result<()> {
                self.0.fetch_add(100, Ordering::SeqCst);
                Ok(())
            }
        }

        let cancel = CancellationToken::new();
        let hub = Hub::new(cancel.clone());
        cancel.cancel();
        assert!(is_clean_stop(&hub.wait().await.unwrap_err()));

        let late = Arc::new(Tracking(AtomicUsize::new(0)));
        hub.add_proc(late.clone());
        settle().await;
        assert_eq!(late.0.load(Ordering::SeqCst), 0);
        assert_eq!(hub.state(), HubState::Stopped);
    }

    #[tokio::test]
    async fn registration_before_cancellation_is_started_and_stopped() {
        struct Counting {
            started: AtomicUsize,
            stopped: AtomicUsize,
            done: CancellationToken,
        }

        #[async_trait]
        impl Process for Counting {
            fn name(&self) -> &str {
                "counting"
            }

            async fn start(&self) -> Result<()> {
                self.started.fetch_add(1, Ordering::SeqCst);
                self.done.cancelled().await;
                Ok(())
            }

            async fn stop(&self) -> Result<()> {
                self.stopped.fetch_add(1, Ordering::SeqCst);
                self.done.cancel();
                Ok(())
            }
        }

        let cancel = CancellationToken::new();
        let hub = Hub::new(cancel.clone());
        let process = Arc::new(Counting {
            started: AtomicUsize::new(0),
            stopped: AtomicUsize::new(0),
            done: CancellationToken::new(),
        });

        hub.add_proc(process.clone());
        cancel.cancel();
        let err = tokio::time::timeout(Duration::from_secs(2), hub.wait())
            .await
            .expect("hub did not stop")
            .unwrap_err();

        assert!(is_clean_stop(&err));
        assert_eq!(process.started.load(Ordering::SeqCst), 1);
        assert_eq!(process.stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failure_racing_cancellation_stops_once() {
        for _ in 0..50 {
            let cancel = CancellationToken::new();
            let hub = Hub::new(cancel.clone());
            let journal = journal();
            let bystander = Blocking::new("bystander", journal.clone());
            let racer_stops = Arc::new(AtomicUsize::new(0));

            hub.add_proc(bystander.clone());
            hub.add_proc(Arc::new(crate::utils::process::FnProcess::new(
                "racer",
                {
                    let cancel = cancel.clone();
                    move || -> BoxFuture<'static, Result<()>> {
                        let cancel = cancel.clone();
                        Box::pin(async move {
                            cancel.cancel();
                            Err(eyre!("racer crashed"))
                        })
                    }
                },
                {
                    let racer_stops = racer_stops.clone();
                    move || -> BoxFuture<'static, Result<()>> {
                        racer_stops.fetch_add(1, Ordering::SeqCst);
                        Box::pin(async { Ok(()) })
                    }
                },
            )));

            let result = tokio::time::timeout(Duration::from_secs(2), hub.wait())
                .await
                .expect("hub did not stop");

            assert!(result.is_err());
            assert_eq!(bystander.stop_calls.load(Ordering::SeqCst), 1);
            assert_eq!(racer_stops.load(Ordering::SeqCst), 1);
            assert_eq!(*journal.lock().unwrap(), vec!["bystander"]);
            assert_eq!(hub.state(), HubState::Stopped);
            assert!(hub.stop().await.is_none());
        }
    }

    #[tokio::test]
    async fn clean_process_exit_triggers_shutdown() {
        let hub = Hub::new(CancellationToken::new());
        let journal = journal();
        let a = Blocking::new("a", journal.clone());
        hub.add_proc(a.clone());
        hub.add_proc(Arc::new(crate::utils::process::FnProcess::new(
            "oneshot",
            || Box::pin(async { Ok(()) }),
            || Box::pin(async { Ok(()) }),
        )));

        let result = tokio::time::timeout(Duration::from_secs(2), hub.wait())
            .await
            .expect("hub did not stop");
        assert!(result.is_ok());
        assert_eq!(a.stop_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn wait_returns_after_all_processes_returned() {
        struct Draining {
            stopped: CancellationToken,
            finished: Arc<AtomicBool>,
        }

        #[async_trait]
        impl Process for Draining {
            fn name(&self) -> &str {
                "draining"
            }

            async fn start(&self) -> Result<()> {
                self.stopped.cancelled().await;
                tokio::time::sleep(Duration::from_millis(50)).await;
                self.finished.store(true, Ordering::SeqCst);
                Ok(())
            }

            async fn stop(&self) -> Result<()> {
                self.stopped.cancel();
                Ok(())
            }
        }

        let cancel = CancellationToken::new();
        let hub = Hub::new(cancel.clone());
        let finished = Arc::new(AtomicBool::new(false));
        hub.add_proc(Arc::new(Draining {
            stopped: CancellationToken::new(),
            finished: finished.clone(),
        }));
        settle().await;

        cancel.cancel();
        let _ = hub.wait().await;
        assert!(finished.load(Ordering::SeqCst));
    }
}
