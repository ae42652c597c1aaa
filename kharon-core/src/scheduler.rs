//! One thread per stage, gated through a three-phase barrier (pre-run, run,
//! post-run), with cooperative shutdown via a `DONE` bit. Grounded on
//! `datap.c`'s `dp_wait`/`dp_execute` lifecycle and `braid-triggerbox`'s
//! `thread_control::make_pair` + named-thread launch pattern.
//!
//! The source unsticks blocking reads with asynchronous signals plus
//! `shutdown()` on sockets. Per the cancellation redesign note, stages here
//! instead use timeout-bounded I/O (e.g. a socket read timeout) and re-check
//! their `Flag` between calls — no signal delivery is needed.

use std::sync::{Arc, Barrier};
use std::time::Duration;

use thread_control::{Control, Flag};
use tracing::{error, info};

/// One processing stage. `run` must check `flag.is_alive()` periodically
/// (including between blocking I/O calls, which should be timeout-bounded)
/// and return once it goes false.
pub trait Stage: Send {
    fn name(&self) -> &str;

    fn pre_run(&mut self) -> Result<(), crate::error::KharonError> {
        Ok(())
    }

    fn run(&mut self, flag: &Flag);

    fn post_run(&mut self) {}
}

struct Handle {
    name: String,
    control: Control,
    join: Option<std::thread::JoinHandle<()>>,
}

/// Wires stages into a DAG's worth of OS threads and drives them through the
/// pre-run/run/post-run barrier.
pub struct Scheduler {
    handles: Vec<Handle>,
    barrier: Arc<Barrier>,
}

const SHUTDOWN_GRACE: Duration = Duration::from_millis(1500);

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            handles: Vec::new(),
            barrier: Arc::new(Barrier::new(1)),
        }
    }

    /// Register a stage and spawn its thread. The thread blocks at the
    /// first barrier until every stage has been spawned and `launch` is
    /// called, so wiring (add_producer / add_consumer) can complete before
    /// any stage's `run` executes.
    ///
    /// Must be called for every stage before `launch`; the barrier's
    /// participant count is fixed at the first `spawn` and is `expected
    /// final stage count + 1` (the caller thread also rendezvouses).
    pub fn spawn<S>(&mut self, mut stage: S, total_stages: usize)
    where
        S: Stage + 'static,
    {
        if self.handles.is_empty() {
            self.barrier = Arc::new(Barrier::new(total_stages + 1));
        }
        let name = stage.name().to_string();
        let (flag, control) = thread_control::make_pair();
        let barrier = self.barrier.clone();
        let thread_name = name.clone();

        let join = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                barrier.wait();
                if let Err(e) = stage.pre_run() {
                    error!(stage = %thread_name, error = %e, "pre_run failed");
                    if e.is_fatal() {
                        // hard_exit terminates the whole process immediately;
                        // no need to satisfy the remaining barrier phases.
                        crate::scheduler::hard_exit(&thread_name, &e.to_string());
                    }
                }
                barrier.wait();
                if flag.is_alive() {
                    stage.run(&flag);
                }
                barrier.wait();
                stage.post_run();
                info!(stage = %thread_name, "post_run complete");
            })
            .expect("failed to spawn stage thread");

        self.handles.push(Handle {
            name,
            control,
            join: Some(join),
        });
    }

    /// Release every stage from its pre-run wait, then from its run wait.
    pub fn launch(&self) {
        self.barrier.wait(); // release pre_run
        self.barrier.wait(); // release run
    }

    /// Trip every stage's `DONE` bit, wait out the post-run barrier, then
    /// join every stage thread within the shutdown grace window.
    pub fn shutdown(mut self) {
        for h in &self.handles {
            h.control.stop();
        }
        self.barrier.wait(); // release post_run
        std::thread::sleep(SHUTDOWN_GRACE);
        for h in &mut self.handles {
            if let Some(j) = h.join.take() {
                if j.join().is_err() {
                    error!(stage = %h.name, "stage thread panicked");
                }
            }
        }
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.handles.iter().map(|h| h.name.as_str()).collect()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Fatal-error exit: log, then terminate the process. There is no exception
/// mechanism in this runtime; every invariant violation or configuration
/// error that reaches here is unrecoverable.
pub fn hard_exit(caller: &str, message: &str) -> ! {
    error!(caller, message, "hard exit");
    std::process::exit(1);
}
