use crate::machine::{Machine, ShutdownSignal};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use log::{info, warn};
use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// how long to wait for the execution thread before releasing resources
/// anyway
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

/// the execution thread, plus a way to find out that it has finished
pub struct ExecutionThread {
    handle: JoinHandle<()>,
    /// never sent on; disconnects when the thread's run loop returns
    exited: Receiver<()>,
}

/// start `machine.run()` on its own thread
pub fn spawn_execution(machine: Machine) -> Result<ExecutionThread, io::Error> {
    let (exit_tx, exited) = bounded::<()>(1);
    let handle = thread::Builder::new()
        .name("chip8-exec".into())
        .spawn(move || {
            let _exit = exit_tx;
            machine.run();
        })?;
    Ok(ExecutionThread { handle, exited })
}

/// turns a host quit into exactly one stop signal, then waits a bounded time
/// for the execution thread to notice
pub struct ShutdownCoordinator {
    signal: Option<ShutdownSignal>,
    execution: Option<ExecutionThread>,
}

impl ShutdownCoordinator {
    pub fn new(signal: ShutdownSignal, execution: ExecutionThread) -> Self {
        ShutdownCoordinator {
            signal: Some(signal),
            execution: Some(execution),
        }
    }

    /// send the stop signal; returns false if it was already sent
    pub fn request(&mut self) -> bool {
        match self.signal.take() {
            Some(signal) => {
                info!("stopping execution thread");
                signal.send();
                true
            }
            None => false,
        }
    }

    /// once requested there is no going back
    pub fn is_terminated(&self) -> bool {
        self.signal.is_none()
    }

    /// wait at most `grace` for the execution thread to leave its run loop.
    /// returns whether it was seen to stop; never blocks longer than `grace`
    /// plus the time to reap an already-finished thread.
    pub fn await_exit(&mut self, grace: Duration) -> bool {
        let execution = match self.execution.take() {
            Some(e) => e,
            None => return true,
        };
        match execution.exited.recv_timeout(grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if execution.handle.join().is_err() {
                    warn!("execution thread panicked");
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("execution thread still running after {grace:?}; leaving it behind");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MachineConfig;
    use std::time::Instant;

    fn spinning_machine() -> (Machine, ShutdownSignal) {
        let (m, _beeps, shutdown) = Machine::new(MachineConfig::default()).unwrap();
        let mut prog: &[u8] = &[0x12, 0x00];
        m.load_program(&mut prog).unwrap();
        (m, shutdown)
    }

    #[test]
    fn test_request_is_one_shot() {
        let (m, shutdown) = spinning_machine();
        let mut c = ShutdownCoordinator::new(shutdown, spawn_execution(m).unwrap());
        assert!(!c.is_terminated());
        assert!(c.request());
        assert!(c.is_terminated());
        assert!(!c.request());
        assert!(c.await_exit(Duration::from_secs(2)));
    }

    #[test]
    fn test_execution_stops_after_request() {
        let (m, shutdown) = spinning_machine();
        let mut c = ShutdownCoordinator::new(shutdown, spawn_execution(m.clone()).unwrap());
        thread::sleep(Duration::from_millis(20));
        c.request();
        assert!(c.await_exit(Duration::from_secs(2)));
        let stopped_at = m.cycle();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(m.cycle(), stopped_at);
    }

    #[test]
    fn test_paused_machine_stops_too() {
        let (m, shutdown) = spinning_machine();
        m.set_paused(true);
        let mut c = ShutdownCoordinator::new(shutdown, spawn_execution(m).unwrap());
        c.request();
        assert!(c.await_exit(Duration::from_secs(2)));
    }

    #[test]
    fn test_await_exit_is_bounded() {
        // a thread that ignores the signal entirely
        let (m, shutdown) = spinning_machine();
        let (exit_tx, exited) = bounded::<()>(1);
        let (release_tx, release_rx) = bounded::<()>(1);
        let handle = thread::spawn(move || {
            let _exit = exit_tx;
            let _ = release_rx.recv();
        });
        let mut c = ShutdownCoordinator::new(shutdown, ExecutionThread { handle, exited });
        c.request();
        let start = Instant::now();
        assert!(!c.await_exit(Duration::from_millis(50)));
        assert!(start.elapsed() < Duration::from_secs(1));
        release_tx.send(()).unwrap();
        drop(m);
    }
}
