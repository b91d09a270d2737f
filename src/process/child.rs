use log::info;
use std::{
    io::IsTerminal,
    mem,
    ops::{Deref, DerefMut},
    pin::pin,
    sync::{LazyLock, Mutex},
    time::Duration,
};
use tokio::{
    signal,
    time::{Instant, timeout_at},
};
use tokio_process_stream::ProcessChunkStream;

static RUNNING: LazyLock<Mutex<Vec<ProcessChunkStream>>> = LazyLock::new(<_>::default);

/// Add an engine process so it may be waited on before exiting.
pub fn add(mut child: ProcessChunkStream) {
    let mut running = RUNNING.lock().unwrap_or_else(|e| e.into_inner());

    // remove any that have exited already
    running.retain_mut(|c| c.child_mut().is_some_and(|c| matches!(c.try_wait(), Ok(None))));

    if child
        .child_mut()
        .is_some_and(|c| matches!(c.try_wait(), Ok(None)))
    {
        running.push(child);
    }
}

/// Wait for all engine processes, that were added with [`add`], to exit.
///
/// Engine processes write into the run temp dir so should exit before it is cleaned.
pub async fn wait() {
    // if waiting takes >500ms log what's happening
    let mut log_deadline = Some(Instant::now() + Duration::from_millis(500));
    let procs = mem::take(&mut *RUNNING.lock().unwrap_or_else(|e| e.into_inner()));
    let mut ctrl_c = pin!(signal::ctrl_c());

    for mut proc in procs {
        if let Some(child) = proc.child_mut() {
            // dropped streams may still be running, make sure they stop
            let _ = child.start_kill();
            if let Some(deadline) = log_deadline {
                if timeout_at(deadline, child.wait()).await.is_err() {
                    log_waiting();
                    log_deadline = None;
                }
            }
            tokio::select! {
                _ = &mut ctrl_c => {
                    log_abort_wait();
                    return;
                }
                _ = child.wait() => {}
            }
        }
    }
}

fn log_waiting() {
    match std::io::stderr().is_terminal() {
        true => eprintln!("Waiting for vmafrc processes to exit..."),
        _ => info!("Waiting for vmafrc processes to exit"),
    }
}

fn log_abort_wait() {
    match std::io::stderr().is_terminal() {
        true => eprintln!("Aborting wait for vmafrc processes"),
        _ => info!("Aborting wait for vmafrc processes"),
    }
}

/// Wrapper that [`add`]s the inner on drop.
#[derive(Debug)]
pub struct AddOnDropChunkStream(Option<ProcessChunkStream>);

impl From<ProcessChunkStream> for AddOnDropChunkStream {
    fn from(v: ProcessChunkStream) -> Self {
        Self(Some(v))
    }
}

impl Drop for AddOnDropChunkStream {
    fn drop(&mut self) {
        if let Some(child) = self.0.take() {
            add(child);
        }
    }
}

impl Deref for AddOnDropChunkStream {
    type Target = ProcessChunkStream;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref().expect("only none after drop")
    }
}

impl DerefMut for AddOnDropChunkStream {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut().expect("only none after drop")
    }
}
