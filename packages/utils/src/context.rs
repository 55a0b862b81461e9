use std::sync::{atomic::AtomicBool, Arc};

use tokio::runtime::Runtime;
use tracing::instrument;

/// Shared process context: the tokio runtime plus a cooperative kill switch.
/// Every long-running subsystem holds a clone and listens for the kill
/// signal to shut down gracefully.
#[derive(Clone)]
pub struct AppContext {
    pub rt: Arc<Runtime>,
    killed: Arc<AtomicBool>,
    kill_sender: tokio::sync::broadcast::Sender<()>,
    // held so a kill() before any subscriber exists doesn't error out
    _kill_receiver: Arc<tokio::sync::broadcast::Receiver<()>>,
}

impl Default for AppContext {
    fn default() -> Self {
        Self::new()
    }
}

impl AppContext {
    pub fn new() -> Self {
        let rt = Arc::new(
            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .unwrap(),
        );

        let (kill_sender, kill_receiver) = tokio::sync::broadcast::channel(1);

        Self {
            rt,
            kill_sender,
            _kill_receiver: Arc::new(kill_receiver),
            killed: Arc::new(AtomicBool::new(false)),
        }
    }

    #[instrument(level = "debug", skip(self), fields(subsys = "AppContext"))]
    pub fn get_kill_receiver(&self) -> tokio::sync::broadcast::Receiver<()> {
        self.kill_sender.subscribe()
    }

    /// Typically only called from main or tests - kills the system gracefully
    #[instrument(level = "debug", skip(self), fields(subsys = "AppContext"))]
    pub fn kill(&self) {
        self.killed.store(true, std::sync::atomic::Ordering::SeqCst);
        let _ = self.kill_sender.send(());
    }

    pub fn killed(&self) -> bool {
        self.killed.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kill_flag_flips_once() {
        let ctx = AppContext::new();
        assert!(!ctx.killed());
        ctx.kill();
        assert!(ctx.killed());
        // second kill is a no-op, not a panic
        ctx.kill();
        assert!(ctx.killed());
    }

    #[test]
    fn kill_reaches_subscribers() {
        let ctx = AppContext::new();
        let mut rx = ctx.get_kill_receiver();
        ctx.kill();
        ctx.rt.clone().block_on(async move {
            rx.recv().await.unwrap();
        });
    }
}
