use tokio::sync::watch;

/// Broadcasts a request to stop all running cases.
///
/// Listeners created after the shutdown was requested still see it, so a case that has not yet
/// started polling will not miss the signal.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: watch::Sender<bool>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            sender: watch::channel(false).0,
        }
    }

    pub fn shutdown(&self) {
        // `send_replace` never fails, even when nobody is listening yet.
        if self.sender.send_replace(true) {
            log::debug!("Shutdown was already requested");
        }
    }

    pub fn new_listener(&self) -> ShutdownListener {
        ShutdownListener {
            receiver: self.sender.subscribe(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownListener {
    receiver: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// Point in time check of whether shutdown has been requested.
    pub fn should_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait until shutdown is requested. Safe to race with other futures in a `select!`.
    ///
    /// If the [ShutdownHandle] is dropped without requesting shutdown then this never resolves.
    pub async fn wait_for_shutdown(&mut self) {
        if self.receiver.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
