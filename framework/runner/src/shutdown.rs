use profiler_e2e_core::prelude::ShutdownHandle;
use tokio::signal;

/// Request a shutdown of all running cases on Ctrl-C.
///
/// Cases stop waiting for their benchmark and go straight to deleting their instance, so the
/// process should be left to exit on its own.
pub(crate) fn start_shutdown_listener(runtime: &tokio::runtime::Runtime) -> ShutdownHandle {
    let handle = ShutdownHandle::default();

    let listener_handle = handle.clone();
    runtime.spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                println!("Received shutdown signal, cleaning up instances...");
                listener_handle.shutdown();
            }
            Err(e) => log::error!("Failed to listen for the Ctrl-C signal: {e}"),
        }
    });

    handle
}
