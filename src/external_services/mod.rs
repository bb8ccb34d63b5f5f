use derive_builder::Builder;
use std::fmt::Debug;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::{Receiver, Sender};
use tracing::{info, warn};

pub mod trips;

/// This trait is a marker trait for requests that can be sent to an adapter.
pub trait RequestToAdapter: Debug + Send {}

/// This struct is a wrapper around the JoinHandle of the adapter thread. Additionally, it holds a shutdown sender for the adapter.
/// The purpose of this struct is to manage the lifecycle of the adapter thread, allowing for sending shutdown signals before waiting for the thread to finish.
#[derive(Debug, Builder)]
#[builder(pattern = "owned")]
pub struct AdapterHandle {
    pub(super) handle: JoinHandle<()>,
    pub(super) shutdown_sender: tokio::sync::watch::Sender<bool>,
}

impl AdapterHandle {
    /// Signals the adapter to shut down and waits for its thread to finish.
    pub fn shutdown(self) {
        // the adapter may already be gone if all request senders were dropped
        let _ = self.shutdown_sender.send(true);
        if self.handle.join().is_err() {
            warn!("Adapter thread panicked.");
        }
    }
}

/// This trait defines a factory for creating request adapters.
pub trait RequestAdapterFactory<T: RequestToAdapter> {
    /// This method builds the request adapter. It returns a future that resolves to the adapter instance.
    fn build(self) -> impl std::future::Future<Output = impl RequestAdapter<T>>;

    /// This method creates a channel for sending requests to the adapter.
    fn request_channel(&self, buffer: usize) -> (Sender<T>, Receiver<T>) {
        mpsc::channel(buffer)
    }

    /// This method creates a shutdown channel for the adapter.
    fn shutdown_channel(
        &self,
    ) -> (
        tokio::sync::watch::Sender<bool>,
        tokio::sync::watch::Receiver<bool>,
    ) {
        tokio::sync::watch::channel(false)
    }

    /// This method returns the number of worker threads to be used for the tokio runtime by the adapter.
    fn thread_count(&self) -> usize {
        1
    }
}

/// This trait defines the behavior of a request adapter. A request adapter processes incoming requests of type T.
/// One request adapter instance is run in a separate thread with its own tokio runtime.
pub trait RequestAdapter<T: RequestToAdapter> {
    fn on_request(&mut self, req: T) -> impl std::future::Future<Output = ()>;
    fn on_shutdown(&mut self) {
        info!("Adapter is shutting down");
    }
}

/// This function executes the adapter in a separate thread with its own tokio runtime.
/// Requests are processed one after another. The adapter stops on the shutdown signal or when
/// all request senders are dropped.
pub fn execute_adapter<T: RequestToAdapter>(
    mut receiver: Receiver<T>,
    req_adapter_factory: impl RequestAdapterFactory<T>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    info!("Starting adapter");

    assert!(
        req_adapter_factory.thread_count() > 0,
        "adapter_worker_threads must be greater than 0"
    );

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(req_adapter_factory.thread_count())
        .enable_all()
        .build()
        .expect("Failed to build the adapter runtime");

    rt.block_on(async move {
        let mut req_adapter = req_adapter_factory.build().await;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown signal received, exiting adapter.");
                        req_adapter.on_shutdown();
                        break;
                    }
                }
                maybe_req = receiver.recv() => {
                    match maybe_req {
                        Some(req) => req_adapter.on_request(req).await,
                        None => {
                            info!("All request senders dropped, exiting adapter.");
                            req_adapter.on_shutdown();
                            break;
                        }
                    }
                }
            }
        }
    })
}
