use crate::external_services::{
    execute_adapter, AdapterHandle, AdapterHandleBuilder, RequestAdapter, RequestAdapterFactory,
    RequestToAdapter,
};
use crate::simulation::config::TripsSource;
use crate::simulation::engines::spawner::RecordFeed;
use crate::simulation::records::http_source::HttpTripSource;
use crate::simulation::records::provider::{RecordProvider, TripSource};
use crate::simulation::records::{ProviderError, TripRecord};
use std::thread;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tracing::trace;

pub type RecordResponse = Result<TripRecord, ProviderError>;

#[derive(Debug)]
pub struct RecordRequest {
    pub index: usize,
    pub response_tx: oneshot::Sender<RecordResponse>,
}

impl RequestToAdapter for RecordRequest {}

/// Serves record requests from a [`RecordProvider`] on the adapter thread.
pub struct TripsServiceAdapter<S: TripSource> {
    provider: RecordProvider<S>,
}

impl<S: TripSource> RequestAdapter<RecordRequest> for TripsServiceAdapter<S> {
    async fn on_request(&mut self, req: RecordRequest) {
        if req.response_tx.is_closed() {
            trace!("Request for record {} was cancelled.", req.index);
            return;
        }
        let response = self.provider.fetch(req.index).await;
        // the requester might have given up in the meantime
        let _ = req.response_tx.send(response);
    }
}

pub struct TripsServiceAdapterFactory<S: TripSource> {
    source: S,
    prefetch_size: usize,
    threads: usize,
}

impl<S: TripSource> TripsServiceAdapterFactory<S> {
    pub fn new(source: S, prefetch_size: usize, threads: usize) -> Self {
        Self {
            source,
            prefetch_size,
            threads,
        }
    }
}

impl TripsServiceAdapterFactory<HttpTripSource> {
    pub fn from_config(config: &TripsSource) -> Result<Self, ProviderError> {
        let source = HttpTripSource::new(
            &config.base_url,
            config.request_timeout(),
            config.retry_policy(),
        )?;
        Ok(Self::new(
            source,
            config.prefetch_size,
            config.adapter_worker_threads as usize,
        ))
    }
}

impl<S: TripSource> RequestAdapterFactory<RecordRequest> for TripsServiceAdapterFactory<S> {
    async fn build(self) -> impl RequestAdapter<RecordRequest> {
        TripsServiceAdapter {
            provider: RecordProvider::new(self.source, self.prefetch_size),
        }
    }

    fn thread_count(&self) -> usize {
        self.threads
    }
}

impl<S: TripSource + Send + 'static> TripsServiceAdapterFactory<S> {
    /// Starts the adapter thread. The thread logs to the subscriber of the calling thread.
    pub fn spawn_thread(self, name: &str) -> std::io::Result<(AdapterHandle, AdapterRecordFeed)> {
        // only one request is outstanding at any time
        let (send, recv) = self.request_channel(16);
        let (send_sd, recv_sd) = self.shutdown_channel();
        let dispatch = tracing::dispatcher::get_default(|d| d.clone());

        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                tracing::dispatcher::with_default(&dispatch, || {
                    execute_adapter(recv, self, recv_sd)
                })
            })?;

        let handle = AdapterHandleBuilder::default()
            .handle(handle)
            .shutdown_sender(send_sd)
            .build()
            .map_err(std::io::Error::other)?;
        Ok((handle, AdapterRecordFeed::new(send)))
    }
}

/// The spawner's side of the trips adapter. Requests are sent without blocking and answers are
/// picked up with `try_recv`. A new request drops the receiver of the previous one, which
/// cancels it.
#[derive(Debug)]
pub struct AdapterRecordFeed {
    sender: mpsc::Sender<RecordRequest>,
    response: Option<oneshot::Receiver<RecordResponse>>,
    failure: Option<ProviderError>,
}

impl AdapterRecordFeed {
    pub fn new(sender: mpsc::Sender<RecordRequest>) -> Self {
        AdapterRecordFeed {
            sender,
            response: None,
            failure: None,
        }
    }
}

impl RecordFeed for AdapterRecordFeed {
    fn request(&mut self, index: usize) {
        let (response_tx, response_rx) = oneshot::channel();
        self.response = None;
        match self.sender.try_send(RecordRequest { index, response_tx }) {
            Ok(()) => self.response = Some(response_rx),
            Err(e) => {
                self.failure = Some(ProviderError::Unavailable(format!(
                    "trips adapter does not accept requests: {e}"
                )))
            }
        }
    }

    fn poll(&mut self) -> Option<RecordResponse> {
        if let Some(failure) = self.failure.take() {
            return Some(Err(failure));
        }
        let response = self.response.as_mut()?;
        match response.try_recv() {
            Ok(result) => {
                self.response = None;
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => {
                self.response = None;
                Some(Err(ProviderError::Unavailable(
                    "trips adapter dropped the request".to_string(),
                )))
            }
        }
    }
}
