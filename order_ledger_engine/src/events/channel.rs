//! Stateless pub-sub plumbing for ledger events.
//!
//! Each [`EventHandler`] owns a bounded channel and one async callback. Producers push events (order created, status
//! changed, payment completed, refund issued) into the channel without waiting, and the handler task feeds them to
//! the callback one at a time. Callbacks only ever see the event; they cannot reach into the ledger's state.
use std::{
    future::Future,
    pin::Pin,
    sync::{atomic::AtomicI64, Arc},
};

use log::*;
use tokio::sync::mpsc;

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        Self { listener: receiver, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    pub async fn start_handler(mut self) {
        debug!("📬️ Starting event handler");
        // drop the internal sender so that when the last subscriber is dropped, we can automatically shut down the
        // handler
        drop(self.sender);
        let jobs = Arc::new(AtomicI64::new(0));
        while let Some(ev) = self.listener.recv().await {
            trace!("📬️ Handling event");
            let handler = Arc::clone(&self.handler);
            jobs.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let job = jobs.clone();
            tokio::spawn(async move {
                (handler)(ev).await;
                job.fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
                trace!("📬️ Event handled");
            });
        }
        match tokio::spawn(async move {
            while jobs.load(std::sync::atomic::Ordering::SeqCst) > 0 {
                debug!("📬️ Waiting for jobs to complete");
                tokio::time::sleep(tokio::time::Duration::from_millis(1000)).await;
            }
        })
        .await
        {
            Ok(_) => {
                debug!("📬️ Event handler shutting down gracefully");
            },
            Err(e) => {
                warn!(
                    "📬️ Event handler shutdown process failed: {e}. Some handlers may not have \
                     completed."
                );
            },
        }
        debug!("📬️ Event handler has shut down");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    /// Queues the event for the handler without waiting. If the handler has fallen behind and the buffer is full,
    /// the event is dropped with a warning; notification delivery never holds up the ledger.
    pub fn publish_event(&self, event: E) {
        match self.sender.try_send(event) {
            Ok(()) => {},
            Err(mpsc::error::TrySendError::Full(_)) => warn!("📬️ Event buffer is full. Dropping event."),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("📬️ Failed to send event: the handler has shut down")
            },
        }
    }
}
