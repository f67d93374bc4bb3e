//! Moves channel publishing off the frame loop.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, TrySendError, bounded};

use crate::error::ChannelError;
use crate::stream::emitter::EventChannel;
use crate::stream::event::Event;

/// [`EventChannel`] that queues events for a single publishing thread.
///
/// Events keep their order. When the queue is full the event is dropped and
/// the caller gets an error, so a slow consumer never stalls tracking.
pub struct BackgroundPublisher {
    tx: Option<Sender<(String, Event)>>,
    join: Option<JoinHandle<u64>>,
}

impl BackgroundPublisher {
    pub fn spawn<C>(mut inner: C, capacity: usize) -> Self
    where
        C: EventChannel + Send + 'static,
    {
        let (tx, rx) = bounded::<(String, Event)>(capacity.max(1));
        let join = thread::spawn(move || {
            let mut failures = 0u64;
            for (session_id, event) in rx {
                if let Err(e) = inner.publish(&session_id, &event) {
                    failures += 1;
                    tracing::warn!(%session_id, event = event.name(), error = %e, "background publish failed");
                }
            }
            failures
        });
        Self {
            tx: Some(tx),
            join: Some(join),
        }
    }

    /// Close the queue, let the worker drain it and join. Returns the number
    /// of events the inner channel rejected.
    pub fn shutdown(mut self) -> u64 {
        self.finish()
    }

    fn finish(&mut self) -> u64 {
        drop(self.tx.take());
        match self.join.take().map(JoinHandle::join) {
            Some(Ok(failures)) => failures,
            Some(Err(_)) => {
                tracing::warn!("publisher thread panicked");
                0
            }
            None => 0,
        }
    }
}

impl EventChannel for BackgroundPublisher {
    fn publish(&mut self, session_id: &str, event: &Event) -> Result<(), ChannelError> {
        let tx = self.tx.as_ref().ok_or(ChannelError::Closed)?;
        match tx.try_send((session_id.to_string(), event.clone())) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(ChannelError::Publish("publisher queue full".into())),
            Err(TrySendError::Disconnected(_)) => Err(ChannelError::Closed),
        }
    }
}

impl Drop for BackgroundPublisher {
    fn drop(&mut self) {
        self.finish();
    }
}
