//! Asynchronous, ordered event dispatch.
//!
//! An [`EventQueue`] owns a background task that drains a bounded channel one
//! event at a time through [`Dispatcher::dispatch_sync`]. Producers on any
//! task or thread may submit; events are applied in submission order and none
//! are dropped or reordered.

use crate::dispatcher::Dispatcher;
use crate::metrics::DispatchMetrics;
use refract_core::{DispatchError, Event};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

enum Command<E> {
    Dispatch(E),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Cloneable producer side of an [`EventQueue`]
pub struct EventSender<E> {
    sender: mpsc::Sender<Command<E>>,
}

impl<E> Clone for EventSender<E> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<E: Event> EventSender<E> {
    /// Enqueue an event, waiting for buffer space if the queue is full
    ///
    /// Returns once the event is queued, not once it has committed. Failures
    /// of the dispatch itself are logged by the worker.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::QueueClosed`] if the worker has stopped.
    pub async fn dispatch(&self, event: E) -> Result<(), DispatchError> {
        self.sender
            .send(Command::Dispatch(event))
            .await
            .map_err(|_| DispatchError::QueueClosed)
    }

    /// Enqueue an event without waiting
    ///
    /// # Errors
    ///
    /// - [`DispatchError::QueueFull`]: The buffer is at capacity
    /// - [`DispatchError::QueueClosed`]: The worker has stopped
    pub fn try_dispatch(&self, event: E) -> Result<(), DispatchError> {
        self.sender
            .try_send(Command::Dispatch(event))
            .map_err(|error| match error {
                mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => DispatchError::QueueClosed,
            })
    }

    /// Wait until every event submitted before this call has been applied
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::QueueClosed`] if the worker has stopped.
    pub async fn flush(&self) -> Result<(), DispatchError> {
        let (ack, done) = oneshot::channel();
        self.sender
            .send(Command::Flush(ack))
            .await
            .map_err(|_| DispatchError::QueueClosed)?;
        done.await.map_err(|_| DispatchError::QueueClosed)
    }

    /// Whether the worker has stopped accepting events
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl<E> fmt::Debug for EventSender<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSender")
            .field("capacity", &self.sender.capacity())
            .finish()
    }
}

/// Background worker applying queued events in order
///
/// # Example
///
/// ```
/// # use refract_core::Event;
/// # use refract_runtime::{Dispatcher, EventQueue, StateContainer};
/// # use std::sync::Arc;
/// # #[derive(Debug)]
/// # struct Tick;
/// # impl Event for Tick {
/// #     fn name(&self) -> &'static str { "tick" }
/// # }
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), refract_core::DispatchError> {
/// let dispatcher = Arc::new(Dispatcher::<u32, Tick>::new(StateContainer::new(0)));
/// dispatcher.reg_event_db("tick", Vec::new(), |n: &u32, _: &Tick| n + 1);
///
/// let queue = EventQueue::spawn(Arc::clone(&dispatcher));
/// queue.dispatch(Tick).await?;
/// queue.dispatch(Tick).await?;
/// queue.flush().await?;
///
/// assert_eq!(*dispatcher.container().get(), 2);
/// queue.shutdown().await
/// # }
/// ```
pub struct EventQueue<E> {
    sender: EventSender<E>,
    worker: JoinHandle<()>,
}

impl<E: Event> EventQueue<E> {
    /// Start the worker on the current tokio runtime
    ///
    /// The buffer size comes from the dispatcher's
    /// [`crate::RuntimeConfig::queue_capacity`].
    #[must_use]
    pub fn spawn<S>(dispatcher: Arc<Dispatcher<S, E>>) -> Self
    where
        S: fmt::Debug + Send + Sync + 'static,
    {
        let (sender, receiver) = mpsc::channel(dispatcher.config().queue_capacity);
        let worker = tokio::spawn(drain(dispatcher, receiver));
        Self {
            sender: EventSender { sender },
            worker,
        }
    }

    /// A producer handle that can be cloned and moved to other tasks
    #[must_use]
    pub fn sender(&self) -> EventSender<E> {
        self.sender.clone()
    }

    /// See [`EventSender::dispatch`]
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::QueueClosed`] if the worker has stopped.
    pub async fn dispatch(&self, event: E) -> Result<(), DispatchError> {
        self.sender.dispatch(event).await
    }

    /// See [`EventSender::try_dispatch`]
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::QueueFull`] or [`DispatchError::QueueClosed`].
    pub fn try_dispatch(&self, event: E) -> Result<(), DispatchError> {
        self.sender.try_dispatch(event)
    }

    /// See [`EventSender::flush`]
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::QueueClosed`] if the worker has stopped.
    pub async fn flush(&self) -> Result<(), DispatchError> {
        self.sender.flush().await
    }

    /// Apply every event the queue has accepted, then stop the worker
    ///
    /// Senders obtained from [`EventQueue::sender`] report
    /// [`DispatchError::QueueClosed`] afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::QueueClosed`] if the worker had already
    /// stopped abnormally.
    pub async fn shutdown(self) -> Result<(), DispatchError> {
        tracing::info!("Shutting down event queue");
        // A closed channel means the worker is already gone; the join below
        // reports how it ended.
        let _ = self.sender.sender.send(Command::Shutdown).await;
        self.worker.await.map_err(|error| {
            tracing::error!(%error, "Event queue worker ended abnormally");
            DispatchError::QueueClosed
        })
    }
}

impl<E> fmt::Debug for EventQueue<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("sender", &self.sender)
            .field("finished", &self.worker.is_finished())
            .finish()
    }
}

async fn drain<S, E>(dispatcher: Arc<Dispatcher<S, E>>, mut receiver: mpsc::Receiver<Command<E>>)
where
    S: fmt::Debug + Send + Sync + 'static,
    E: Event,
{
    tracing::debug!("Event queue worker started");

    while let Some(command) = receiver.recv().await {
        match command {
            Command::Dispatch(event) => {
                let name = event.name();
                if let Err(error) = dispatcher.dispatch_sync(event) {
                    // No caller is waiting for this result
                    tracing::error!(event = name, %error, "Queued dispatch failed");
                    DispatchMetrics::record_queue_failure();
                }
            },
            Command::Flush(ack) => {
                let _ = ack.send(());
            },
            // Refuse new sends but keep applying what was accepted before the close
            Command::Shutdown => receiver.close(),
        }
    }

    tracing::debug!("Event queue worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::container::StateContainer;

    #[derive(Debug)]
    enum Op {
        Push(u32),
        Explode,
    }

    impl Event for Op {
        fn name(&self) -> &'static str {
            match self {
                Self::Push(_) => "push",
                Self::Explode => "explode",
            }
        }
    }

    fn recorder(capacity: usize) -> Arc<Dispatcher<Vec<u32>, Op>> {
        let dispatcher = Arc::new(Dispatcher::with_config(
            StateContainer::new(Vec::new()),
            RuntimeConfig::default().with_queue_capacity(capacity),
        ));
        dispatcher.reg_event_db("push", Vec::new(), |seen: &Vec<u32>, op: &Op| {
            let mut next = seen.clone();
            if let Op::Push(n) = op {
                next.push(*n);
            }
            next
        });
        dispatcher
    }

    #[tokio::test]
    async fn test_events_apply_in_submission_order() -> Result<(), DispatchError> {
        let dispatcher = recorder(8);
        let queue = EventQueue::spawn(Arc::clone(&dispatcher));

        for n in 0..100 {
            queue.dispatch(Op::Push(n)).await?;
        }
        queue.flush().await?;

        assert_eq!(*dispatcher.container().get(), (0..100).collect::<Vec<_>>());
        queue.shutdown().await
    }

    #[tokio::test]
    async fn test_failed_event_does_not_stop_the_queue() -> Result<(), DispatchError> {
        let dispatcher = recorder(8);
        let queue = EventQueue::spawn(Arc::clone(&dispatcher));

        queue.dispatch(Op::Push(1)).await?;
        queue.dispatch(Op::Explode).await?;
        queue.dispatch(Op::Push(2)).await?;
        queue.flush().await?;

        assert_eq!(*dispatcher.container().get(), vec![1, 2]);
        queue.shutdown().await
    }

    #[tokio::test]
    async fn test_concurrent_producers_are_serialised() -> Result<(), DispatchError> {
        let dispatcher = recorder(4);
        let queue = EventQueue::spawn(Arc::clone(&dispatcher));

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let sender = queue.sender();
                tokio::spawn(async move {
                    for n in 0..25 {
                        sender.dispatch(Op::Push(p * 100 + n)).await?;
                    }
                    Ok::<(), DispatchError>(())
                })
            })
            .collect();
        for producer in producers {
            producer.await.map_err(|_| DispatchError::QueueClosed)??;
        }
        queue.flush().await?;

        let seen = dispatcher.container().get();
        assert_eq!(seen.len(), 100);
        for p in 0..4 {
            let mine: Vec<u32> = seen.iter().copied().filter(|n| n / 100 == p).collect();
            assert_eq!(mine, (0..25).map(|n| p * 100 + n).collect::<Vec<_>>());
        }
        queue.shutdown().await
    }

    #[tokio::test]
    async fn test_shutdown_drains_then_closes() -> Result<(), DispatchError> {
        let dispatcher = recorder(16);
        let queue = EventQueue::spawn(Arc::clone(&dispatcher));
        let sender = queue.sender();

        sender.dispatch(Op::Push(7)).await?;
        queue.shutdown().await?;

        assert_eq!(*dispatcher.container().get(), vec![7]);
        assert_eq!(sender.dispatch(Op::Push(8)).await, Err(DispatchError::QueueClosed));
        assert_eq!(sender.try_dispatch(Op::Push(8)), Err(DispatchError::QueueClosed));
        Ok(())
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_event_accepted_during_shutdown_is_applied() -> Result<(), DispatchError> {
        let dispatcher = recorder(16);
        let queue = EventQueue::spawn(Arc::clone(&dispatcher));
        let sender = queue.sender();

        sender.dispatch(Op::Push(1)).await?;
        // The late send lands behind the shutdown command, before the worker runs
        let (stopped, late) = tokio::join!(queue.shutdown(), sender.dispatch(Op::Push(2)));
        stopped?;

        assert_eq!(late, Ok(()));
        assert_eq!(*dispatcher.container().get(), vec![1, 2]);
        assert_eq!(sender.dispatch(Op::Push(3)).await, Err(DispatchError::QueueClosed));
        Ok(())
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_try_dispatch_reports_full() -> Result<(), DispatchError> {
        let dispatcher = recorder(1);
        let queue = EventQueue::spawn(Arc::clone(&dispatcher));

        // The worker cannot run until this task yields
        queue.try_dispatch(Op::Push(1))?;
        assert_eq!(queue.try_dispatch(Op::Push(2)), Err(DispatchError::QueueFull));

        queue.flush().await?;
        assert_eq!(*dispatcher.container().get(), vec![1]);
        queue.shutdown().await
    }
}
