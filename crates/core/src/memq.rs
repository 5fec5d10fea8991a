//! A bounded in-memory queue bridging blocking and async code.
//!
//! Producers and consumers may sit on either side: [`MemQueue::publish`] and
//! [`MemQueue::consume`] block the calling thread, [`MemQueue::aio_publish`] and
//! [`MemQueue::aio_consume`] await. Consumption stops after [`MemQueue::close`], or once
//! the consumer has started and every [`MemPublisher`] is dropped.
//!
//! ```rust
//! use yali_core::memq::MemQueue;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), yali_core::CoreError> {
//! let queue = MemQueue::<u32>::new(16)?;
//! queue.aio_publish(1).await?;
//! queue.aio_publish(2).await?;
//! queue.close().await?;
//!
//! let mut seen = Vec::new();
//! queue
//!     .aio_consume(|item| {
//!         seen.push(item);
//!         async { Ok::<_, std::convert::Infallible>(()) }
//!     })
//!     .await;
//! assert_eq!(seen, vec![1, 2]);
//! # Ok(())
//! # }
//! ```

use crate::error::CoreError;
use parking_lot::Mutex as SyncMutex;
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error};

#[derive(Debug)]
enum QueueItem<T> {
    Data(T),
    Break,
}

/// A cloneable producer side of a [`MemQueue`].
#[derive(Debug)]
pub struct MemPublisher<T> {
    tx: mpsc::Sender<QueueItem<T>>,
}

impl<T> Clone for MemPublisher<T> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

fn closed_error() -> CoreError {
    CoreError::Internal { message: "Queue is closed".into(), context: None }
}

impl<T> MemPublisher<T> {
    /// Blocks until there is room for `item`. Must not be called from async code.
    pub fn publish(&self, item: T) -> Result<(), CoreError> {
        self.tx.blocking_send(QueueItem::Data(item)).map_err(|_| closed_error())
    }

    pub async fn aio_publish(&self, item: T) -> Result<(), CoreError> {
        self.tx.send(QueueItem::Data(item)).await.map_err(|_| closed_error())
    }
}

/// A bounded multi-producer, single-consumer queue.
///
/// The queue keeps its own sender only until a consumer starts. From then on the channel
/// stays open for as long as some [`MemPublisher`] is alive.
#[derive(Debug)]
pub struct MemQueue<T> {
    own_tx: SyncMutex<Option<mpsc::Sender<QueueItem<T>>>>,
    weak_tx: mpsc::WeakSender<QueueItem<T>>,
    rx: Arc<Mutex<mpsc::Receiver<QueueItem<T>>>>,
}

impl<T: Send + 'static> MemQueue<T> {
    /// # Errors
    /// Returns [`CoreError::Validation`] when `max_queue_size` is zero.
    pub fn new(max_queue_size: usize) -> Result<Self, CoreError> {
        if max_queue_size == 0 {
            return Err(CoreError::validation("max_queue_size must be greater than zero"));
        }
        let (tx, rx) = mpsc::channel(max_queue_size);
        Ok(Self {
            weak_tx: tx.downgrade(),
            own_tx: SyncMutex::new(Some(tx)),
            rx: Arc::new(Mutex::new(rx)),
        })
    }

    fn sender(&self) -> Result<mpsc::Sender<QueueItem<T>>, CoreError> {
        if let Some(tx) = self.own_tx.lock().as_ref() {
            return Ok(tx.clone());
        }
        self.weak_tx.upgrade().ok_or_else(closed_error)
    }

    /// Drops the queue's own sender so the channel closes with the last publisher.
    fn release(&self) {
        self.own_tx.lock().take();
    }

    /// A new producer handle.
    ///
    /// # Errors
    /// Fails once a consumer has started and every earlier publisher is gone.
    pub fn publisher(&self) -> Result<MemPublisher<T>, CoreError> {
        self.sender().map(|tx| MemPublisher { tx })
    }

    /// Blocks until there is room for `item`. Must not be called from async code.
    pub fn publish(&self, item: T) -> Result<(), CoreError> {
        self.publisher()?.publish(item)
    }

    pub async fn aio_publish(&self, item: T) -> Result<(), CoreError> {
        self.publisher()?.aio_publish(item).await
    }

    /// Enqueues the break marker; consumers stop once they reach it.
    pub async fn close(&self) -> Result<(), CoreError> {
        self.sender()?.send(QueueItem::Break).await.map_err(|_| closed_error())
    }

    /// Blocking variant of [`MemQueue::close`].
    pub fn close_blocking(&self) -> Result<(), CoreError> {
        self.sender()?.blocking_send(QueueItem::Break).map_err(|_| closed_error())
    }

    /// Feeds items to `consumer` on the current thread until the queue is closed or every
    /// publisher is dropped.
    ///
    /// Consumer errors are logged and do not stop the loop. Must not be called from async code.
    pub fn consume<E: Display>(&self, mut consumer: impl FnMut(T) -> Result<(), E>) {
        let mut rx = self.rx.blocking_lock();
        self.release();
        while let Some(QueueItem::Data(item)) = rx.blocking_recv() {
            if let Err(e) = consumer(item) {
                error!(error = %e, "Unhandled error while consuming message");
            }
        }
        debug!("Queue consumer stopped");
    }

    /// Async variant of [`MemQueue::consume`].
    pub async fn aio_consume<E, F, Fut>(&self, mut consumer: F)
    where
        E: Display,
        F: FnMut(T) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        let mut rx = self.rx.lock().await;
        self.release();
        while let Some(QueueItem::Data(item)) = rx.recv().await {
            if let Err(e) = consumer(item).await {
                error!(error = %e, "Unhandled error while consuming message");
            }
        }
        debug!("Queue consumer stopped");
    }

    /// Runs a blocking producer on the blocking thread pool.
    ///
    /// The task error, if any, is logged and the handle resolves to `None`.
    ///
    /// # Errors
    /// Fails when no publisher can be handed out, see [`MemQueue::publisher`].
    pub fn run_task<R, E, F>(&self, task: F) -> Result<JoinHandle<Option<R>>, CoreError>
    where
        R: Send + 'static,
        E: Display,
        F: FnOnce(MemPublisher<T>) -> Result<R, E> + Send + 'static,
    {
        let publisher = self.publisher()?;
        Ok(tokio::task::spawn_blocking(move || {
            task(publisher).map_err(|e| error!(error = %e, "Queue task failed")).ok()
        }))
    }

    /// Awaits an async producer, logging its error.
    pub async fn run_aio_task<R, E, F, Fut>(&self, task: F) -> Option<R>
    where
        E: Display,
        F: FnOnce(MemPublisher<T>) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let publisher = self.publisher().map_err(|e| error!(error = %e, "Queue task not started")).ok()?;
        task(publisher).await.map_err(|e| error!(error = %e, "Queue task failed")).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(MemQueue::<u8>::new(0).is_err());
    }

    #[test]
    fn test_blocking_consume_skips_failed_items() {
        let queue = MemQueue::<u32>::new(8).unwrap();
        let publisher = queue.publisher().unwrap();

        let producer = std::thread::spawn(move || {
            for i in 0..5 {
                publisher.publish(i).unwrap();
            }
        });
        producer.join().unwrap();
        queue.close_blocking().unwrap();

        let mut seen = Vec::new();
        queue.consume(|item| {
            if item == 2 {
                return Err("rejected");
            }
            seen.push(item);
            Ok(())
        });
        assert_eq!(seen, vec![0, 1, 3, 4]);
    }

    #[test]
    fn test_consume_ends_when_publishers_are_dropped() {
        let queue = Arc::new(MemQueue::<u32>::new(4).unwrap());
        let publisher = queue.publisher().unwrap();
        publisher.publish(1).unwrap();
        drop(publisher);

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let consumer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                let mut seen = Vec::new();
                queue.consume(|item| {
                    seen.push(item);
                    Ok::<_, CoreError>(())
                });
                done_tx.send(seen).unwrap();
            })
        };

        let seen = done_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        consumer.join().unwrap();
        assert_eq!(seen, vec![1]);
        assert!(queue.publisher().is_err());
        assert!(queue.publish(2).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_task_feeds_async_consumer() {
        let queue = Arc::new(MemQueue::<String>::new(4).unwrap());
        let total = Arc::new(AtomicUsize::new(0));
        let keepalive = queue.publisher().unwrap();

        let consumer = {
            let queue = Arc::clone(&queue);
            let total = Arc::clone(&total);
            tokio::spawn(async move {
                queue
                    .aio_consume(|item: String| {
                        let total = Arc::clone(&total);
                        async move {
                            total.fetch_add(item.len(), Ordering::SeqCst);
                            Ok::<_, CoreError>(())
                        }
                    })
                    .await;
            })
        };

        let produced = queue
            .run_task(|publisher| {
                for word in ["alpha", "beta", "gamma"] {
                    publisher.publish(word.to_owned())?;
                }
                Ok::<_, CoreError>(3)
            })
            .unwrap()
            .await
            .unwrap();
        assert_eq!(produced, Some(3));

        let failed = queue.run_aio_task(|_| async { Err::<(), _>("no input") }).await;
        assert!(failed.is_none());

        drop(keepalive);
        tokio::time::timeout(Duration::from_secs(2), consumer).await.unwrap().unwrap();
        assert_eq!(total.load(Ordering::SeqCst), "alphabetagamma".len());
    }
}
