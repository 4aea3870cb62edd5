use std::collections::BTreeMap;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::skiplist::error::SkipListError;
use crate::skiplist::SkipList;

// Commands the async facade sends to the background task
enum IndexMessage<K, V> {
    Insert(K, V, oneshot::Sender<bool>),
    Get(K, oneshot::Sender<Option<V>>),
    Remove(K, oneshot::Sender<bool>),
    Range(K, K, oneshot::Sender<BTreeMap<K, V>>),
    Len(oneshot::Sender<usize>),
    Shutdown,
}

/// An async facade over [`SkipList`] using Tokio's async/await
/// architecture. The list lives inside a background worker task; callers
/// talk to it over a command channel, so operations never block the
/// executor even when the underlying calls contend on node locks.
pub struct AsyncSkipList<K, V> {
    sender: mpsc::Sender<IndexMessage<K, V>>,
    worker_task: Option<JoinHandle<()>>,
}

impl<K, V> AsyncSkipList<K, V>
where
    K: Ord + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Create an async skip list sized like [`SkipList::new`].
    ///
    /// The configuration is validated before the worker task is spawned,
    /// so a bad sizing never leaves a task behind.
    pub async fn new(
        expected_elements: usize,
        probability: f64,
    ) -> Result<Self, SkipListError> {
        let list = SkipList::new(expected_elements, probability)?;

        // Create a channel for communication with the worker task
        #[allow(clippy::type_complexity)]
        let (sender, mut receiver): (
            mpsc::Sender<IndexMessage<K, V>>,
            mpsc::Receiver<IndexMessage<K, V>>,
        ) = mpsc::channel(100); // Buffer size of 100 should be sufficient

        // Start the worker task that owns the list and serves commands
        let worker_task = tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                match message {
                    IndexMessage::Insert(key, value, result_sender) => {
                        let _ = result_sender.send(list.insert(key, value));
                    }
                    IndexMessage::Get(key, result_sender) => {
                        let _ = result_sender.send(list.get(&key));
                    }
                    IndexMessage::Remove(key, result_sender) => {
                        let _ = result_sender.send(list.remove(&key));
                    }
                    IndexMessage::Range(start, end, result_sender) => {
                        let _ = result_sender.send(list.range(&start, &end));
                    }
                    IndexMessage::Len(result_sender) => {
                        let _ = result_sender.send(list.len());
                    }
                    IndexMessage::Shutdown => {
                        break;
                    }
                }
            }
        });

        Ok(AsyncSkipList {
            sender,
            worker_task: Some(worker_task),
        })
    }

    /// Insert a key-value pair, returning true if a new entry was created
    pub async fn insert(&self, key: K, value: V) -> Result<bool, SkipListError> {
        let (sender, receiver) = oneshot::channel();
        self.sender
            .send(IndexMessage::Insert(key, value, sender))
            .await
            .map_err(|_| SkipListError::WorkerUnavailable)?;

        receiver.await.map_err(|_| SkipListError::WorkerUnavailable)
    }

    /// Get the value for a key if a live entry holds it
    pub async fn get(&self, key: &K) -> Result<Option<V>, SkipListError> {
        let (sender, receiver) = oneshot::channel();
        self.sender
            .send(IndexMessage::Get(key.clone(), sender))
            .await
            .map_err(|_| SkipListError::WorkerUnavailable)?;

        receiver.await.map_err(|_| SkipListError::WorkerUnavailable)
    }

    /// Remove the entry for a key, returning true if one was removed
    pub async fn remove(&self, key: &K) -> Result<bool, SkipListError> {
        let (sender, receiver) = oneshot::channel();
        self.sender
            .send(IndexMessage::Remove(key.clone(), sender))
            .await
            .map_err(|_| SkipListError::WorkerUnavailable)?;

        receiver.await.map_err(|_| SkipListError::WorkerUnavailable)
    }

    /// Collect all entries with keys in `[start, end]`, ordered by key
    pub async fn range(&self, start: &K, end: &K) -> Result<BTreeMap<K, V>, SkipListError> {
        let (sender, receiver) = oneshot::channel();
        self.sender
            .send(IndexMessage::Range(start.clone(), end.clone(), sender))
            .await
            .map_err(|_| SkipListError::WorkerUnavailable)?;

        receiver.await.map_err(|_| SkipListError::WorkerUnavailable)
    }

    /// Get the number of live entries in the list
    pub async fn len(&self) -> Result<usize, SkipListError> {
        let (sender, receiver) = oneshot::channel();
        self.sender
            .send(IndexMessage::Len(sender))
            .await
            .map_err(|_| SkipListError::WorkerUnavailable)?;

        receiver.await.map_err(|_| SkipListError::WorkerUnavailable)
    }

    /// Check if the list is empty
    pub async fn is_empty(&self) -> Result<bool, SkipListError> {
        Ok(self.len().await? == 0)
    }

    /// Shut down the worker task. Commands sent afterwards fail with
    /// [`SkipListError::WorkerUnavailable`].
    pub async fn shutdown(&self) -> Result<(), SkipListError> {
        // A closed channel means the worker is already gone, which is fine
        let _ = self.sender.send(IndexMessage::Shutdown).await;
        Ok(())
    }
}

impl<K, V> Drop for AsyncSkipList<K, V> {
    fn drop(&mut self) {
        // Take the join handle to ensure the task is dropped when this struct is dropped
        if let Some(handle) = self.worker_task.take() {
            // Since we can't use .await in drop, we need to abort the task
            handle.abort();
        }
    }
}

// Convenience alias for the integer-keyed, string-valued instantiation
pub type AsyncStringSkipList = AsyncSkipList<i64, String>;
