use skiplane::{AsyncSkipList, AsyncStringSkipList, SkipListError};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[tokio::test]
async fn test_async_basic_operations() {
    let list = AsyncStringSkipList::new(128, 0.5).await.unwrap();

    assert!(list.is_empty().await.unwrap());
    assert!(list.insert(1, "one".to_string()).await.unwrap());
    assert!(list.insert(2, "two".to_string()).await.unwrap());
    assert!(!list.insert(1, "uno".to_string()).await.unwrap());

    assert_eq!(list.get(&1).await.unwrap(), Some("one".to_string()));
    assert_eq!(list.get(&2).await.unwrap(), Some("two".to_string()));
    assert_eq!(list.get(&3).await.unwrap(), None);
    assert_eq!(list.len().await.unwrap(), 2);

    assert!(list.remove(&1).await.unwrap());
    assert!(!list.remove(&1).await.unwrap());
    assert_eq!(list.get(&1).await.unwrap(), None);
    assert_eq!(list.len().await.unwrap(), 1);
}

#[tokio::test]
async fn test_async_rejects_bad_configuration() {
    let result = AsyncStringSkipList::new(0, 0.5).await;
    assert_eq!(
        result.err(),
        Some(SkipListError::InvalidExpectedElements(0))
    );

    let result = AsyncStringSkipList::new(128, 1.0).await;
    assert!(matches!(
        result.err(),
        Some(SkipListError::InvalidProbability(_))
    ));
}

#[tokio::test]
async fn test_async_range_window() {
    let list = AsyncStringSkipList::new(128, 0.5).await.unwrap();
    for key in 1..=20 {
        list.insert(key, key.to_string()).await.unwrap();
    }

    let window = list.range(&5, &10).await.unwrap();
    assert_eq!(
        window.keys().copied().collect::<Vec<_>>(),
        vec![5, 6, 7, 8, 9, 10]
    );
    assert!(list.range(&15, &12).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_async_concurrent_tasks() {
    let list = Arc::new(AsyncStringSkipList::new(2048, 0.5).await.unwrap());
    let task_count = 8;
    let keys_per_task = 100i64;

    let mut handles = vec![];
    for task_id in 0..task_count {
        let list_clone = Arc::clone(&list);
        let handle = tokio::spawn(async move {
            let base = task_id as i64 * keys_per_task;
            for offset in 0..keys_per_task {
                let key = base + offset;
                assert!(list_clone.insert(key, key.to_string()).await.unwrap());
            }
        });
        handles.push(handle);
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let total = task_count as i64 * keys_per_task;
    assert_eq!(list.len().await.unwrap(), total as usize);
    for key in [0, 99, 100, 417, total - 1] {
        assert_eq!(
            list.get(&key).await.unwrap(),
            Some(key.to_string()),
            "Key {} missing after concurrent task inserts",
            key
        );
    }
}

#[tokio::test]
async fn test_async_shutdown_rejects_later_commands() {
    let list = AsyncStringSkipList::new(128, 0.5).await.unwrap();
    list.insert(1, "one".to_string()).await.unwrap();

    list.shutdown().await.unwrap();

    // Every command after shutdown reports the worker as gone.
    assert_eq!(
        list.insert(2, "two".to_string()).await,
        Err(SkipListError::WorkerUnavailable)
    );
    assert_eq!(list.get(&1).await, Err(SkipListError::WorkerUnavailable));
    assert_eq!(list.remove(&1).await, Err(SkipListError::WorkerUnavailable));
    assert_eq!(list.len().await, Err(SkipListError::WorkerUnavailable));

    // A repeated shutdown is harmless.
    assert!(list.shutdown().await.is_ok());
}

#[tokio::test]
async fn test_async_operations_complete_promptly() {
    let list = AsyncSkipList::<i64, i64>::new(128, 0.5).await.unwrap();

    let result = timeout(Duration::from_secs(5), async {
        for key in 0..200 {
            list.insert(key, key * 2).await.unwrap();
        }
        list.len().await.unwrap()
    })
    .await;

    assert_eq!(result.expect("async operations timed out"), 200);
}
