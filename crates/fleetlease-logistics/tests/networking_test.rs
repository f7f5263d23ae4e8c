use bytes::Bytes;
use fleetlease_logistics::{InMemoryHub, RecvError, Transport};
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test]
async fn test_broadcast_reaches_every_subscriber() {
    let hub = InMemoryHub::new();
    let node_a = hub.join("GPU_REQUEST").await.expect("join failed");
    let node_b = hub.clone().join("GPU_REQUEST").await.expect("join failed");

    let mut sub_a = node_a.subscribe().unwrap();
    let mut sub_b = node_b.subscribe().unwrap();

    node_a.publish(Bytes::from_static(b"hello fleet")).await.unwrap();

    assert_eq!(sub_a.next(None).await.unwrap(), &b"hello fleet"[..]);
    assert_eq!(sub_b.next(None).await.unwrap(), &b"hello fleet"[..]);
}

#[tokio::test]
async fn test_topics_are_isolated() {
    let hub = InMemoryHub::new();
    let requests = hub.join("GPU_REQUEST").await.unwrap();
    let fulfillments = hub.join("GPU_FULFILLMENT").await.unwrap();

    let mut sub = fulfillments.subscribe().unwrap();
    requests.publish(Bytes::from_static(b"req")).await.unwrap();

    let deadline = Instant::now() + Duration::from_millis(20);
    assert_eq!(sub.next(Some(deadline)).await, Err(RecvError::Timeout));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_is_honoured() {
    let hub = InMemoryHub::new();
    let topic = hub.join("t").await.unwrap();
    let mut sub = topic.subscribe().unwrap();

    let start = Instant::now();
    let result = sub.next(Some(start + Duration::from_millis(500))).await;

    assert_eq!(result, Err(RecvError::Timeout));
    assert_eq!(start.elapsed(), Duration::from_millis(500));
}

#[tokio::test]
async fn test_subscription_only_sees_later_messages() {
    let hub = InMemoryHub::new();
    let topic = hub.join("t").await.unwrap();

    topic.publish(Bytes::from_static(b"early")).await.unwrap();
    let mut sub = topic.subscribe().unwrap();
    topic.publish(Bytes::from_static(b"late")).await.unwrap();

    assert_eq!(sub.next(None).await.unwrap(), &b"late"[..]);
}

#[tokio::test]
async fn test_redelivery_duplicates_payloads() {
    let hub = InMemoryHub::with_redelivery(2);
    let topic = hub.join("t").await.unwrap();
    let mut sub = topic.subscribe().unwrap();

    topic.publish(Bytes::from_static(b"once")).await.unwrap();

    assert_eq!(sub.next(None).await.unwrap(), &b"once"[..]);
    assert_eq!(sub.next(None).await.unwrap(), &b"once"[..]);
}

#[tokio::test]
async fn test_lagging_subscriber_is_told_how_far_behind() {
    let hub = InMemoryHub::with_capacity(2);
    let topic = hub.join("t").await.unwrap();
    let mut sub = topic.subscribe().unwrap();

    for i in 0..5u8 {
        topic.publish(Bytes::from(vec![i])).await.unwrap();
    }

    assert_eq!(sub.next(None).await, Err(RecvError::Lagged(3)));
    assert_eq!(sub.next(None).await.unwrap(), &[3u8][..]);
}

#[tokio::test]
async fn test_empty_topic_name_is_rejected() {
    let hub = InMemoryHub::new();
    assert!(hub.join("").await.is_err());
}
