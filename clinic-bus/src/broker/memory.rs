//! 内存版消息中间件（MemoryBroker）
//!
//! 满足 `Broker` 协议的进程内实现，语义尽量贴近托管的发布/订阅服务：
//! - 主题向其绑定的每个订阅扇出；同一订阅的多个拉取方共享一个队列；
//! - 发布到没有订阅的主题时，消息被丢弃；
//! - `nack` 会把消息重新入队并将投递次数加一（可配置重投延迟）；
//! - 既未 `ack` 也未 `nack` 就被丢弃的消息按确认期限到期处理，同样重新入队；
//! - 典型用途：测试环境、示例与本地开发。
//!
//! 另外提供计数器与不可用开关，便于在测试中观察创建次数与 ack/nack。
use super::{AckReply, Broker, InboundMessage, OutboundMessage};
use crate::error::{BusError, BusResult};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_core::stream::BoxStream;
use futures_util::stream;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};

#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    topics: DashMap<String, Vec<Arc<SubscriptionQueue>>>,
    subscriptions: DashMap<String, Arc<SubscriptionQueue>>,
    next_message_id: AtomicU64,
    unavailable: AtomicBool,
    publish_latency_ms: AtomicU64,
    redelivery_delay: Duration,
    topic_creations: AtomicUsize,
    subscription_creations: AtomicUsize,
    published: AtomicUsize,
}

struct SubscriptionQueue {
    tx: mpsc::UnboundedSender<Pending>,
    rx: Mutex<mpsc::UnboundedReceiver<Pending>>,
    acked: AtomicUsize,
    nacked: AtomicUsize,
}

impl SubscriptionQueue {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            acked: AtomicUsize::new(0),
            nacked: AtomicUsize::new(0),
        }
    }

    fn enqueue(&self, pending: Pending) {
        // 队列自身持有接收端，发送不会失败
        let _ = self.tx.send(pending);
    }
}

#[derive(Clone)]
struct Pending {
    message_id: String,
    data: Vec<u8>,
    attributes: HashMap<String, String>,
    attempt: u32,
}

/// 一次投递的应答；`pending` 在应答后被取走，未应答就被丢弃时视为确认期限到期
struct MemoryReply {
    pending: Option<Pending>,
    queue: Arc<SubscriptionQueue>,
    redelivery_delay: Duration,
}

impl MemoryReply {
    fn redeliver(&mut self) {
        let Some(mut pending) = self.pending.take() else {
            return;
        };
        pending.attempt += 1;

        let queue = self.queue.clone();
        let delay = self.redelivery_delay;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) if !delay.is_zero() => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    queue.enqueue(pending);
                });
            }
            _ => queue.enqueue(pending),
        }
    }
}

impl AckReply for MemoryReply {
    fn ack(mut self: Box<Self>) {
        if self.pending.take().is_some() {
            self.queue.acked.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn nack(mut self: Box<Self>) {
        self.queue.nacked.fetch_add(1, Ordering::Relaxed);
        self.redeliver();
    }
}

impl Drop for MemoryReply {
    fn drop(&mut self) {
        self.redeliver();
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// `nack` 后延迟 `delay` 再重新入队
    pub fn with_redelivery_delay(delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                redelivery_delay: delay,
                ..Default::default()
            }),
        }
    }

    /// 模拟网络/鉴权故障：开启后所有调用返回 `BrokerUnavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// 模拟发布确认的延迟
    pub fn set_publish_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.inner.publish_latency_ms.store(ms, Ordering::SeqCst);
    }

    pub fn topic_creations(&self) -> usize {
        self.inner.topic_creations.load(Ordering::SeqCst)
    }

    pub fn subscription_creations(&self) -> usize {
        self.inner.subscription_creations.load(Ordering::SeqCst)
    }

    pub fn published(&self) -> usize {
        self.inner.published.load(Ordering::SeqCst)
    }

    pub fn acked(&self, subscription: &str) -> usize {
        self.inner
            .subscriptions
            .get(subscription)
            .map_or(0, |q| q.acked.load(Ordering::SeqCst))
    }

    pub fn nacked(&self, subscription: &str) -> usize {
        self.inner
            .subscriptions
            .get(subscription)
            .map_or(0, |q| q.nacked.load(Ordering::SeqCst))
    }

    /// 直接向订阅注入一条原始消息（绕过发布方的校验），用于模拟损坏或异常的生产者
    pub fn inject(
        &self,
        subscription: &str,
        data: Vec<u8>,
        attributes: HashMap<String, String>,
    ) -> BusResult<String> {
        let queue = self.queue(subscription)?;
        let message_id = self.next_message_id();
        queue.enqueue(Pending {
            message_id: message_id.clone(),
            data,
            attributes,
            attempt: 1,
        });
        Ok(message_id)
    }

    fn check_available(&self) -> BusResult<()> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            Err(BusError::broker_unavailable("memory broker marked unavailable"))
        } else {
            Ok(())
        }
    }

    fn next_message_id(&self) -> String {
        (self.inner.next_message_id.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn queue(&self, subscription: &str) -> BusResult<Arc<SubscriptionQueue>> {
        self.inner
            .subscriptions
            .get(subscription)
            .map(|q| q.clone())
            .ok_or_else(|| BusError::SubscriptionNotFound {
                name: subscription.to_string(),
            })
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn topic_exists(&self, topic: &str) -> BusResult<bool> {
        self.check_available()?;
        Ok(self.inner.topics.contains_key(topic))
    }

    async fn create_topic(&self, topic: &str) -> BusResult<()> {
        self.check_available()?;
        self.inner.topics.entry(topic.to_string()).or_insert_with(|| {
            self.inner.topic_creations.fetch_add(1, Ordering::SeqCst);
            Vec::new()
        });
        Ok(())
    }

    async fn subscription_exists(&self, subscription: &str) -> BusResult<bool> {
        self.check_available()?;
        Ok(self.inner.subscriptions.contains_key(subscription))
    }

    async fn create_subscription(&self, topic: &str, subscription: &str) -> BusResult<()> {
        self.check_available()?;
        if !self.inner.topics.contains_key(topic) {
            return Err(BusError::TopicNotFound {
                name: topic.to_string(),
            });
        }

        let entry = self.inner.subscriptions.entry(subscription.to_string());
        if let Entry::Vacant(vacant) = entry {
            let queue = Arc::new(SubscriptionQueue::new());
            vacant.insert(queue.clone());
            if let Some(mut bound) = self.inner.topics.get_mut(topic) {
                bound.push(queue);
            }
            self.inner
                .subscription_creations
                .fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, message: OutboundMessage) -> BusResult<String> {
        self.check_available()?;

        let latency = self.inner.publish_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        let bound = self
            .inner
            .topics
            .get(topic)
            .map(|b| b.clone())
            .ok_or_else(|| BusError::TopicNotFound {
                name: topic.to_string(),
            })?;

        let message_id = self.next_message_id();
        for queue in bound {
            queue.enqueue(Pending {
                message_id: message_id.clone(),
                data: message.data.clone(),
                attributes: message.attributes.clone(),
                attempt: 1,
            });
        }
        self.inner.published.fetch_add(1, Ordering::SeqCst);
        Ok(message_id)
    }

    async fn pull(
        &self,
        subscription: &str,
    ) -> BusResult<BoxStream<'static, BusResult<InboundMessage>>> {
        self.check_available()?;
        let queue = self.queue(subscription)?;
        let redelivery_delay = self.inner.redelivery_delay;

        let deliveries = stream::unfold(queue, move |queue| async move {
            let pending = queue.rx.lock().await.recv().await?;
            let message = InboundMessage::new(
                pending.message_id.clone(),
                pending.data.clone(),
                pending.attributes.clone(),
                pending.attempt,
                Box::new(MemoryReply {
                    pending: Some(pending),
                    queue: queue.clone(),
                    redelivery_delay,
                }),
            );
            Some((Ok::<_, BusError>(message), queue))
        });
        Ok(Box::pin(deliveries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn creation_is_idempotent_and_counted_once() {
        let broker = MemoryBroker::new();
        broker.create_topic("t").await.unwrap();
        broker.create_topic("t").await.unwrap();
        broker.create_subscription("t", "s").await.unwrap();
        broker.create_subscription("t", "s").await.unwrap();

        assert_eq!(broker.topic_creations(), 1);
        assert_eq!(broker.subscription_creations(), 1);
        assert!(broker.topic_exists("t").await.unwrap());
        assert!(broker.subscription_exists("s").await.unwrap());
    }

    #[tokio::test]
    async fn subscription_requires_existing_topic() {
        let broker = MemoryBroker::new();
        let err = broker.create_subscription("missing", "s").await.unwrap_err();
        assert!(matches!(err, BusError::TopicNotFound { .. }));
    }

    #[tokio::test]
    async fn publish_fans_out_and_nack_redelivers() {
        let broker = MemoryBroker::new();
        broker.create_topic("t").await.unwrap();
        broker.create_subscription("t", "a").await.unwrap();
        broker.create_subscription("t", "b").await.unwrap();

        let id = broker
            .publish("t", OutboundMessage::new(b"hi".to_vec()).with_attribute("k", "v"))
            .await
            .unwrap();

        let mut a = broker.pull("a").await.unwrap();
        let mut b = broker.pull("b").await.unwrap();

        let first = a.next().await.unwrap().unwrap();
        assert_eq!(first.message_id(), id);
        assert_eq!(first.attribute("k"), Some("v"));
        assert_eq!(first.delivery_attempt(), 1);
        first.nack();

        let again = a.next().await.unwrap().unwrap();
        assert_eq!(again.message_id(), id);
        assert_eq!(again.delivery_attempt(), 2);
        again.ack();

        b.next().await.unwrap().unwrap().ack();

        assert_eq!(broker.nacked("a"), 1);
        assert_eq!(broker.acked("a"), 1);
        assert_eq!(broker.acked("b"), 1);
    }

    #[tokio::test]
    async fn unavailable_broker_fails_every_call() {
        let broker = MemoryBroker::new();
        broker.set_unavailable(true);

        let err = broker.topic_exists("t").await.unwrap_err();
        assert!(matches!(err, BusError::BrokerUnavailable { .. }));
        assert!(broker.create_topic("t").await.is_err());

        broker.set_unavailable(false);
        assert!(broker.create_topic("t").await.is_ok());
    }

    #[tokio::test]
    async fn message_dropped_without_reply_is_redelivered() {
        let broker = MemoryBroker::new();
        broker.create_topic("t").await.unwrap();
        broker.create_subscription("t", "s").await.unwrap();
        let id = broker.inject("s", b"x".to_vec(), HashMap::new()).unwrap();

        let mut deliveries = broker.pull("s").await.unwrap();
        let first = deliveries.next().await.unwrap().unwrap();
        drop(first);

        let again = deliveries.next().await.unwrap().unwrap();
        assert_eq!(again.message_id(), id);
        assert_eq!(again.delivery_attempt(), 2);
        again.ack();

        assert_eq!(broker.acked("s"), 1);
        assert_eq!(broker.nacked("s"), 0);
    }
}
