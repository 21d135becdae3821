//! 事件总线门面（EventBus）
//!
//! 把通道管理、发布方与分发方组装在一起，是服务侧唯一需要持有的对象。
//! 同一进程内的发布与订阅共享一个 `ChannelManager`，句柄缓存因此只有一份。
//!
use crate::broker::Broker;
use crate::catalog::{CatalogEvent, EventName};
use crate::channel::{ChannelManager, SubscriptionHandle, TopicHandle};
use crate::config::BusConfig;
use crate::dispatcher::{Dispatcher, Subscription};
use crate::error::BusResult;
use crate::handler::HandlerTable;
use crate::publisher::{Published, Publisher};
use serde_json::Value;
use std::sync::Arc;

pub struct EventBus {
    config: BusConfig,
    channels: Arc<ChannelManager>,
    publisher: Publisher,
    dispatcher: Dispatcher,
}

impl EventBus {
    pub fn new(broker: Arc<dyn Broker>, config: BusConfig) -> Self {
        let channels = Arc::new(ChannelManager::new(broker, &config));
        let publisher = Publisher::new(channels.clone(), config.publish_timeout);
        let dispatcher = Dispatcher::new(channels.clone(), config.max_concurrent_messages);

        Self {
            config,
            channels,
            publisher,
            dispatcher,
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn channels(&self) -> &Arc<ChannelManager> {
        &self.channels
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn ensure_topic(&self, name: &str) -> BusResult<TopicHandle> {
        self.channels.ensure_topic(name).await
    }

    pub async fn ensure_subscription(
        &self,
        topic: &str,
        name: &str,
    ) -> BusResult<SubscriptionHandle> {
        self.channels.ensure_subscription(topic, name).await
    }

    pub async fn publish(
        &self,
        topic: &str,
        name: EventName,
        payload: &Value,
        trace_id: Option<String>,
    ) -> BusResult<Published> {
        self.publisher.publish(topic, name, payload, trace_id).await
    }

    pub async fn publish_event<E: CatalogEvent>(
        &self,
        topic: &str,
        event: &E,
        trace_id: Option<String>,
    ) -> BusResult<Published> {
        self.publisher.publish_event(topic, event, trace_id).await
    }

    pub async fn subscribe(
        &self,
        subscription: &str,
        handlers: HandlerTable,
    ) -> BusResult<Subscription> {
        self.dispatcher.subscribe(subscription, handlers).await
    }

    pub async fn subscribe_to(
        &self,
        topic: &str,
        subscription: &str,
        handlers: HandlerTable,
    ) -> BusResult<Subscription> {
        self.dispatcher
            .subscribe_to(topic, subscription, handlers)
            .await
    }
}
