//! 通道管理（ChannelManager）
//!
//! 按名称惰性创建并缓存主题/订阅句柄，首次使用前确保中间件侧资源存在
//! （不存在则创建）。缓存只追加不淘汰；同名的并发调用共享同一个
//! 初始化过程，因此至多触发一次底层创建。初始化失败不会写入缓存，
//! 之后的调用会重新尝试。
//!
//! 每个进程持有一个实例，由发布方与分发方共享引用，而不是全局变量。
//!
use crate::broker::Broker;
use crate::config::BusConfig;
use crate::error::{BusError, BusResult};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicHandle {
    name: String,
    path: String,
}

impl TopicHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 带项目前缀的完整资源路径；未配置项目时等同于名称
    pub fn path(&self) -> &str {
        &self.path
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    name: String,
    /// 仅在通过 `ensure_subscription` 建立时已知
    topic: Option<String>,
    path: String,
}

impl SubscriptionHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

pub struct ChannelManager {
    broker: Arc<dyn Broker>,
    project_id: Option<String>,
    topics: DashMap<String, Arc<OnceCell<TopicHandle>>>,
    subscriptions: DashMap<String, Arc<OnceCell<SubscriptionHandle>>>,
}

impl ChannelManager {
    pub fn new(broker: Arc<dyn Broker>, config: &BusConfig) -> Self {
        Self {
            broker,
            project_id: config.project_id.clone(),
            topics: DashMap::new(),
            subscriptions: DashMap::new(),
        }
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    /// 确保主题存在并返回缓存的句柄（幂等）
    pub async fn ensure_topic(&self, name: &str) -> BusResult<TopicHandle> {
        let cell = self.topics.entry(name.to_string()).or_default().clone();
        let handle = cell
            .get_or_try_init(|| async {
                if !self.broker.topic_exists(name).await? {
                    self.broker.create_topic(name).await?;
                    info!(topic = name, "topic created");
                }
                Ok::<_, BusError>(TopicHandle {
                    name: name.to_string(),
                    path: self.resource_path("topics", name),
                })
            })
            .await?;
        Ok(handle.clone())
    }

    /// 先确保主题，再确保绑定在该主题上的订阅存在（幂等）
    ///
    /// 同名订阅已缓存时直接返回缓存的句柄，其 `topic()` 可能与本次请求不同（会记录告警）。
    pub async fn ensure_subscription(
        &self,
        topic: &str,
        name: &str,
    ) -> BusResult<SubscriptionHandle> {
        self.ensure_topic(topic).await?;

        let cell = self.subscriptions.entry(name.to_string()).or_default().clone();
        let handle = cell
            .get_or_try_init(|| async {
                if !self.broker.subscription_exists(name).await? {
                    self.broker.create_subscription(topic, name).await?;
                    info!(topic, subscription = name, "subscription created");
                }
                Ok::<_, BusError>(SubscriptionHandle {
                    name: name.to_string(),
                    topic: Some(topic.to_string()),
                    path: self.resource_path("subscriptions", name),
                })
            })
            .await?;

        // 订阅一经建立不会改绑，缓存中的绑定优先
        if handle.topic() != Some(topic) {
            warn!(
                subscription = name,
                requested_topic = topic,
                bound_topic = handle.topic(),
                "subscription binding differs from requested topic, keeping existing binding"
            );
        }
        Ok(handle.clone())
    }

    /// 按名称解析已存在的订阅：命中缓存直接返回，否则向中间件确认存在性。
    /// 不会创建订阅，不存在时返回 `SubscriptionNotFound`。
    pub async fn resolve_subscription(&self, name: &str) -> BusResult<SubscriptionHandle> {
        let cell = self.subscriptions.entry(name.to_string()).or_default().clone();
        let handle = cell
            .get_or_try_init(|| async {
                if !self.broker.subscription_exists(name).await? {
                    return Err(BusError::SubscriptionNotFound {
                        name: name.to_string(),
                    });
                }
                debug!(subscription = name, "subscription resolved");
                Ok(SubscriptionHandle {
                    name: name.to_string(),
                    topic: None,
                    path: self.resource_path("subscriptions", name),
                })
            })
            .await?;
        Ok(handle.clone())
    }

    fn resource_path(&self, kind: &str, name: &str) -> String {
        match &self.project_id {
            Some(project) => format!("projects/{project}/{kind}/{name}"),
            None => name.to_string(),
        }
    }
}
