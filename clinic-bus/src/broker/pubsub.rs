//! Google Cloud Pub/Sub 中间件（需启用 `pubsub` 特性）
//!
//! - 配置了 `emulator_host` 时连接本地模拟器，不做鉴权；
//!   项目缺省为 `local-project`，与模拟器的惯例一致；
//! - 否则使用应用默认凭据（ADC），`project_id` 未配置时由凭据推断；
//! - 连接、鉴权与 gRPC 错误统一映射为 `BrokerUnavailable`；
//! - 创建主题/订阅时的 `AlreadyExists` 视为成功，保持创建的幂等语义；
//! - `ack`/`nack` 在后台任务中完成，失败只记录日志，消息会在确认期限后重投。
//!
use super::{AckReply, Broker, InboundMessage, OutboundMessage};
use crate::config::BusConfig;
use crate::error::{BusError, BusResult};
use async_trait::async_trait;
use dashmap::DashMap;
use futures_core::stream::BoxStream;
use futures_util::StreamExt;
use google_cloud_gax::conn::Environment;
use google_cloud_gax::grpc::{Code, Status};
use google_cloud_googleapis::pubsub::v1::PubsubMessage;
use google_cloud_pubsub::client::{Client, ClientConfig};
use google_cloud_pubsub::publisher::Publisher;
use google_cloud_pubsub::subscriber::ReceivedMessage;
use google_cloud_pubsub::subscription::SubscriptionConfig;
use std::future::Future;
use tracing::{debug, info, warn};

const EMULATOR_PROJECT: &str = "local-project";

pub struct PubSubBroker {
    client: Client,
    publishers: DashMap<String, Publisher>,
}

impl PubSubBroker {
    pub async fn connect(config: &BusConfig) -> BusResult<Self> {
        let mut client_config = ClientConfig::default();

        match &config.emulator_host {
            Some(host) => {
                client_config.environment = Environment::Emulator(host.clone());
                client_config.project_id = Some(
                    config
                        .project_id
                        .clone()
                        .unwrap_or_else(|| EMULATOR_PROJECT.to_string()),
                );
            }
            None => {
                client_config = client_config
                    .with_auth()
                    .await
                    .map_err(|e| BusError::broker_unavailable(format!("authentication: {e}")))?;
                if let Some(project) = &config.project_id {
                    client_config.project_id = Some(project.clone());
                }
            }
        }

        let project = client_config.project_id.clone();
        let client = Client::new(client_config)
            .await
            .map_err(|e| BusError::broker_unavailable(format!("connect: {e}")))?;

        info!(
            project = project.as_deref(),
            emulator = config.emulator_host.as_deref(),
            "pubsub client connected"
        );
        Ok(Self {
            client,
            publishers: DashMap::new(),
        })
    }

    /// 刷新并关闭所有发布通道
    pub async fn shutdown(&self) {
        let publishers: Vec<Publisher> = self
            .publishers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        self.publishers.clear();

        for mut publisher in publishers {
            publisher.shutdown().await;
        }
    }

    fn publisher(&self, topic: &str) -> Publisher {
        self.publishers
            .entry(topic.to_string())
            .or_insert_with(|| self.client.topic(topic).new_publisher(None))
            .clone()
    }
}

fn unavailable(status: Status) -> BusError {
    BusError::broker_unavailable(status.to_string())
}

fn ignore_already_exists(result: Result<(), Status>) -> BusResult<()> {
    match result {
        Err(status) if status.code() == Code::AlreadyExists => Ok(()),
        other => other.map_err(unavailable),
    }
}

#[async_trait]
impl Broker for PubSubBroker {
    async fn topic_exists(&self, topic: &str) -> BusResult<bool> {
        self.client
            .topic(topic)
            .exists(None)
            .await
            .map_err(unavailable)
    }

    async fn create_topic(&self, topic: &str) -> BusResult<()> {
        ignore_already_exists(self.client.topic(topic).create(None, None).await)
    }

    async fn subscription_exists(&self, subscription: &str) -> BusResult<bool> {
        self.client
            .subscription(subscription)
            .exists(None)
            .await
            .map_err(unavailable)
    }

    async fn create_subscription(&self, topic: &str, subscription: &str) -> BusResult<()> {
        let bound = self.client.topic(topic);
        if !bound.exists(None).await.map_err(unavailable)? {
            return Err(BusError::TopicNotFound {
                name: topic.to_string(),
            });
        }

        let created = self
            .client
            .subscription(subscription)
            .create(bound.fully_qualified_name(), SubscriptionConfig::default(), None)
            .await;
        ignore_already_exists(created)
    }

    async fn publish(&self, topic: &str, message: OutboundMessage) -> BusResult<String> {
        let message = PubsubMessage {
            data: message.data,
            attributes: message.attributes,
            ..Default::default()
        };

        let awaiter = self.publisher(topic).publish(message).await;
        let delivery_id = awaiter.get().await.map_err(unavailable)?;
        debug!(topic, delivery_id = %delivery_id, "pubsub message accepted");
        Ok(delivery_id)
    }

    async fn pull(
        &self,
        subscription: &str,
    ) -> BusResult<BoxStream<'static, BusResult<InboundMessage>>> {
        let deliveries = self
            .client
            .subscription(subscription)
            .subscribe(None)
            .await
            .map_err(unavailable)?;

        Ok(deliveries.map(|received| Ok(inbound(received))).boxed())
    }
}

fn inbound(received: ReceivedMessage) -> InboundMessage {
    let message_id = received.message.message_id.clone();
    let data = received.message.data.clone();
    let attributes = received.message.attributes.clone();
    // 未配置死信策略时服务端不回报投递次数
    let attempt = received
        .delivery_attempt()
        .map_or(1, |n| u32::try_from(n).unwrap_or(u32::MAX));

    InboundMessage::new(
        message_id,
        data,
        attributes,
        attempt,
        Box::new(PubSubReply(received)),
    )
}

struct PubSubReply(ReceivedMessage);

impl AckReply for PubSubReply {
    fn ack(self: Box<Self>) {
        let received = self.0;
        spawn_reply("ack", async move { received.ack().await });
    }

    fn nack(self: Box<Self>) {
        let received = self.0;
        spawn_reply("nack", async move { received.nack().await });
    }
}

fn spawn_reply<F>(kind: &'static str, reply: F)
where
    F: Future<Output = Result<(), Status>> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if let Err(status) = reply.await {
                    warn!(kind, error = %status, "pubsub reply failed, message will be redelivered");
                }
            });
        }
        Err(_) => warn!(kind, "no runtime for pubsub reply, message will be redelivered"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_existing_resources_count_as_created() {
        assert!(ignore_already_exists(Err(Status::new(Code::AlreadyExists, "exists"))).is_ok());
        assert!(ignore_already_exists(Ok(())).is_ok());

        let err = ignore_already_exists(Err(Status::new(Code::PermissionDenied, "denied")))
            .unwrap_err();
        assert!(matches!(err, BusError::BrokerUnavailable { .. }));
        assert!(err.is_transient());
    }
}
