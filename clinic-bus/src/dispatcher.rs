//! 事件分发（Dispatcher）
//!
//! 把一张处理器表挂到一个具名订阅上，由长驻任务消费中间件的投递流，
//! 逐条决定消息的结局：
//!
//! ```text
//! Received -> {Parsed | Malformed}
//!   Parsed -> {HandlerFound | NoHandler}
//!     HandlerFound -> {Validated | InvalidPayload}
//!       Validated -> {HandlerSucceeded -> Acked | HandlerFailed -> Nacked}
//! ```
//!
//! `Malformed`、`NoHandler`、`InvalidPayload` 与 `Acked` 都以确认结束；
//! `Nacked` 交给中间件重投，重投时重新从 `Received` 开始，本模块不记录尝试次数。
//! 订阅侧的任何错误（包括处理器 panic）都被限制在单条消息内，不会终止投递循环。
//!
use crate::broker::InboundMessage;
use crate::catalog;
use crate::channel::ChannelManager;
use crate::envelope::Envelope;
use crate::error::{BusError, BusResult};
use crate::handler::HandlerTable;
use futures_core::stream::BoxStream;
use futures_util::{FutureExt, StreamExt};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 单条消息的最终结局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// 消息体无法反序列化为信封
    Malformed,
    /// 本进程未注册该事件的处理器
    NoHandler,
    /// 信封可解析，但载荷不符合目录模式
    InvalidPayload,
    /// 处理器成功
    Acked,
    /// 处理器失败，等待中间件重投
    Nacked,
}

impl Disposition {
    pub fn is_acked(&self) -> bool {
        !matches!(self, Disposition::Nacked)
    }
}

pub struct Dispatcher {
    channels: Arc<ChannelManager>,
    max_concurrent_messages: usize,
}

impl Dispatcher {
    pub fn new(channels: Arc<ChannelManager>, max_concurrent_messages: usize) -> Self {
        Self {
            channels,
            max_concurrent_messages: max_concurrent_messages.max(1),
        }
    }

    /// 订阅一个已存在的订阅名，返回用于取消订阅的句柄
    pub async fn subscribe(
        &self,
        subscription: &str,
        handlers: HandlerTable,
    ) -> BusResult<Subscription> {
        let handle = self.channels.resolve_subscription(subscription).await?;
        let deliveries = self.channels.broker().pull(handle.name()).await?;

        info!(
            subscription,
            events = ?handlers.names(),
            "subscribed"
        );

        let token = CancellationToken::new();
        let task = tokio::spawn(delivery_loop(
            handle.name().to_string(),
            deliveries,
            handlers,
            token.clone(),
            self.max_concurrent_messages,
        ));

        Ok(Subscription {
            name: handle.name().to_string(),
            token,
            task: Some(task),
        })
    }

    /// 先确保主题与订阅存在，再订阅
    pub async fn subscribe_to(
        &self,
        topic: &str,
        subscription: &str,
        handlers: HandlerTable,
    ) -> BusResult<Subscription> {
        self.channels.ensure_subscription(topic, subscription).await?;
        self.subscribe(subscription, handlers).await
    }
}

async fn delivery_loop(
    subscription: String,
    deliveries: BoxStream<'static, BusResult<InboundMessage>>,
    handlers: HandlerTable,
    token: CancellationToken,
    concurrency: usize,
) {
    let name = subscription.as_str();
    let handlers = &handlers;

    // 取消后不再接收新消息，已在处理中的消息照常完成并应答
    deliveries
        .take_until(token.clone().cancelled_owned())
        .for_each_concurrent(Some(concurrency), move |delivery| async move {
            match delivery {
                Ok(message) => {
                    dispatch(name, handlers, message).await;
                }
                Err(err) => on_stream_error(name, &err),
            }
        })
        .await;

    if token.is_cancelled() {
        debug!(subscription = name, "delivery loop stopped");
    } else {
        warn!(subscription = name, "delivery stream ended");
    }
}

fn on_stream_error(subscription: &str, err: &BusError) {
    // 传输层错误不对应任何具体消息，只记录不应答
    error!(subscription, error = %err, "subscription error");
}

/// 处理一条投递并给出应答，返回消息的最终结局
pub async fn dispatch(
    subscription: &str,
    handlers: &HandlerTable,
    message: InboundMessage,
) -> Disposition {
    let envelope = match Envelope::from_bytes(message.data()) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(
                subscription,
                message_id = message.message_id(),
                error = %err,
                "malformed message discarded"
            );
            message.ack();
            return Disposition::Malformed;
        }
    };

    let Some(handler) = handlers.get(envelope.name()) else {
        debug!(
            subscription,
            event_id = envelope.id(),
            event_name = %envelope.name(),
            "no handler registered, message acknowledged"
        );
        message.ack();
        return Disposition::NoHandler;
    };

    if let Err(err) = catalog::validate(envelope.name(), envelope.payload()) {
        warn!(
            subscription,
            event_id = envelope.id(),
            event_name = %envelope.name(),
            error = %err,
            "invalid payload discarded"
        );
        message.ack();
        return Disposition::InvalidPayload;
    }

    let outcome = AssertUnwindSafe(handler.handle(&envelope))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(())) => {
            message.ack();
            Disposition::Acked
        }
        Ok(Err(err)) => {
            error!(
                subscription,
                handler = handler.handler_name(),
                event_id = envelope.id(),
                event_name = %envelope.name(),
                attempt = message.delivery_attempt(),
                error = %err,
                "handler failed, message nacked"
            );
            message.nack();
            Disposition::Nacked
        }
        Err(_) => {
            error!(
                subscription,
                handler = handler.handler_name(),
                event_id = envelope.id(),
                event_name = %envelope.name(),
                "handler panicked, message nacked"
            );
            message.nack();
            Disposition::Nacked
        }
    }
}

/// 订阅句柄
///
/// `unsubscribe` 只阻止新的投递进入处理，已在处理中的消息仍会通过原来的
/// 应答通道完成；需要等它们结束时调用 `join`。句柄被丢弃时同样会取消订阅。
pub struct Subscription {
    name: String,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// 幂等，可重复调用
    pub fn unsubscribe(&self) {
        if self.is_active() {
            info!(subscription = %self.name, "unsubscribing");
        }
        self.token.cancel();
    }

    /// 等待投递循环及其在途消息结束
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// 取消订阅并等待在途消息完成
    pub async fn shutdown(self) {
        self.unsubscribe();
        self.join().await;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
