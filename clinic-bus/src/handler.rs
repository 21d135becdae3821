//! 事件处理器（EventHandler）与处理器表（HandlerTable）
//!
//! 处理器表的键被限制在目录事件名的封闭集合内；注册在 `N` 下的处理器
//! 只会收到 `name == N` 且载荷已通过模式校验的信封。
//!
//! 处理器可能与自身以及同表中的其他处理器并发执行，且不保证事件顺序，
//! 因此处理逻辑需要幂等并容忍乱序与重复投递。
//!
use crate::catalog::{CatalogEvent, EventName};
use crate::envelope::Envelope;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// 事件处理器：处理某一个目录事件
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// 处理器名称（用于日志与审计）
    fn handler_name(&self) -> &str;
    /// 处理事件；返回错误会导致消息被否认并由中间件重投
    async fn handle(&self, envelope: &Envelope) -> anyhow::Result<()>;
}

#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<EventName, Arc<dyn EventHandler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册处理器；同名事件重复注册时后者覆盖前者
    pub fn register(mut self, name: EventName, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.insert(name, handler);
        self
    }

    /// 以闭包形式注册，闭包接收完整信封
    pub fn on_envelope<F, Fut>(self, name: EventName, f: F) -> Self
    where
        F: Fn(Envelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(
            name,
            Arc::new(FnHandler {
                name: name.as_str(),
                f,
                _fut: PhantomData,
            }),
        )
    }

    /// 以闭包形式注册类型化处理器，事件名由载荷类型决定
    pub fn on<E, F, Fut>(self, f: F) -> Self
    where
        E: CatalogEvent,
        F: Fn(Envelope, E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(
            E::NAME,
            Arc::new(TypedHandler {
                f,
                _marker: PhantomData,
            }),
        )
    }

    pub fn get(&self, name: EventName) -> Option<&Arc<dyn EventHandler>> {
        self.handlers.get(&name)
    }

    pub fn names(&self) -> Vec<EventName> {
        let mut names: Vec<EventName> = self.handlers.keys().copied().collect();
        names.sort_by_key(|n| n.as_str());
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

struct FnHandler<F, Fut> {
    name: &'static str,
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F, Fut>
where
    F: Fn(Envelope) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    fn handler_name(&self) -> &str {
        self.name
    }

    async fn handle(&self, envelope: &Envelope) -> anyhow::Result<()> {
        (self.f)(envelope.clone()).await
    }
}

struct TypedHandler<E, F, Fut> {
    f: F,
    _marker: PhantomData<fn() -> (E, Fut)>,
}

#[async_trait]
impl<E, F, Fut> EventHandler for TypedHandler<E, F, Fut>
where
    E: CatalogEvent,
    F: Fn(Envelope, E) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    fn handler_name(&self) -> &str {
        E::NAME.as_str()
    }

    async fn handle(&self, envelope: &Envelope) -> anyhow::Result<()> {
        let payload: E = envelope.decode()?;
        (self.f)(envelope.clone(), payload).await
    }
}
