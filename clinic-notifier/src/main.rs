//! `clinic-notifier` -- 通知服务进程
//!
//! # 环境变量
//!
//! | 变量                  | 默认值                  | 说明                 |
//! |-----------------------|-------------------------|----------------------|
//! | `TOPIC_NOTIFICATIONS` | `notifications`         | 订阅的主题           |
//! | `SUB_NOTIFICATIONS`   | `notifications-service` | 本服务的订阅         |
//! | `RUST_LOG`            | `clinic_bus=info,clinic_notifier=info` | 日志过滤 |
//!
//! 另见 `clinic_bus::config` 中的总线变量；设置 `PUBSUB_EMULATOR_HOST` 时连接本地模拟器，
//! 否则使用应用默认凭据连接 Google Cloud Pub/Sub。

use clinic_bus::broker::PubSubBroker;
use clinic_bus::{BusConfig, EventBus};
use clinic_notifier::{LogSender, NotificationStats, NotifierConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SEND_LATENCY: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clinic_bus=info,clinic_notifier=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let bus_config = BusConfig::from_env();
    let config = NotifierConfig::from_env();
    tracing::info!(
        project = bus_config.project_id.as_deref(),
        emulator = bus_config.is_emulator(),
        topic = %config.topic,
        subscription = %config.subscription,
        "starting clinic-notifier"
    );

    let stats = Arc::new(NotificationStats::new());
    let table = clinic_notifier::handlers(stats.clone(), Arc::new(LogSender::new(SEND_LATENCY)));

    // 中间件不可用时服务照常运行，只是不消费事件
    let broker = match PubSubBroker::connect(&bus_config).await {
        Ok(broker) => Some(Arc::new(broker)),
        Err(err) => {
            tracing::error!(error = %err, "failed to connect to pubsub, continuing without subscription");
            None
        }
    };

    let subscription = match &broker {
        Some(broker) => {
            let bus = EventBus::new(broker.clone(), bus_config);
            clinic_notifier::start(&bus, &config, table).await
        }
        None => None,
    };

    shutdown_signal().await;

    if let Some(subscription) = subscription {
        tracing::info!("unsubscribing");
        subscription.shutdown().await;
    }
    if let Some(broker) = broker {
        broker.shutdown().await;
    }

    match serde_json::to_string(&stats.snapshot()) {
        Ok(json) => tracing::info!(stats = %json, "clinic-notifier stopped"),
        Err(err) => tracing::warn!(error = %err, "clinic-notifier stopped"),
    }
}

/// 等待 SIGINT（Ctrl-C）或 SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
