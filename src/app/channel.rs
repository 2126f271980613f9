// ==========================================
// 渔场设施预定与物资管理系统 - 消息通道投递
// ==========================================
// 职责: 把业务通知从同步事务侧搬运到异步通道侧
// 红线: 业务事务提交后才投递, 投递失败只告警不回灌
// ==========================================

use async_trait::async_trait;
use futures::future::join_all;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::ConfigManager;
use crate::engine::{Notification, NotificationSink, NotificationTarget};

// ==========================================
// ChannelTransport Trait
// ==========================================

/// 通道推送接口
///
/// 实现者对接具体的消息机器人通道; 这里只约定
/// "把一段文案推给一个渠道用户" 这一件事
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// 向指定渠道用户推送一条消息
    async fn push(
        &self,
        channel_user_id: &str,
        text: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// 控制台推送实现
///
/// 无真实通道时把出站消息打到日志, 便于本地联调
#[derive(Debug, Clone, Default)]
pub struct ConsoleChannelTransport;

#[async_trait]
impl ChannelTransport for ConsoleChannelTransport {
    async fn push(
        &self,
        channel_user_id: &str,
        text: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        tracing::info!("[出站消息] -> {}: {}", channel_user_id, text);
        Ok(())
    }
}

// ==========================================
// ChannelNotificationSink - 同步侧入队
// ==========================================

/// 通道通知投递者
///
/// 服务层在事务提交后同步调用 deliver, 这里只做入队,
/// 真正的网络推送由 NotificationDispatcher 在异步侧完成
pub struct ChannelNotificationSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl NotificationSink for ChannelNotificationSink {
    fn deliver(&self, notification: Notification) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.tx
            .send(notification)
            .map_err(|_| "通知队列已关闭, 消息被丢弃".into())
    }
}

// ==========================================
// NotificationDispatcher - 异步侧出站
// ==========================================

/// 通知分发器
///
/// 从队列消费 Notification, 解析投递目标后经 ChannelTransport 出站:
/// - Requester 目标直接推给该渠道用户
/// - AdminChannel 目标按运行参数 admin_channel_ids 扇出
pub struct NotificationDispatcher {
    rx: mpsc::UnboundedReceiver<Notification>,
    transport: Arc<dyn ChannelTransport>,
    config: Arc<ConfigManager>,
}

impl NotificationDispatcher {
    /// 消费队列直到所有发送端关闭
    pub async fn run(mut self) {
        while let Some(notification) = self.rx.recv().await {
            self.dispatch(notification).await;
        }
        tracing::info!("通知队列已空且发送端全部关闭, 分发器退出");
    }

    async fn dispatch(&self, notification: Notification) {
        let targets = match &notification.target {
            NotificationTarget::Requester(channel_user_id) => vec![channel_user_id.clone()],
            NotificationTarget::AdminChannel => match self.config.admin_channel_ids() {
                Ok(ids) => ids,
                Err(e) => {
                    tracing::warn!("读取 admin_channel_ids 失败, 本条管理通知丢弃: {}", e);
                    return;
                }
            },
        };

        if targets.is_empty() {
            tracing::debug!(
                "通知无投递目标, 跳过: kind={}",
                notification.kind.as_str()
            );
            return;
        }

        let pushes = targets
            .iter()
            .map(|target| self.transport.push(target, &notification.text));
        for (target, result) in targets.iter().zip(join_all(pushes).await) {
            if let Err(e) = result {
                tracing::warn!(
                    "通道推送失败: kind={}, target={}, err={}",
                    notification.kind.as_str(),
                    target,
                    e
                );
            }
        }
    }
}

/// 组装 "同步入队 + 异步出站" 的通知管线
///
/// # 返回
/// - ChannelNotificationSink: 交给服务层 (OptionalNotificationSink::with_sink)
/// - NotificationDispatcher: 在 tokio 任务中 run()
pub fn channel_pipeline(
    transport: Arc<dyn ChannelTransport>,
    config: Arc<ConfigManager>,
) -> (ChannelNotificationSink, NotificationDispatcher) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ChannelNotificationSink { tx },
        NotificationDispatcher {
            rx,
            transport,
            config,
        },
    )
}
