use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use gateway_observability::{ShutdownError, Telemetry};
use tokio::sync::watch;
use tracing::{debug, error, info};

/// 进程级关闭信号
///
/// 基于 watch 通道保存"是否已触发"的状态，任何时刻开始等待都能看到最新状态。
#[derive(Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// 触发关闭；只有第一次调用返回 true
    pub fn trigger(&self) -> bool {
        let first = self.tx.send_if_modified(|fired| !std::mem::replace(fired, true));
        if first {
            info!("关闭信号已触发，等待方: {}", self.tx.receiver_count());
        } else {
            debug!("关闭信号已经触发过");
        }
        first
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// 返回一个在信号触发后完成的 future，可以交给其他任务持有
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            // 所有 ShutdownSignal 都被丢弃时同样视为关闭
            let _ = rx.wait_for(|fired| *fired).await;
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// 在超时时间内关闭所有遥测信号
///
/// 每个失败都会单独记录；是否据此改变退出码由调用方决定。
pub async fn shutdown_telemetry(telemetry: Telemetry, timeout: Duration) -> Result<(), ShutdownError> {
    let signals = telemetry.shutdown_handle().signals();
    if signals.is_empty() {
        debug!("没有启用的遥测信号，跳过关闭");
        return Ok(());
    }

    info!("关闭遥测信号: {:?}（超时: {:?}）", signals, timeout);
    let result = telemetry.shutdown(timeout).await;
    match &result {
        Ok(()) => info!("遥测已关闭"),
        Err(err) => {
            for failure in err.failures() {
                error!("遥测关闭失败: {failure}");
            }
        }
    }
    result
}
