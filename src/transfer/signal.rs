use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// 一次性、不可逆的取消信号
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    token: CancellationToken,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    // 多次调用没有额外效果
    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 等待取消发生；已经取消时立即返回
    pub async fn aborted(&self) {
        self.token.cancelled().await
    }
}

/// 可反复切换的暂停信号
///
/// 状态变化通过 `watch` 通道广播，重复设置相同状态不会产生通知。
#[derive(Debug, Clone)]
pub struct PauseSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for PauseSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// 进入暂停状态，返回状态是否真的发生了变化
    pub fn pause(&self) -> bool {
        self.set(true)
    }

    /// 恢复，返回状态是否真的发生了变化
    pub fn resume(&self) -> bool {
        self.set(false)
    }

    /// 切换状态，返回切换后的状态
    pub fn toggle(&self) -> bool {
        let mut paused = false;
        self.tx.send_modify(|state| {
            *state = !*state;
            paused = *state;
        });
        paused
    }

    pub fn is_paused(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub async fn wait_until_resumed(&self) {
        let mut rx = self.subscribe();
        // 发送端由自身持有，不会关闭
        let _ = rx.wait_for(|paused| !*paused).await;
    }

    pub async fn wait_until_paused(&self) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|paused| *paused).await;
    }

    fn set(&self, paused: bool) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == paused {
                false
            } else {
                *state = paused;
                true
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn abort_is_one_way() {
        let signal = AbortSignal::new();
        let observer = signal.clone();
        assert!(!observer.is_aborted());
        signal.abort();
        signal.abort();
        assert!(observer.is_aborted());
    }

    #[tokio::test]
    async fn aborted_returns_immediately_once_fired() {
        let signal = AbortSignal::new();
        signal.abort();
        tokio::time::timeout(Duration::from_millis(50), signal.aborted())
            .await
            .expect("已取消的信号应立即返回");
    }

    #[test]
    fn duplicate_pause_is_a_no_op() {
        let signal = PauseSignal::new();
        let mut rx = signal.subscribe();

        assert!(signal.pause());
        assert!(!signal.pause());
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        assert!(!signal.pause());
        assert!(!rx.has_changed().unwrap());

        assert!(signal.resume());
        assert!(!signal.resume());
        assert!(!signal.is_paused());
    }

    #[test]
    fn toggle_flips_state() {
        let signal = PauseSignal::new();
        assert!(signal.toggle());
        assert!(signal.is_paused());
        assert!(!signal.toggle());
        assert!(!signal.is_paused());
    }

    #[tokio::test]
    async fn wait_until_resumed_wakes_on_resume() {
        let signal = PauseSignal::new();
        signal.pause();

        let remote = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            remote.resume();
        });

        tokio::time::timeout(Duration::from_secs(1), signal.wait_until_resumed())
            .await
            .expect("恢复后应当被唤醒");
        assert!(!signal.is_paused());
    }
}
