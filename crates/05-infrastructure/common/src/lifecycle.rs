//! 组件生命周期管理

use crate::errors::BoxError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 生命周期钩子返回值
pub type HookResult = Result<(), BoxError>;

/// 容器生命周期状态
///
/// 只能单调前进：`Created -> Building -> Started -> Stopped`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContainerState {
    /// 已创建
    Created,
    /// 构建中（已开始解析组件，或启动失败后停留于此）
    Building,
    /// 运行中
    Started,
    /// 已停止
    Stopped,
}

impl Default for ContainerState {
    fn default() -> Self {
        Self::Created
    }
}

impl ContainerState {
    /// 是否允许启动
    pub fn can_start(self) -> bool {
        matches!(self, Self::Created | Self::Building)
    }

    /// 是否已终止
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Building => "building",
            Self::Started => "started",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// 组件生命周期 trait
///
/// 所有钩子都是可选的，默认实现什么也不做。
/// 钩子在容器所属任务中按依赖顺序依次等待。
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// 启动前准备，所有组件的准备钩子都在任何启动钩子之前运行
    async fn on_bootstrap(&self) -> HookResult {
        Ok(())
    }

    /// 组件启动
    async fn on_start(&self) -> HookResult {
        Ok(())
    }

    /// 组件停止
    async fn on_stop(&self) -> HookResult {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl Lifecycle for Noop {}

    #[test]
    fn test_container_state_order() {
        assert!(ContainerState::Created < ContainerState::Building);
        assert!(ContainerState::Building < ContainerState::Started);
        assert!(ContainerState::Started < ContainerState::Stopped);
        assert!(ContainerState::Building.can_start());
        assert!(!ContainerState::Stopped.can_start());
        assert!(ContainerState::Stopped.is_terminal());
        assert_eq!(ContainerState::Started.to_string(), "started");
    }

    #[tokio::test]
    async fn test_default_hooks_succeed() {
        let noop = Noop;
        assert!(noop.on_bootstrap().await.is_ok());
        assert!(noop.on_start().await.is_ok());
        assert!(noop.on_stop().await.is_ok());
    }
}
