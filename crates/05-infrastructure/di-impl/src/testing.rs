//! 测试支持

use crate::container::DiContainerImpl;
use di_abstractions::{DiContainer, ShutdownReport, StateSnapshot, StateStore};
use infrastructure_common::{ConfigSection, DependencyResult, LifecycleResult};
use std::sync::Arc;
use tracing::debug;

/// 测试夹具
///
/// `attach` 创建并启动测试容器，记录启动后的状态作为基线；
/// `reset_state` 在用例之间把状态恢复到基线；`detach` 停止并释放容器。
pub struct ContainerFixture {
    initial_state: ConfigSection,
    container: Option<Arc<DiContainerImpl>>,
    baseline: Option<StateSnapshot>,
}

impl ContainerFixture {
    /// 使用初始状态创建夹具
    pub fn new(initial_state: ConfigSection) -> Self {
        Self {
            initial_state,
            container: None,
            baseline: None,
        }
    }

    /// 创建并启动测试容器
    ///
    /// `configure` 在启动前运行，用于定义元数据和声明组件。已挂载时直接返回当前容器。
    pub async fn attach<F>(&mut self, configure: F) -> LifecycleResult<Arc<DiContainerImpl>>
    where
        F: FnOnce(&DiContainerImpl) -> DependencyResult<()>,
    {
        if let Some(container) = &self.container {
            return Ok(container.clone());
        }

        let container = Arc::new(DiContainerImpl::test(self.initial_state.clone()));
        configure(container.as_ref())?;
        container.start().await?;

        self.baseline = Some(container.store().snapshot());
        self.container = Some(container.clone());
        debug!(container = %container.id(), "测试容器已挂载");
        Ok(container)
    }

    /// 当前容器
    pub fn container(&self) -> Option<&Arc<DiContainerImpl>> {
        self.container.as_ref()
    }

    /// 把状态恢复到启动后的基线
    pub fn reset_state(&self) {
        if let (Some(container), Some(baseline)) = (&self.container, &self.baseline) {
            container.store().restore(baseline);
        }
    }

    /// 停止并释放容器
    pub async fn detach(&mut self) -> LifecycleResult<ShutdownReport> {
        self.baseline = None;
        match self.container.take() {
            Some(container) => {
                let report = container.stop().await?;
                debug!(container = %container.id(), "测试容器已卸载");
                Ok(report)
            }
            None => Ok(ShutdownReport::default()),
        }
    }
}
