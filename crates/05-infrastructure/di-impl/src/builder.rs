//! 容器构建器

use crate::container::DiContainerImpl;
use crate::metadata::{global_metadata, MetadataRegistryImpl};
use crate::state::StateStoreImpl;
use di_abstractions::{ContainerBuilder, ContainerConfig, DiContainer, Injectable};
use infrastructure_clock::{Clock, SystemClock, VirtualClock};
use infrastructure_common::{Component, ConfigSection, DependencyResult};
use std::sync::Arc;
use tracing::info;

type Registration = Box<dyn FnOnce(&DiContainerImpl) -> DependencyResult<()> + Send>;

/// 依赖注入容器构建器
///
/// 组件按调用 `declare` 的顺序声明，该顺序决定启动顺序中兄弟组件的先后
pub struct DiContainerBuilder {
    config: ContainerConfig,
    state: ConfigSection,
    metadata: Option<Arc<MetadataRegistryImpl>>,
    clock: Option<Arc<dyn Clock>>,
    virtual_clock: Option<VirtualClock>,
    registrations: Vec<Registration>,
}

impl DiContainerBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self {
            config: ContainerConfig::default(),
            state: ConfigSection::new(),
            metadata: None,
            clock: None,
            virtual_clock: None,
            registrations: Vec::new(),
        }
    }

    /// 使用指定的元数据注册表，默认使用进程级注册表
    pub fn with_metadata(mut self, metadata: Arc<MetadataRegistryImpl>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// 使用虚拟时钟，容器可通过 `virtual_clock()` 控制时间
    pub fn with_virtual_clock(mut self, clock: VirtualClock) -> Self {
        self.clock = Some(Arc::new(clock.clone()));
        self.virtual_clock = Some(clock);
        self
    }
}

impl Default for DiContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerBuilder for DiContainerBuilder {
    type Container = DiContainerImpl;

    fn declare<T: Injectable>(mut self) -> Self {
        self.registrations
            .push(Box::new(|container: &DiContainerImpl| container.declare::<T>()));
        self
    }

    fn provide<T: Component>(mut self, instance: Arc<T>) -> Self {
        self.registrations
            .push(Box::new(move |container: &DiContainerImpl| container.provide(instance)));
        self
    }

    fn with_config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    fn with_state(mut self, state: ConfigSection) -> Self {
        self.state = state;
        self
    }

    fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self.virtual_clock = None;
        self
    }

    fn build(self) -> DependencyResult<DiContainerImpl> {
        let container = DiContainerImpl::with_parts(
            self.config,
            self.metadata.unwrap_or_else(global_metadata),
            StateStoreImpl::from_config(&self.state),
            self.clock
                .unwrap_or_else(|| Arc::new(SystemClock::new()) as Arc<dyn Clock>),
            self.virtual_clock,
        );
        for registration in self.registrations {
            registration(&container)?;
        }
        info!(
            container = %container.id(),
            declared = container.declared().len(),
            "容器构建完成"
        );
        Ok(container)
    }
}
