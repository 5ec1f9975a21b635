//! 依赖注入容器抽象接口
//!
//! 提供依赖注入容器的核心抽象

use crate::factory::Injectable;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use infrastructure_clock::Clock;
use infrastructure_common::{
    BoxError, Component, ConfigSection, ContainerState, ContextValue, DependencyResult,
    LifecycleResult, TypeInfo,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// 依赖注入容器 trait
///
/// 每种类型在一个容器内只有一个实例
#[async_trait]
pub trait DiContainer: Send + Sync {
    /// 声明根组件，传递地注册其依赖，重复声明无效果
    fn declare<T: Injectable>(&self) -> DependencyResult<()>;

    /// 注册外部构建的实例
    fn provide<T: Component>(&self, instance: Arc<T>) -> DependencyResult<()>;

    /// 解析组件，必要时先构建其依赖
    fn get<T: Component>(&self) -> DependencyResult<Arc<T>>;

    /// 检查是否已注册
    fn is_registered<T: Component>(&self) -> bool;

    /// 启动容器
    async fn start(&self) -> LifecycleResult<()>;

    /// 停止容器
    async fn stop(&self) -> LifecycleResult<ShutdownReport>;

    /// 当前生命周期状态
    fn lifecycle_state(&self) -> ContainerState;

    /// 读取状态
    fn state(&self, key: &str) -> Option<ContextValue>;

    /// 写入状态
    fn set_state(&self, key: &str, value: ContextValue);

    /// 统计信息
    fn stats(&self) -> ContainerStats;
}

/// 容器构建器 trait
pub trait ContainerBuilder: Sized {
    /// 关联的容器类型
    type Container: DiContainer;

    /// 按顺序声明根组件
    fn declare<T: Injectable>(self) -> Self;

    /// 注册外部实例
    fn provide<T: Component>(self, instance: Arc<T>) -> Self;

    /// 设置容器配置
    fn with_config(self, config: ContainerConfig) -> Self;

    /// 设置初始状态
    fn with_state(self, state: ConfigSection) -> Self;

    /// 设置时钟
    fn with_clock(self, clock: Arc<dyn Clock>) -> Self;

    /// 构建容器
    fn build(self) -> DependencyResult<Self::Container>;
}

/// 容器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// 最大解析深度
    pub max_resolution_depth: usize,
    /// 启动失败时是否逆序停止已启动的组件
    pub rollback_on_startup_failure: bool,
    /// 启动时是否封存元数据注册表
    pub seal_metadata_on_start: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            max_resolution_depth: 100,
            rollback_on_startup_failure: true,
            seal_metadata_on_start: false,
        }
    }
}

/// 容器统计信息
#[derive(Debug, Clone, Serialize)]
pub struct ContainerStats {
    /// 容器标识
    pub container_id: Uuid,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 生命周期状态
    pub state: ContainerState,
    /// 显式声明的根组件数量
    pub declared_components: usize,
    /// 已注册组件数量（含传递依赖）
    pub registered_components: usize,
    /// 外部提供的实例数量
    pub provided_components: usize,
    /// 已构建的实例数量
    pub instantiated_components: usize,
    /// 已启动的生命周期组件数量
    pub started_components: usize,
    /// 状态条目数量
    pub state_entries: usize,
    /// 解析错误数量
    pub resolution_errors: usize,
}

/// 停止钩子失败
#[derive(Debug)]
pub struct StopFailure {
    /// 组件类型
    pub component: TypeInfo,
    /// 失败原因
    pub error: BoxError,
}

/// 停止报告
///
/// 停止钩子失败不会中断停止流程，全部收集到这里
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// 按停止顺序成功停止的组件
    pub stopped: Vec<TypeInfo>,
    /// 失败的停止钩子
    pub failures: Vec<StopFailure>,
}

impl ShutdownReport {
    /// 是否全部成功
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
