//! 依赖注入容器实现

use crate::logging::{init_logging, LoggingConfig};
use crate::metadata::{global_metadata, MetadataRegistryImpl};
use crate::params::PARAMETER;
use crate::state::StateStoreImpl;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use di_abstractions::{
    ComponentRegistration, ContainerConfig, ContainerStats, Dependency, DiContainer, Injectable,
    Injector, MetadataRegistry, ResolveContext, ResolveOptions, ResolvedComponent,
    ShutdownReport, StateStore, StopFailure,
};
use infrastructure_clock::{Clock, SystemClock, VirtualClock};
use infrastructure_common::{
    Component, ComponentDescriptor, ConfigSection, ContainerState, ContextValue,
    DependencyError, DependencyResult, Lifecycle, LifecycleError, LifecyclePhase,
    LifecycleResult, TypeInfo,
};
use parking_lot::Mutex;
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type StartedHook = (TypeInfo, Arc<dyn Lifecycle>);

/// 组件表
#[derive(Default)]
struct ComponentTable {
    registrations: HashMap<TypeId, ComponentRegistration>,
    /// 每个组件的直接依赖，包括参数元数据要求的组件
    edges: HashMap<TypeId, Vec<Dependency>>,
    /// 显式声明的根组件，按声明顺序
    roots: Vec<TypeInfo>,
    provided: HashMap<TypeId, (TypeInfo, ResolvedComponent)>,
    instances: HashMap<TypeId, ResolvedComponent>,
}

impl ComponentTable {
    fn lookup(&self, id: TypeId) -> Option<ResolvedComponent> {
        self.provided
            .get(&id)
            .map(|(_, instance)| instance.clone())
            .or_else(|| self.instances.get(&id).cloned())
    }

    /// 深度优先遍历，按后序把需要构建的组件追加到 `order`
    ///
    /// 只读取依赖图，不运行任何工厂
    fn visit(
        &self,
        type_info: &TypeInfo,
        required_by: Option<&TypeInfo>,
        ctx: &mut ResolveContext,
        visited: &mut HashSet<TypeId>,
        order: &mut Vec<TypeInfo>,
    ) -> DependencyResult<()> {
        if visited.contains(&type_info.id) || self.provided.contains_key(&type_info.id) {
            return Ok(());
        }
        if !self.registrations.contains_key(&type_info.id) {
            return Err(DependencyError::UnknownComponent {
                type_name: type_info.name.clone(),
                required_by: required_by.map(|owner| owner.name.clone()),
            });
        }

        ctx.push_type(type_info)?;
        let result = self.visit_dependencies(type_info, ctx, visited, order);
        ctx.pop_type();
        result?;

        visited.insert(type_info.id);
        order.push(type_info.clone());
        Ok(())
    }

    fn visit_dependencies(
        &self,
        type_info: &TypeInfo,
        ctx: &mut ResolveContext,
        visited: &mut HashSet<TypeId>,
        order: &mut Vec<TypeInfo>,
    ) -> DependencyResult<()> {
        let Some(dependencies) = self.edges.get(&type_info.id) else {
            return Ok(());
        };
        for dependency in dependencies {
            match dependency {
                Dependency::Component(registration) => {
                    self.visit(&registration.type_info, Some(type_info), ctx, visited, order)?;
                }
                Dependency::Provided(provided) => {
                    if !self.provided.contains_key(&provided.id) {
                        return Err(DependencyError::UnknownComponent {
                            type_name: provided.name.clone(),
                            required_by: Some(type_info.name.clone()),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// 生命周期跟踪
#[derive(Default)]
struct LifecycleTrack {
    state: ContainerState,
    /// 正在执行启动或停止
    transitioning: bool,
    /// 已成功执行启动钩子的组件，按启动顺序
    started: Vec<StartedHook>,
}

/// 工厂看到的依赖视图
struct ScopedInjector<'a> {
    component: &'a TypeInfo,
    resolved: HashMap<TypeId, ResolvedComponent>,
    store: &'a StateStoreImpl,
    clock: Arc<dyn Clock>,
}

impl Injector for ScopedInjector<'_> {
    fn component(&self) -> &TypeInfo {
        self.component
    }

    fn resolve(&self, type_info: &TypeInfo) -> DependencyResult<ResolvedComponent> {
        self.resolved.get(&type_info.id).cloned().ok_or_else(|| {
            DependencyError::UndeclaredDependency {
                component: self.component.name.clone(),
                type_name: type_info.name.clone(),
            }
        })
    }

    fn state(&self, key: &str) -> Option<ContextValue> {
        self.store.get(key)
    }

    fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }
}

/// 依赖注入容器实现
pub struct DiContainerImpl {
    id: Uuid,
    created_at: DateTime<Utc>,
    config: ContainerConfig,
    components: Mutex<ComponentTable>,
    lifecycle: Mutex<LifecycleTrack>,
    metadata: Arc<MetadataRegistryImpl>,
    store: Arc<StateStoreImpl>,
    clock: Arc<dyn Clock>,
    virtual_clock: Option<VirtualClock>,
    resolution_errors: AtomicUsize,
}

impl DiContainerImpl {
    /// 使用默认配置、进程级元数据注册表和真实时钟创建容器
    pub fn new() -> Self {
        Self::with_parts(
            ContainerConfig::default(),
            global_metadata(),
            StateStoreImpl::new(),
            Arc::new(SystemClock::new()),
            None,
        )
    }

    /// 创建测试容器
    ///
    /// 预置状态，静默日志，独立的元数据注册表，使用未暂停的虚拟时钟
    pub fn test(initial_state: ConfigSection) -> Self {
        // 其他测试可能已经安装了全局订阅者
        let _ = init_logging(&LoggingConfig::quiet());
        let clock = VirtualClock::new();
        Self::with_parts(
            ContainerConfig::default(),
            Arc::new(MetadataRegistryImpl::new()),
            StateStoreImpl::from_config(&initial_state),
            Arc::new(clock.clone()),
            Some(clock),
        )
    }

    pub(crate) fn with_parts(
        config: ContainerConfig,
        metadata: Arc<MetadataRegistryImpl>,
        store: StateStoreImpl,
        clock: Arc<dyn Clock>,
        virtual_clock: Option<VirtualClock>,
    ) -> Self {
        let container = Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            config,
            components: Mutex::new(ComponentTable::default()),
            lifecycle: Mutex::new(LifecycleTrack::default()),
            metadata,
            store: Arc::new(store),
            clock,
            virtual_clock,
            resolution_errors: AtomicUsize::new(0),
        };
        debug!(container = %container.id, "容器已创建");
        container
    }

    /// 容器标识
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// 创建时间
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// 容器配置
    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// 元数据注册表
    pub fn metadata(&self) -> &Arc<MetadataRegistryImpl> {
        &self.metadata
    }

    /// 状态存储
    pub fn store(&self) -> &Arc<StateStoreImpl> {
        &self.store
    }

    /// 容器时钟
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// 使用虚拟时钟构建时返回该时钟
    pub fn virtual_clock(&self) -> Option<&VirtualClock> {
        self.virtual_clock.as_ref()
    }

    /// 显式声明的根组件，按声明顺序
    pub fn declared(&self) -> Vec<TypeInfo> {
        self.components.lock().roots.clone()
    }

    /// 启动顺序：从根组件按声明顺序深度优先遍历得到的后序
    pub fn start_order(&self) -> DependencyResult<Vec<TypeInfo>> {
        let table = self.components.lock();
        self.plan(&table, &table.roots)
    }

    /// 所有已注册组件的描述符
    pub fn descriptors(&self) -> Vec<ComponentDescriptor> {
        let table = self.components.lock();
        let mut descriptors: Vec<ComponentDescriptor> = table
            .registrations
            .values()
            .map(|registration| {
                let mut descriptor = ComponentDescriptor::new(registration.type_info.clone());
                let instance = table.instances.get(&registration.type_info.id);
                descriptor.instantiated = instance.is_some();
                descriptor.has_lifecycle = instance
                    .map(|instance| (registration.lifecycle)(instance.clone()).is_some())
                    .unwrap_or(false);
                descriptor
            })
            .chain(table.provided.values().map(|(type_info, _)| {
                let mut descriptor = ComponentDescriptor::new(type_info.clone());
                descriptor.provided = true;
                descriptor.instantiated = true;
                descriptor
            }))
            .collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// 按类型信息解析组件
    pub fn resolve(&self, type_info: &TypeInfo) -> DependencyResult<ResolvedComponent> {
        let mut table = self.components.lock();
        let result = self.build(&mut table, std::slice::from_ref(type_info)).and_then(|_| {
            table
                .lookup(type_info.id)
                .ok_or_else(|| DependencyError::unknown_component(type_info.name.clone()))
        });
        if let Err(e) = &result {
            self.resolution_errors.fetch_add(1, Ordering::Relaxed);
            debug!(component = %type_info, error = %e, "组件解析失败");
        }
        result
    }

    fn ensure_open(&self, action: &str) -> DependencyResult<()> {
        let track = self.lifecycle.lock();
        if track.transitioning || !matches!(track.state, ContainerState::Created) {
            return Err(DependencyError::InvalidState {
                message: format!("容器处于 {} 状态，不能{action}", track.state),
            });
        }
        Ok(())
    }

    /// 注册组件及其传递依赖
    fn register_transitive(&self, table: &mut ComponentTable, root: ComponentRegistration) {
        let mut pending = vec![root];
        while let Some(registration) = pending.pop() {
            let id = registration.type_info.id;
            if table.registrations.contains_key(&id) {
                continue;
            }

            let mut dependencies = (registration.dependencies)();
            for (_, record) in self.metadata.enumerate(&PARAMETER, &registration.type_info) {
                let Some(required) = record.requires else {
                    continue;
                };
                let already = dependencies
                    .iter()
                    .any(|dependency| dependency.type_info().id == required.type_info().id);
                if !already {
                    dependencies.push(required);
                }
            }
            for dependency in &dependencies {
                if let Dependency::Component(next) = dependency {
                    pending.push(next.clone());
                }
            }

            debug!(
                component = %registration.type_info,
                dependencies = dependencies.len(),
                "注册组件"
            );
            table.edges.insert(id, dependencies);
            table.registrations.insert(id, registration);
        }
    }

    fn plan(&self, table: &ComponentTable, roots: &[TypeInfo]) -> DependencyResult<Vec<TypeInfo>> {
        let mut ctx = ResolveContext::with_options(ResolveOptions {
            max_depth: self.config.max_resolution_depth,
        });
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        for root in roots {
            table.visit(root, None, &mut ctx, &mut visited, &mut order)?;
        }
        Ok(order)
    }

    /// 先完整校验依赖图，再按后序构建，失败时不会留下部分构建的组件
    fn build(&self, table: &mut ComponentTable, roots: &[TypeInfo]) -> DependencyResult<Vec<TypeInfo>> {
        let order = self.plan(table, roots)?;
        for type_info in &order {
            self.instantiate(table, type_info)?;
        }
        Ok(order)
    }

    fn instantiate(&self, table: &mut ComponentTable, type_info: &TypeInfo) -> DependencyResult<()> {
        if table.instances.contains_key(&type_info.id) {
            return Ok(());
        }
        let registration = table
            .registrations
            .get(&type_info.id)
            .cloned()
            .ok_or_else(|| DependencyError::unknown_component(type_info.name.clone()))?;

        let mut resolved = HashMap::new();
        for dependency in table.edges.get(&type_info.id).into_iter().flatten() {
            let dependency = dependency.type_info();
            let instance = table.lookup(dependency.id).ok_or_else(|| {
                DependencyError::UnknownComponent {
                    type_name: dependency.name.clone(),
                    required_by: Some(type_info.name.clone()),
                }
            })?;
            resolved.insert(dependency.id, instance);
        }

        let injector = ScopedInjector {
            component: type_info,
            resolved,
            store: &self.store,
            clock: self.clock.clone(),
        };
        let instance = (registration.factory)(&injector)?;
        table.instances.insert(type_info.id, instance);
        debug!(component = %type_info, "组件已构建");
        Ok(())
    }

    /// 构建全部根组件并取出生命周期钩子，按启动顺序
    fn collect_hooks(&self) -> DependencyResult<Vec<StartedHook>> {
        let mut table = self.components.lock();
        let roots = table.roots.clone();
        let order = self.build(&mut table, &roots)?;
        Ok(order
            .into_iter()
            .filter_map(|type_info| {
                let registration = table.registrations.get(&type_info.id)?;
                let instance = table.instances.get(&type_info.id)?.clone();
                (registration.lifecycle)(instance).map(|hooks| (type_info, hooks))
            })
            .collect())
    }

    async fn run_startup(&self) -> Result<Vec<StartedHook>, (Vec<StartedHook>, LifecycleError)> {
        if self.config.seal_metadata_on_start {
            self.metadata.seal();
        }

        let hooks = self.collect_hooks().map_err(|e| {
            self.resolution_errors.fetch_add(1, Ordering::Relaxed);
            (Vec::new(), LifecycleError::from(e))
        })?;
        debug!(components = hooks.len(), "生命周期组件已解析");

        for (type_info, hook) in &hooks {
            if let Err(source) = hook.on_bootstrap().await {
                error!(component = %type_info, error = %source, "组件启动前准备失败");
                return Err((
                    Vec::new(),
                    LifecycleError::Startup {
                        component: type_info.name.clone(),
                        phase: LifecyclePhase::Bootstrap,
                        source,
                    },
                ));
            }
        }

        let mut started = Vec::with_capacity(hooks.len());
        for (type_info, hook) in hooks {
            match hook.on_start().await {
                Ok(()) => {
                    debug!(component = %type_info, "组件已启动");
                    started.push((type_info, hook));
                }
                Err(source) => {
                    error!(component = %type_info, error = %source, "组件启动失败");
                    let failure = LifecycleError::Startup {
                        component: type_info.name.clone(),
                        phase: LifecyclePhase::Start,
                        source,
                    };
                    if !self.config.rollback_on_startup_failure {
                        return Err((started, failure));
                    }
                    let report = stop_in_reverse(started).await;
                    warn!(
                        rolled_back = report.stopped.len(),
                        failures = report.failures.len(),
                        "启动失败，已逆序停止已启动的组件"
                    );
                    return Err((Vec::new(), failure));
                }
            }
        }
        Ok(started)
    }
}

async fn stop_in_reverse(started: Vec<StartedHook>) -> ShutdownReport {
    let mut report = ShutdownReport::default();
    for (type_info, hook) in started.into_iter().rev() {
        match hook.on_stop().await {
            Ok(()) => {
                debug!(component = %type_info, "组件已停止");
                report.stopped.push(type_info);
            }
            Err(error) => {
                warn!(component = %type_info, %error, "组件停止失败");
                report.failures.push(StopFailure {
                    component: type_info,
                    error,
                });
            }
        }
    }
    report
}

impl Default for DiContainerImpl {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DiContainerImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiContainerImpl")
            .field("id", &self.id)
            .field("state", &self.lifecycle.lock().state)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DiContainer for DiContainerImpl {
    fn declare<T: Injectable>(&self) -> DependencyResult<()> {
        self.ensure_open("声明组件")?;
        let registration = ComponentRegistration::of::<T>();
        let mut table = self.components.lock();
        if !table.roots.iter().any(|root| root.id == registration.type_info.id) {
            info!(component = %registration.type_info, "声明组件");
            table.roots.push(registration.type_info.clone());
        }
        self.register_transitive(&mut table, registration);
        Ok(())
    }

    fn provide<T: Component>(&self, instance: Arc<T>) -> DependencyResult<()> {
        self.ensure_open("提供实例")?;
        let type_info = TypeInfo::of::<T>();
        let instance: ResolvedComponent = instance;
        info!(component = %type_info, "注册外部实例");
        self.components
            .lock()
            .provided
            .insert(type_info.id, (type_info, instance));
        Ok(())
    }

    fn get<T: Component>(&self) -> DependencyResult<Arc<T>> {
        let type_info = TypeInfo::of::<T>();
        self.resolve(&type_info)?
            .downcast::<T>()
            .map_err(|_| DependencyError::TypeMismatch {
                type_name: type_info.name,
            })
    }

    fn is_registered<T: Component>(&self) -> bool {
        let table = self.components.lock();
        let id = TypeId::of::<T>();
        table.registrations.contains_key(&id) || table.provided.contains_key(&id)
    }

    async fn start(&self) -> LifecycleResult<()> {
        {
            let mut track = self.lifecycle.lock();
            let blocked = if track.transitioning {
                Some("start (另一个生命周期操作正在进行)")
            } else if !track.started.is_empty() {
                Some("start (上次启动失败且未回滚，需要先停止)")
            } else {
                None
            };
            if let Some(action) = blocked {
                return Err(LifecycleError::InvalidTransition {
                    from: track.state.to_string(),
                    action: action.to_string(),
                });
            }
            if track.state == ContainerState::Started {
                return Ok(());
            }
            if !track.state.can_start() {
                return Err(LifecycleError::InvalidTransition {
                    from: track.state.to_string(),
                    action: "start".to_string(),
                });
            }
            track.state = ContainerState::Building;
            track.transitioning = true;
        }
        info!(container = %self.id, "容器启动中");

        let result = self.run_startup().await;

        let mut track = self.lifecycle.lock();
        track.transitioning = false;
        match result {
            Ok(started) => {
                let count = started.len();
                track.started = started;
                track.state = ContainerState::Started;
                info!(container = %self.id, lifecycle_components = count, "容器已启动");
                Ok(())
            }
            Err((started, error)) => {
                track.started = started;
                Err(error)
            }
        }
    }

    async fn stop(&self) -> LifecycleResult<ShutdownReport> {
        let started = {
            let mut track = self.lifecycle.lock();
            if track.transitioning {
                return Err(LifecycleError::InvalidTransition {
                    from: track.state.to_string(),
                    action: "stop (另一个生命周期操作正在进行)".to_string(),
                });
            }
            if track.state.is_terminal() {
                return Ok(ShutdownReport::default());
            }
            if track.state == ContainerState::Created {
                track.state = ContainerState::Stopped;
                info!(container = %self.id, "容器未启动，直接停止");
                return Ok(ShutdownReport::default());
            }
            track.transitioning = true;
            std::mem::take(&mut track.started)
        };
        info!(container = %self.id, components = started.len(), "容器停止中");

        let report = stop_in_reverse(started).await;

        let mut track = self.lifecycle.lock();
        track.state = ContainerState::Stopped;
        track.transitioning = false;
        info!(
            container = %self.id,
            stopped = report.stopped.len(),
            failures = report.failures.len(),
            "容器已停止"
        );
        Ok(report)
    }

    fn lifecycle_state(&self) -> ContainerState {
        self.lifecycle.lock().state
    }

    fn state(&self, key: &str) -> Option<ContextValue> {
        self.store.get(key)
    }

    fn set_state(&self, key: &str, value: ContextValue) {
        self.store.set(key, value);
    }

    fn stats(&self) -> ContainerStats {
        let (state, started_components) = {
            let track = self.lifecycle.lock();
            (track.state, track.started.len())
        };
        let table = self.components.lock();
        ContainerStats {
            container_id: self.id,
            created_at: self.created_at,
            state,
            declared_components: table.roots.len(),
            registered_components: table.registrations.len(),
            provided_components: table.provided.len(),
            instantiated_components: table.instances.len(),
            started_components,
            state_entries: self.store.len(),
            resolution_errors: self.resolution_errors.load(Ordering::Relaxed),
        }
    }
}
