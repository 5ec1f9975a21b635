//! 端到端场景：消费者风格的组件在容器中装配、按消息解析参数、由虚拟时钟驱动轮询

use anyhow::Result;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use di_abstractions::{
    ContainerBuilder, Dependency, DiContainer, Injectable, Injector, MetadataKey, MetadataRegistry,
};
use di_impl::{
    decorate, from_ambient, from_ambient_field, from_state, global_metadata, inject,
    ArgumentResolver, Coercion, DiContainerBuilder, DiContainerImpl, ResolutionContext, PARAMETER,
};
use infrastructure_clock::{Clock, TimerId, VirtualClock};
use infrastructure_common::{
    Component, ConfigSection, ContainerState, ContextValue, Declaration, DependencyResult,
    HookResult, Lifecycle, TypeInfo,
};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{Arc, Once};
use std::time::Duration;

/// 消费者声明的类级元数据
const CONSUMER: MetadataKey<Value> = MetadataKey::new("consumer");

/// 队列中的一条消息
#[derive(Debug, Clone)]
struct Message {
    id: u64,
    payload: Value,
}

/// 外部提供的内存队列
#[derive(Debug, Default)]
struct MessageQueue {
    pending: Mutex<Vec<Message>>,
    delivered: Mutex<Vec<Message>>,
    polls: Mutex<usize>,
}

impl Component for MessageQueue {}

impl MessageQueue {
    fn publish(&self, id: u64, payload: Value) {
        self.pending.lock().push(Message { id, payload });
    }

    fn poll(&self) {
        *self.polls.lock() += 1;
        let batch: Vec<Message> = self.pending.lock().drain(..).collect();
        self.delivered.lock().extend(batch);
    }

    fn take_delivered(&self) -> Vec<Message> {
        std::mem::take(&mut *self.delivered.lock())
    }
}

#[derive(Debug, Deserialize)]
struct StorageSettings {
    table: String,
}

/// 保存已处理订单的仓储
#[derive(Debug)]
struct OrderRepository {
    table: String,
    connected: Mutex<bool>,
    saved: Mutex<Vec<(u64, i64)>>,
}

impl Component for OrderRepository {}

impl Injectable for OrderRepository {
    fn inject(injector: &dyn Injector) -> DependencyResult<Self> {
        let settings: StorageSettings = injector.require_state("orders.storage")?;
        Ok(Self {
            table: settings.table,
            connected: Mutex::new(false),
            saved: Mutex::new(Vec::new()),
        })
    }

    fn lifecycle(instance: Arc<Self>) -> Option<Arc<dyn Lifecycle>> {
        Some(instance)
    }
}

#[async_trait]
impl Lifecycle for OrderRepository {
    async fn on_start(&self) -> HookResult {
        *self.connected.lock() = true;
        Ok(())
    }

    async fn on_stop(&self) -> HookResult {
        *self.connected.lock() = false;
        Ok(())
    }
}

impl OrderRepository {
    fn save(&self, message_id: u64, order_id: i64) -> HookResult {
        if !*self.connected.lock() {
            return Err(format!("{} 未连接", self.table).into());
        }
        self.saved.lock().push((message_id, order_id));
        Ok(())
    }
}

/// 周期性轮询队列的消费者
#[derive(Debug)]
struct OrderConsumer {
    queue: Arc<MessageQueue>,
    clock: Arc<dyn Clock>,
    poller: Mutex<Option<TimerId>>,
}

impl Component for OrderConsumer {}

impl Injectable for OrderConsumer {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::provided::<MessageQueue>()]
    }

    fn inject(injector: &dyn Injector) -> DependencyResult<Self> {
        Ok(Self {
            queue: injector.get::<MessageQueue>()?,
            clock: injector.clock(),
            poller: Mutex::new(None),
        })
    }

    fn lifecycle(instance: Arc<Self>) -> Option<Arc<dyn Lifecycle>> {
        Some(instance)
    }
}

#[async_trait]
impl Lifecycle for OrderConsumer {
    async fn on_start(&self) -> HookResult {
        let queue = self.queue.clone();
        let timer = self.clock.set_interval(Duration::from_secs(1), move || {
            queue.poll();
            Ok(())
        })?;
        *self.poller.lock() = Some(timer.id);
        Ok(())
    }

    async fn on_stop(&self) -> HookResult {
        if let Some(timer) = self.poller.lock().take() {
            self.clock.cancel(timer);
        }
        Ok(())
    }
}

impl OrderConsumer {
    /// 参数：消息、订单号、是否试运行、仓储
    fn handle(&self, args: Vec<ContextValue>) -> HookResult {
        let message = args[0]
            .downcast::<Message>()
            .ok_or("缺少消息")?;
        let order_id = args[1].as_i64().ok_or("缺少订单号")?;
        if args[2].as_bool() == Some(true) {
            return Ok(());
        }
        let repository = args[3]
            .downcast::<OrderRepository>()
            .ok_or("缺少仓储")?;
        repository.save(message.id, order_id)
    }
}

static DECORATE: Once = Once::new();

/// 进程级注册表由所有测试共享，只装饰一次
fn decorate_consumer() {
    DECORATE.call_once(|| {
        let registry = global_metadata();
        decorate::<OrderConsumer>(&registry)
            .class(&CONSUMER, json!({ "queue": "orders", "concurrency": 1 }))
            .class(&CONSUMER, json!({ "concurrency": 4 }))
            .parameter("handle", 0, &PARAMETER, from_ambient("@message", Coercion::Raw))
            .parameter(
                "handle",
                1,
                &PARAMETER,
                from_ambient_field("@payload", "order_id", Coercion::Number),
            )
            .parameter("handle", 2, &PARAMETER, from_state("orders.dry_run", Coercion::Boolean))
            .parameter("handle", 3, &PARAMETER, inject::<OrderRepository>());
    });
}

fn build_container(queue: Arc<MessageQueue>, clock: VirtualClock) -> Result<DiContainerImpl> {
    let container = DiContainerBuilder::new()
        .with_state(
            ConfigSection::new()
                .with("orders.storage", json!({ "table": "orders" }))
                .with("orders.dry_run", "false"),
        )
        .with_virtual_clock(clock)
        .provide(queue)
        .declare::<OrderConsumer>()
        .build()?;
    Ok(container)
}

fn dispatch(container: &DiContainerImpl, consumer: &OrderConsumer, message: Message) -> Result<()> {
    let resolver = ArgumentResolver::for_container(container);
    let method = Declaration::method::<OrderConsumer>("handle");
    let context = ResolutionContext::new(container)
        .with_ambient("@payload", message.payload.clone())
        .with_ambient("@message", ContextValue::object(Arc::new(message)));

    resolver
        .invoke(&method, Vec::new(), &context, |args| consumer.handle(args))?
        .map_err(|e| anyhow::anyhow!(e))
}

#[tokio::test]
async fn test_consumer_polls_on_virtual_time_and_persists_messages() -> Result<()> {
    decorate_consumer();
    let start = Utc.with_ymd_and_hms(2030, 3, 1, 8, 0, 0).unwrap();
    let clock = VirtualClock::paused_at(start);
    let queue = Arc::new(MessageQueue::default());
    let container = build_container(queue.clone(), clock.clone())?;

    // 类级元数据按字段合并
    let consumer_meta = global_metadata()
        .lookup(&CONSUMER, &Declaration::class::<OrderConsumer>())
        .expect("consumer metadata");
    assert_eq!(consumer_meta, json!({ "queue": "orders", "concurrency": 4 }));

    // 仓储只通过参数元数据被需要，仍然先于消费者启动
    let order: Vec<String> = container
        .start_order()?
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(order, vec!["OrderRepository", "OrderConsumer"]);

    container.start().await?;
    assert_eq!(container.lifecycle_state(), ContainerState::Started);
    assert_eq!(clock.pending_timers(), 1);

    queue.publish(1, json!({ "order_id": "1001" }));
    queue.publish(2, json!({ "order_id": 1002 }));

    assert_eq!(clock.travel(Duration::from_millis(999))?, 0);
    assert!(queue.take_delivered().is_empty());

    assert_eq!(clock.travel(Duration::from_millis(2001))?, 3);
    assert_eq!(*queue.polls.lock(), 3);
    assert_eq!(clock.now(), start + chrono::Duration::seconds(3));

    let consumer = container.get::<OrderConsumer>()?;
    for message in queue.take_delivered() {
        dispatch(&container, &consumer, message)?;
    }

    let repository = container.get::<OrderRepository>()?;
    assert_eq!(repository.table, "orders");
    assert_eq!(*repository.saved.lock(), vec![(1, 1001), (2, 1002)]);

    // 试运行开关来自状态存储，写入立即生效
    container.set_state("orders.dry_run", ContextValue::from("true"));
    dispatch(
        &container,
        &consumer,
        Message {
            id: 3,
            payload: json!({ "order_id": "1003" }),
        },
    )?;
    assert_eq!(repository.saved.lock().len(), 2);

    let report = container.stop().await?;
    assert!(report.is_clean());
    let stopped: Vec<&str> = report.stopped.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(stopped, vec!["OrderConsumer", "OrderRepository"]);

    // 停止后轮询定时器已取消
    assert_eq!(clock.pending_timers(), 0);
    assert_eq!(clock.travel(Duration::from_secs(10))?, 0);
    Ok(())
}

#[tokio::test]
async fn test_bad_payload_reports_parameter_position() -> Result<()> {
    decorate_consumer();
    let queue = Arc::new(MessageQueue::default());
    let clock = VirtualClock::paused_at(Utc.with_ymd_and_hms(2030, 3, 1, 8, 0, 0).unwrap());
    let container = build_container(queue, clock)?;
    container.start().await?;

    let consumer = container.get::<OrderConsumer>()?;
    let err = dispatch(
        &container,
        &consumer,
        Message {
            id: 9,
            payload: json!({ "order_id": "not-a-number" }),
        },
    )
    .unwrap_err();
    let err = err.downcast::<infrastructure_common::ParamResolutionError>()?;
    assert_eq!(err.index, 1);
    assert_eq!(err.method, "OrderConsumer::handle");

    let repository = container.get::<OrderRepository>()?;
    assert!(repository.saved.lock().is_empty());
    container.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_missing_queue_fails_start() -> Result<()> {
    let container = DiContainerImpl::test(
        ConfigSection::new().with("orders.storage", json!({ "table": "orders" })),
    );
    container.declare::<OrderConsumer>()?;

    let err = container.start().await.unwrap_err();
    assert!(err.to_string().contains("MessageQueue"));
    assert_ne!(container.lifecycle_state(), ContainerState::Started);
    assert!(!container
        .descriptors()
        .iter()
        .any(|d| d.type_info == TypeInfo::of::<OrderConsumer>() && d.instantiated));
    Ok(())
}

#[tokio::test]
async fn test_stats_reflect_container_contents() -> Result<()> {
    decorate_consumer();
    let queue = Arc::new(MessageQueue::default());
    let clock = VirtualClock::paused_at(Utc.with_ymd_and_hms(2030, 3, 1, 8, 0, 0).unwrap());
    let container = build_container(queue, clock)?;
    container.start().await?;

    let stats = container.stats();
    assert_eq!(stats.container_id, container.id());
    assert_eq!(stats.declared_components, 1);
    assert_eq!(stats.registered_components, 2);
    assert_eq!(stats.provided_components, 1);
    assert_eq!(stats.instantiated_components, 2);
    assert_eq!(stats.started_components, 2);
    assert_eq!(stats.state_entries, 2);

    let descriptors = container.descriptors();
    let queue_descriptor = descriptors
        .iter()
        .find(|d| d.name == "MessageQueue")
        .expect("queue descriptor");
    assert!(queue_descriptor.provided);
    assert!(descriptors
        .iter()
        .filter(|d| !d.provided)
        .all(|d| d.instantiated && d.has_lifecycle));

    container.stop().await?;
    Ok(())
}
