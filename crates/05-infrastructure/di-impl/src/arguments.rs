//! 参数解析
//!
//! 调用时根据参数级元数据计算每个参数的值

use crate::container::DiContainerImpl;
use crate::metadata::MetadataRegistryImpl;
use crate::params::{ParamRecord, PARAMETER};
use di_abstractions::{ambient_key, DiContainer, MetadataRegistry};
use infrastructure_common::{ContextValue, Declaration, ParamResolutionError};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// 解析上下文
///
/// 容器加上一次调用的环境值，例如当前处理的消息
pub struct ResolutionContext<'a> {
    container: &'a DiContainerImpl,
    ambient: HashMap<String, ContextValue>,
}

impl<'a> ResolutionContext<'a> {
    /// 创建解析上下文
    pub fn new(container: &'a DiContainerImpl) -> Self {
        Self {
            container,
            ambient: HashMap::new(),
        }
    }

    /// 链式设置环境值
    pub fn with_ambient(mut self, key: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        self.set_ambient(key, value);
        self
    }

    /// 设置环境值，键统一带 `@` 前缀
    pub fn set_ambient(&mut self, key: impl Into<String>, value: impl Into<ContextValue>) {
        let key = key.into();
        let key = ambient_key(&key).into_owned();
        self.ambient.insert(key, value.into());
    }

    /// 读取环境值，不存在时回退到状态存储中同名的 `@` 键
    pub fn ambient(&self, key: &str) -> Option<ContextValue> {
        let key = ambient_key(key);
        self.ambient
            .get(key.as_ref())
            .cloned()
            .or_else(|| self.container.state(&key))
    }

    /// 读取状态存储
    pub fn state(&self, key: &str) -> Option<ContextValue> {
        self.container.state(key)
    }

    /// 所属容器
    pub fn container(&self) -> &'a DiContainerImpl {
        self.container
    }
}

/// 参数元数据允许的最大参数位置（不含）
pub const MAX_PARAMETERS: usize = 256;

/// 参数解析器
#[derive(Debug, Clone)]
pub struct ArgumentResolver {
    metadata: Arc<MetadataRegistryImpl>,
}

impl ArgumentResolver {
    /// 使用指定的元数据注册表创建解析器
    pub fn new(metadata: Arc<MetadataRegistryImpl>) -> Self {
        Self { metadata }
    }

    /// 使用容器的元数据注册表创建解析器
    pub fn for_container(container: &DiContainerImpl) -> Self {
        Self::new(container.metadata().clone())
    }

    /// 计算方法的参数列表
    ///
    /// 有参数元数据的位置由处理器计算，其余位置直接使用调用方传入的值，缺失时为空值。
    pub fn resolve(
        &self,
        method: &Declaration,
        call_args: Vec<ContextValue>,
        context: &ResolutionContext<'_>,
    ) -> Result<Vec<ContextValue>, ParamResolutionError> {
        let records = self.parameter_records(method);
        let declared = match records.keys().next_back() {
            Some(&last) if last >= MAX_PARAMETERS => {
                warn!(%method, index = last, "参数位置超出上限");
                return Err(ParamResolutionError {
                    method: method.to_string(),
                    index: last,
                    source: format!("参数位置超出上限 {MAX_PARAMETERS}").into(),
                });
            }
            Some(&last) => last + 1,
            None => 0,
        };
        let arity = declared.max(call_args.len());

        let mut call_args = call_args.into_iter();
        let mut resolved = Vec::with_capacity(arity);
        for index in 0..arity {
            let passed = call_args.next().unwrap_or_default();
            let handler = records.get(&index).and_then(|record| record.handler.as_ref());
            let Some(handler) = handler else {
                resolved.push(passed);
                continue;
            };

            match handler.call(context) {
                Ok(value) => resolved.push(value),
                Err(source) => {
                    warn!(%method, index, error = %source, "参数解析失败");
                    return Err(ParamResolutionError {
                        method: method.to_string(),
                        index,
                        source,
                    });
                }
            }
        }

        debug!(%method, arity, "参数解析完成");
        Ok(resolved)
    }

    /// 解析参数后同步调用方法
    pub fn invoke<F, R>(
        &self,
        method: &Declaration,
        call_args: Vec<ContextValue>,
        context: &ResolutionContext<'_>,
        target: F,
    ) -> Result<R, ParamResolutionError>
    where
        F: FnOnce(Vec<ContextValue>) -> R,
    {
        let args = self.resolve(method, call_args, context)?;
        Ok(target(args))
    }

    /// 解析参数后调用异步方法
    pub async fn invoke_async<F, Fut>(
        &self,
        method: &Declaration,
        call_args: Vec<ContextValue>,
        context: &ResolutionContext<'_>,
        target: F,
    ) -> Result<Fut::Output, ParamResolutionError>
    where
        F: FnOnce(Vec<ContextValue>) -> Fut,
        Fut: Future,
    {
        let args = self.resolve(method, call_args, context)?;
        Ok(target(args).await)
    }

    fn parameter_records(&self, method: &Declaration) -> BTreeMap<usize, ParamRecord> {
        let Some(name) = method.method.as_deref() else {
            return BTreeMap::new();
        };
        self.metadata
            .enumerate_parameters(&PARAMETER, &method.owner, name)
            .into_iter()
            .filter_map(|(declaration, record)| declaration.parameter.map(|index| (index, record)))
            .collect()
    }
}
