//! 参数级元数据与内置参数处理器
//!
//! 参数处理器挂在 [`PARAMETER`] 键下，由 [`ArgumentResolver`](crate::ArgumentResolver)
//! 在调用时执行。

use crate::arguments::ResolutionContext;
use di_abstractions::{DiContainer, Injectable, Dependency, MetadataKey, MetadataRecord};
use infrastructure_common::{BoxError, CoercionError, ContextValue};
use serde_json::{Number, Value};
use std::fmt;
use std::sync::Arc;

/// 参数元数据键
pub const PARAMETER: MetadataKey<ParamRecord> = MetadataKey::new("di.parameter");

type HandlerFn = dyn Fn(&ResolutionContext<'_>) -> Result<ContextValue, BoxError> + Send + Sync;

/// 参数处理器
#[derive(Clone)]
pub struct ParamHandler(Arc<HandlerFn>);

impl ParamHandler {
    /// 包装处理函数
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&ResolutionContext<'_>) -> Result<ContextValue, BoxError> + Send + Sync + 'static,
    {
        Self(Arc::new(handler))
    }

    /// 计算参数值
    pub fn call(&self, context: &ResolutionContext<'_>) -> Result<ContextValue, BoxError> {
        (self.0)(context)
    }
}

impl fmt::Debug for ParamHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ParamHandler")
    }
}

/// 参数记录
#[derive(Debug, Clone, Default)]
pub struct ParamRecord {
    /// 参数名称
    pub name: Option<String>,
    /// 参数处理器，为空时直接使用调用方传入的值
    pub handler: Option<ParamHandler>,
    /// 处理器需要的组件，声明组件时会加入依赖图
    pub requires: Option<Dependency>,
}

impl ParamRecord {
    /// 使用处理器创建记录
    pub fn with_handler(handler: ParamHandler) -> Self {
        Self {
            handler: Some(handler),
            ..Self::default()
        }
    }

    /// 设置参数名称
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// 声明处理器需要的组件
    pub fn requiring(mut self, dependency: Dependency) -> Self {
        self.requires = Some(dependency);
        self
    }
}

impl MetadataRecord for ParamRecord {
    fn merge(&mut self, other: Self) {
        if other.name.is_some() {
            self.name = other.name;
        }
        if other.handler.is_some() {
            self.handler = other.handler;
        }
        if other.requires.is_some() {
            self.requires = other.requires;
        }
    }
}

/// 值类型转换目标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Coercion {
    /// 不转换
    #[default]
    Raw,
    /// 字符串
    String,
    /// 布尔值
    Boolean,
    /// 数字
    Number,
    /// JSON 对象或数组
    Object,
}

impl fmt::Display for Coercion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Raw => "raw",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::Object => "object",
        };
        f.write_str(name)
    }
}

/// 把原始值转换为目标类型
///
/// 空值保持为空；非字符串目标上的空字符串视为空值。
pub fn coerce(value: ContextValue, coercion: Coercion) -> Result<ContextValue, CoercionError> {
    if coercion == Coercion::Raw {
        return Ok(value);
    }
    let data = match value {
        ContextValue::Data(data) => data,
        ContextValue::Object(_) => return Err(coercion_error("<object>", coercion)),
    };
    if data.is_null() {
        return Ok(ContextValue::null());
    }
    if coercion != Coercion::String && data.as_str() == Some("") {
        return Ok(ContextValue::null());
    }

    let converted = match coercion {
        Coercion::Raw => Some(data.clone()),
        Coercion::String => to_string_value(&data),
        Coercion::Boolean => to_bool_value(&data),
        Coercion::Number => to_number_value(&data),
        Coercion::Object => to_object_value(&data),
    };
    converted
        .map(ContextValue::Data)
        .ok_or_else(|| coercion_error(&data.to_string(), coercion))
}

fn coercion_error(value: &str, coercion: Coercion) -> CoercionError {
    CoercionError {
        value: value.to_string(),
        target: coercion.to_string(),
    }
}

fn to_string_value(data: &Value) -> Option<Value> {
    match data {
        Value::String(_) => Some(data.clone()),
        Value::Bool(b) => Some(Value::String(b.to_string())),
        Value::Number(n) => Some(Value::String(n.to_string())),
        Value::Array(_) | Value::Object(_) => Some(Value::String(data.to_string())),
        Value::Null => None,
    }
}

fn to_bool_value(data: &Value) -> Option<Value> {
    match data {
        Value::Bool(_) => Some(data.clone()),
        Value::String(s) => match s.as_str() {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(Value::Bool(true)),
            Some(0) => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}

fn to_number_value(data: &Value) -> Option<Value> {
    match data {
        Value::Number(_) => Some(data.clone()),
        Value::String(s) => {
            if let Ok(integer) = s.parse::<i64>() {
                return Some(Value::Number(integer.into()));
            }
            s.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
        }
        _ => None,
    }
}

fn to_object_value(data: &Value) -> Option<Value> {
    match data {
        Value::Object(_) | Value::Array(_) => Some(data.clone()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(parsed @ (Value::Object(_) | Value::Array(_))) => Some(parsed),
            _ => None,
        },
        _ => None,
    }
}

/// 读取环境值，环境中没有时回退到状态存储中同名的 `@` 键
pub fn from_ambient(key: impl Into<String>, coercion: Coercion) -> ParamRecord {
    let key = key.into();
    ParamRecord::with_handler(ParamHandler::new(move |context| {
        let value = context.ambient(&key).unwrap_or_default();
        Ok(coerce(value, coercion)?)
    }))
}

/// 读取环境值中的一个顶层字段
pub fn from_ambient_field(
    key: impl Into<String>,
    field: impl Into<String>,
    coercion: Coercion,
) -> ParamRecord {
    let key = key.into();
    let field = field.into();
    ParamRecord::with_handler(ParamHandler::new(move |context| {
        let value = match context.ambient(&key) {
            None => ContextValue::null(),
            Some(ContextValue::Data(data)) => {
                ContextValue::Data(data.get(&field).cloned().unwrap_or(Value::Null))
            }
            Some(ContextValue::Object(_)) => {
                return Err(format!("环境值 {key} 是共享对象，无法读取字段 {field}").into());
            }
        };
        Ok(coerce(value, coercion)?)
    }))
}

/// 读取状态存储
pub fn from_state(key: impl Into<String>, coercion: Coercion) -> ParamRecord {
    let key = key.into();
    ParamRecord::with_handler(ParamHandler::new(move |context| {
        let value = context.state(&key).unwrap_or_default();
        Ok(coerce(value, coercion)?)
    }))
}

/// 注入容器中的组件，并把该组件加入依赖图
pub fn inject<T: Injectable>() -> ParamRecord {
    ParamRecord::with_handler(ParamHandler::new(|context| {
        let component = context.container().get::<T>()?;
        Ok(ContextValue::object(component))
    }))
    .requiring(Dependency::on::<T>())
}

/// 自定义处理器
pub fn handler<F>(handler: F) -> ParamRecord
where
    F: Fn(&ResolutionContext<'_>) -> Result<ContextValue, BoxError> + Send + Sync + 'static,
{
    ParamRecord::with_handler(ParamHandler::new(handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> ContextValue {
        ContextValue::Data(value)
    }

    #[test]
    fn test_number_coercion() {
        assert_eq!(coerce(data(json!("42")), Coercion::Number).unwrap(), data(json!(42)));
        assert_eq!(coerce(data(json!("2.5")), Coercion::Number).unwrap(), data(json!(2.5)));
        assert_eq!(coerce(data(json!(7)), Coercion::Number).unwrap(), data(json!(7)));
        assert!(coerce(data(json!("forty")), Coercion::Number).is_err());
        assert!(coerce(data(json!("NaN")), Coercion::Number).is_err());
    }

    #[test]
    fn test_empty_string_is_null_for_non_string_targets() {
        for coercion in [Coercion::Number, Coercion::Boolean, Coercion::Object] {
            assert!(coerce(data(json!("")), coercion).unwrap().is_null());
        }
        assert_eq!(coerce(data(json!("")), Coercion::String).unwrap(), data(json!("")));
    }

    #[test]
    fn test_boolean_coercion() {
        for (raw, expected) in [("true", true), ("1", true), ("false", false), ("0", false)] {
            assert_eq!(
                coerce(data(json!(raw)), Coercion::Boolean).unwrap(),
                data(json!(expected))
            );
        }
        let err = coerce(data(json!("yes")), Coercion::Boolean).unwrap_err();
        assert_eq!(err.target, "boolean");
    }

    #[test]
    fn test_object_coercion_parses_json() {
        assert_eq!(
            coerce(data(json!(r#"{"page": 2}"#)), Coercion::Object).unwrap(),
            data(json!({ "page": 2 }))
        );
        assert!(coerce(data(json!("12")), Coercion::Object).is_err());
        assert!(coerce(data(json!("{broken")), Coercion::Object).is_err());
    }

    #[test]
    fn test_string_and_raw_coercion() {
        assert_eq!(coerce(data(json!(42)), Coercion::String).unwrap(), data(json!("42")));
        assert!(coerce(ContextValue::null(), Coercion::String).unwrap().is_null());

        let object = ContextValue::object(Arc::new(5_u8));
        assert_eq!(coerce(object.clone(), Coercion::Raw).unwrap(), object);
        assert!(coerce(object, Coercion::Number).is_err());
    }

    #[test]
    fn test_record_merge_keeps_unset_fields() {
        let mut record = from_state("limit", Coercion::Number).named("limit");
        record.merge(ParamRecord::default().named("page_size"));
        assert_eq!(record.name.as_deref(), Some("page_size"));
        assert!(record.handler.is_some());
        assert!(record.requires.is_none());
    }
}
