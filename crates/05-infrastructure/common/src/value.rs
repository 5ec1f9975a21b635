//! 动态值
//!
//! 状态存储、环境上下文和参数解析共用的值类型

use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 上下文值
///
/// 既可以是结构化数据（JSON），也可以是任意共享对象，
/// 例如当前正在处理的消息或已解析的组件实例。
#[derive(Clone)]
pub enum ContextValue {
    /// 结构化数据
    Data(Value),
    /// 共享对象
    Object(Arc<dyn Any + Send + Sync>),
}

impl ContextValue {
    /// 空值
    pub fn null() -> Self {
        Self::Data(Value::Null)
    }

    /// 包装共享对象
    pub fn object<T: Any + Send + Sync>(object: Arc<T>) -> Self {
        Self::Object(object)
    }

    /// 是否为空值
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Data(Value::Null))
    }

    /// 获取结构化数据
    pub fn as_data(&self) -> Option<&Value> {
        match self {
            Self::Data(value) => Some(value),
            Self::Object(_) => None,
        }
    }

    /// 取出结构化数据
    pub fn into_data(self) -> Option<Value> {
        match self {
            Self::Data(value) => Some(value),
            Self::Object(_) => None,
        }
    }

    /// 获取字符串
    pub fn as_str(&self) -> Option<&str> {
        self.as_data().and_then(Value::as_str)
    }

    /// 获取整数
    pub fn as_i64(&self) -> Option<i64> {
        self.as_data().and_then(Value::as_i64)
    }

    /// 获取布尔值
    pub fn as_bool(&self) -> Option<bool> {
        self.as_data().and_then(Value::as_bool)
    }

    /// 向下转型为共享对象
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            Self::Object(object) => object.clone().downcast::<T>().ok(),
            Self::Data(_) => None,
        }
    }
}

impl Default for ContextValue {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Debug for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data(value) => f.debug_tuple("Data").field(value).finish(),
            Self::Object(_) => f.debug_tuple("Object").field(&"<object>").finish(),
        }
    }
}

impl PartialEq for ContextValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Data(a), Self::Data(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<Value> for ContextValue {
    fn from(value: Value) -> Self {
        Self::Data(value)
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for ContextValue {
                fn from(value: $ty) -> Self {
                    Self::Data(Value::from(value))
                }
            }
        )*
    };
}

impl_from_scalar!(bool, i32, i64, u32, u64, f64, String, &str);
