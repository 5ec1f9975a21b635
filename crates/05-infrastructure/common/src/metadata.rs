//! 元数据寻址
//!
//! 提供类型信息以及元数据挂载位置（类、方法、参数）的定义

use std::any::TypeId;
use std::fmt;

/// 类型信息
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeInfo {
    /// 类型名称
    pub name: String,
    /// 类型ID
    pub id: TypeId,
    /// 模块路径
    pub module_path: String,
}

impl TypeInfo {
    /// 从类型获取类型信息
    pub fn of<T: ?Sized + 'static>() -> Self {
        let full_name = std::any::type_name::<T>();
        Self {
            name: short_type_name(full_name).to_string(),
            id: TypeId::of::<T>(),
            module_path: full_name.to_string(),
        }
    }

    /// 获取简短的类型名称（不包含模块路径）
    pub fn short_name(&self) -> &str {
        self.name.split("::").last().unwrap_or(&self.name)
    }

    /// 是否为指定类型
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// 泛型参数中的路径不参与截断，`Wrapper<a::B>` 保留为 `Wrapper<a::B>`
fn short_type_name(full_name: &str) -> &str {
    let head = full_name.split('<').next().unwrap_or(full_name);
    match head.rfind("::") {
        Some(pos) => &full_name[pos + 2..],
        None => full_name,
    }
}

/// 元数据声明位置
///
/// 组件类型，可选的方法名，以及可选的方法参数位置。
/// 所有元数据都以声明位置寻址。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Declaration {
    /// 所属类型
    pub owner: TypeInfo,
    /// 方法名
    pub method: Option<String>,
    /// 参数位置
    pub parameter: Option<usize>,
}

impl Declaration {
    /// 类级别声明
    pub fn class<T: ?Sized + 'static>() -> Self {
        Self {
            owner: TypeInfo::of::<T>(),
            method: None,
            parameter: None,
        }
    }

    /// 方法级别声明
    pub fn method<T: ?Sized + 'static>(method: impl Into<String>) -> Self {
        Self::class::<T>().with_method(method)
    }

    /// 参数级别声明
    pub fn parameter<T: ?Sized + 'static>(method: impl Into<String>, index: usize) -> Self {
        Self::method::<T>(method).with_parameter(index)
    }

    /// 设置方法名
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// 设置参数位置
    pub fn with_parameter(mut self, index: usize) -> Self {
        self.parameter = Some(index);
        self
    }

    /// 是否为参数级别声明
    pub fn is_parameter(&self) -> bool {
        self.parameter.is_some()
    }

    /// 是否属于指定方法
    pub fn belongs_to_method(&self, method: &str) -> bool {
        self.method.as_deref() == Some(method)
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.owner)?;
        if let Some(method) = &self.method {
            write!(f, "::{method}")?;
        }
        if let Some(index) = self.parameter {
            write!(f, "#{index}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Controller;

    #[test]
    fn test_type_info_short_name() {
        let info = TypeInfo::of::<Controller>();
        assert_eq!(info.name, "Controller");
        assert!(info.module_path.ends_with("tests::Controller"));
        assert!(info.is::<Controller>());
        assert!(!info.is::<String>());
    }

    #[test]
    fn test_type_info_keeps_generic_arguments() {
        let info = TypeInfo::of::<Vec<Controller>>();
        assert!(info.name.starts_with("Vec<"));
    }

    #[test]
    fn test_declaration_display() {
        assert_eq!(Declaration::class::<Controller>().to_string(), "Controller");
        assert_eq!(
            Declaration::method::<Controller>("list").to_string(),
            "Controller::list"
        );
        assert_eq!(
            Declaration::parameter::<Controller>("list", 1).to_string(),
            "Controller::list#1"
        );
    }

    #[test]
    fn test_parameter_belongs_to_its_method() {
        let param = Declaration::parameter::<Controller>("list", 0);
        assert!(param.is_parameter());
        assert!(param.belongs_to_method("list"));
        assert!(!param.belongs_to_method("show"));
        assert!(!Declaration::method::<Controller>("list").is_parameter());
    }
}
