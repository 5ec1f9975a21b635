//! 错误类型定义

use thiserror::Error;

/// 钩子、参数处理器等用户代码返回的装箱错误
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置键不存在: {key}")]
    KeyNotFound { key: String },

    #[error("配置序列化失败: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },

    #[error("配置类型转换失败: {message}")]
    TypeConversionError { message: String },
}

/// 依赖注入错误类型
#[derive(Error, Debug)]
pub enum DependencyError {
    #[error("组件未声明且无法合成: {type_name}{}", requirer_suffix(.required_by))]
    UnknownComponent {
        type_name: String,
        required_by: Option<String>,
    },

    #[error("循环依赖检测到: {dependency_chain}")]
    CircularDependency { dependency_chain: String },

    #[error("组件创建失败: {type_name}, 原因: {source}")]
    ComponentCreationFailed {
        type_name: String,
        source: BoxError,
    },

    #[error("组件 {component} 请求了未声明的依赖: {type_name}")]
    UndeclaredDependency { component: String, type_name: String },

    #[error("组件类型转换失败: {type_name}")]
    TypeMismatch { type_name: String },

    #[error("依赖解析深度超过上限 {max_depth}: {dependency_chain}")]
    ResolutionTooDeep {
        max_depth: usize,
        dependency_chain: String,
    },

    #[error("容器状态不允许该操作: {message}")]
    InvalidState { message: String },
}

fn requirer_suffix(required_by: &Option<String>) -> String {
    required_by
        .as_ref()
        .map(|r| format!(" (被 {r} 依赖)"))
        .unwrap_or_default()
}

impl DependencyError {
    /// 创建未知组件错误
    pub fn unknown_component(type_name: impl Into<String>) -> Self {
        Self::UnknownComponent {
            type_name: type_name.into(),
            required_by: None,
        }
    }

    /// 创建组件创建失败错误
    pub fn creation_failed(type_name: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::ComponentCreationFailed {
            type_name: type_name.into(),
            source: source.into(),
        }
    }

    /// 是否为循环依赖
    pub fn is_cyclic(&self) -> bool {
        matches!(self, Self::CircularDependency { .. })
    }

    /// 是否为未知组件
    pub fn is_unknown_component(&self) -> bool {
        matches!(self, Self::UnknownComponent { .. })
    }
}

/// 生命周期阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// 启动前准备
    Bootstrap,
    /// 启动
    Start,
}

impl std::fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bootstrap => write!(f, "bootstrap"),
            Self::Start => write!(f, "start"),
        }
    }
}

/// 生命周期管理错误类型
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("组件 {component} 在 {phase} 阶段失败: {source}")]
    Startup {
        component: String,
        phase: LifecyclePhase,
        source: BoxError,
    },

    #[error("组件依赖解析失败: {source}")]
    Dependency {
        #[from]
        source: DependencyError,
    },

    #[error("非法的生命周期转换: 当前状态 {from}, 操作 {action}")]
    InvalidTransition { from: String, action: String },
}

impl LifecycleError {
    /// 是否为启动钩子失败
    pub fn is_startup(&self) -> bool {
        matches!(self, Self::Startup { .. })
    }
}

/// 参数解析错误
#[derive(Error, Debug)]
#[error("参数解析失败: {method} 第 {index} 个参数, 原因: {source}")]
pub struct ParamResolutionError {
    /// 被调用方法的声明
    pub method: String,
    /// 参数位置
    pub index: usize,
    /// 底层原因
    pub source: BoxError,
}

/// 值类型转换错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("无法将 {value} 转换为 {target}")]
pub struct CoercionError {
    /// 原始值
    pub value: String,
    /// 目标类型
    pub target: String,
}

/// 基础设施错误类型
#[derive(Error, Debug)]
pub enum InfrastructureError {
    #[error("配置错误: {source}")]
    ConfigError {
        #[from]
        source: ConfigError,
    },

    #[error("依赖注入错误: {source}")]
    DependencyError {
        #[from]
        source: DependencyError,
    },

    #[error("生命周期错误: {source}")]
    LifecycleError {
        #[from]
        source: LifecycleError,
    },

    #[error("参数解析错误: {source}")]
    ParamResolution {
        #[from]
        source: ParamResolutionError,
    },

    #[error("基础设施启动失败: {message}")]
    BootstrapFailed { message: String },
}

/// 结果类型别名
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type DependencyResult<T> = Result<T, DependencyError>;
pub type LifecycleResult<T> = Result<T, LifecycleError>;
pub type InfrastructureResult<T> = Result<T, InfrastructureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_component_message_mentions_requirer() {
        let err = DependencyError::UnknownComponent {
            type_name: "Database".to_string(),
            required_by: Some("Repository".to_string()),
        };
        let message = err.to_string();
        assert!(message.contains("Database"));
        assert!(message.contains("Repository"));
        assert!(err.is_unknown_component());
    }

    #[test]
    fn test_lifecycle_error_wraps_dependency_error() {
        let err: LifecycleError = DependencyError::CircularDependency {
            dependency_chain: "A -> B -> A".to_string(),
        }
        .into();
        assert!(matches!(err, LifecycleError::Dependency { ref source } if source.is_cyclic()));
        assert!(!err.is_startup());
    }
}
