//! 依赖解析上下文
//!
//! 显式维护当前解析栈，用于检测循环依赖和限制解析深度

use infrastructure_common::{DependencyError, DependencyResult, TypeInfo};

/// 解析上下文
#[derive(Debug, Clone)]
pub struct ResolveContext {
    /// 当前解析链，用于检测循环依赖
    pub resolution_chain: Vec<TypeInfo>,
    /// 解析选项
    pub options: ResolveOptions,
}

impl ResolveContext {
    /// 创建新的解析上下文
    pub fn new() -> Self {
        Self::with_options(ResolveOptions::default())
    }

    /// 使用指定选项创建解析上下文
    pub fn with_options(options: ResolveOptions) -> Self {
        Self {
            resolution_chain: Vec::new(),
            options,
        }
    }

    /// 添加类型到解析链
    ///
    /// 类型已在链上时返回循环依赖错误，链长度达到上限时返回深度错误。
    /// 出错时解析链保持不变。
    pub fn push_type(&mut self, type_info: &TypeInfo) -> DependencyResult<()> {
        if self.contains(type_info) {
            return Err(DependencyError::CircularDependency {
                dependency_chain: self.chain_to(type_info),
            });
        }
        if self.depth() >= self.options.max_depth {
            return Err(DependencyError::ResolutionTooDeep {
                max_depth: self.options.max_depth,
                dependency_chain: self.chain_to(type_info),
            });
        }
        self.resolution_chain.push(type_info.clone());
        Ok(())
    }

    /// 从解析链中移除类型
    pub fn pop_type(&mut self) -> Option<TypeInfo> {
        self.resolution_chain.pop()
    }

    /// 类型是否在解析链上
    pub fn contains(&self, type_info: &TypeInfo) -> bool {
        self.resolution_chain
            .iter()
            .any(|entry| entry.id == type_info.id)
    }

    /// 当前深度
    pub fn depth(&self) -> usize {
        self.resolution_chain.len()
    }

    /// 当前正在解析的类型
    pub fn current(&self) -> Option<&TypeInfo> {
        self.resolution_chain.last()
    }

    /// 以 `A -> B -> next` 形式展示解析链
    pub fn chain_to(&self, next: &TypeInfo) -> String {
        self.resolution_chain
            .iter()
            .chain(std::iter::once(next))
            .map(|entry| entry.name.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

impl Default for ResolveContext {
    fn default() -> Self {
        Self::new()
    }
}

/// 解析选项
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// 最大递归深度
    pub max_depth: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self { max_depth: 100 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    struct B;
    struct C;

    #[test]
    fn test_push_detects_cycle_with_chain() {
        let mut ctx = ResolveContext::new();
        ctx.push_type(&TypeInfo::of::<A>()).unwrap();
        ctx.push_type(&TypeInfo::of::<B>()).unwrap();

        let err = ctx.push_type(&TypeInfo::of::<A>()).unwrap_err();
        match err {
            DependencyError::CircularDependency { dependency_chain } => {
                assert_eq!(dependency_chain, "A -> B -> A");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(ctx.depth(), 2);
    }

    #[test]
    fn test_pop_restores_chain() {
        let mut ctx = ResolveContext::new();
        ctx.push_type(&TypeInfo::of::<A>()).unwrap();
        ctx.push_type(&TypeInfo::of::<B>()).unwrap();
        assert_eq!(ctx.pop_type().map(|t| t.name), Some("B".to_string()));
        assert!(!ctx.contains(&TypeInfo::of::<B>()));
        ctx.push_type(&TypeInfo::of::<B>()).unwrap();
        assert_eq!(ctx.current().map(|t| t.name.as_str()), Some("B"));
    }

    #[test]
    fn test_depth_limit() {
        let mut ctx = ResolveContext::with_options(ResolveOptions { max_depth: 2 });
        ctx.push_type(&TypeInfo::of::<A>()).unwrap();
        ctx.push_type(&TypeInfo::of::<B>()).unwrap();
        assert!(matches!(
            ctx.push_type(&TypeInfo::of::<C>()),
            Err(DependencyError::ResolutionTooDeep { max_depth: 2, .. })
        ));
    }
}
