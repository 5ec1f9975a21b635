//! 时钟错误类型

use crate::clock::TimerId;
use infrastructure_common::BoxError;
use thiserror::Error;

/// 时钟错误类型
#[derive(Error, Debug)]
pub enum ClockError {
    #[error("时钟未暂停，无法进行时间旅行")]
    NotPaused,

    #[error("当前没有可用的 tokio 运行时，无法使用真实定时器")]
    NoRuntime,

    #[error("延迟超出可表示范围: {millis}ms")]
    DelayOutOfRange { millis: u128 },

    #[error("定时器 {timer} 回调失败: {source}")]
    CallbackFailed { timer: TimerId, source: BoxError },
}

/// 结果类型别名
pub type ClockResult<T> = Result<T, ClockError>;
