use core::fmt;

/// 协议层错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    /// 传输层不空闲，调用方稍后重试即可
    Busy,
    /// 空口在规定时间内一直繁忙
    ChannelTimeout,
    /// 重试耗尽仍未收到有效回复
    ReplyTimeout,
    /// 收到的帧与当前状态期望的命令或身份不符
    UnexpectedFrame,
    /// 数值越界，已被钳位
    MalformedValue,
}

impl LinkError {
    pub fn name(self) -> &'static str {
        match self {
            LinkError::Busy => "transport busy",
            LinkError::ChannelTimeout => "airway busy timeout",
            LinkError::ReplyTimeout => "no reply after all retries",
            LinkError::UnexpectedFrame => "unexpected frame",
            LinkError::MalformedValue => "value out of range",
        }
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 引擎操作错误，`E` 为无线电驱动的错误类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error<E> {
    Link(LinkError),
    Radio(E),
    Storage,
}

impl<E> Error<E> {
    /// 不依赖驱动错误类型的简短描述，供日志使用
    pub fn describe(&self) -> &'static str {
        match self {
            Error::Link(error) => error.name(),
            Error::Radio(_) => "radio driver error",
            Error::Storage => "preference store error",
        }
    }
}

impl<E> From<LinkError> for Error<E> {
    fn from(error: LinkError) -> Self {
        Error::Link(error)
    }
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Link(error) => write!(f, "{}", error),
            Error::Radio(error) => write!(f, "radio driver error: {:?}", error),
            Error::Storage => f.write_str("preference store rejected the write"),
        }
    }
}
