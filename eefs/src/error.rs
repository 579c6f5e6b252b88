use derive_more::Display;

/// 文件系统操作的错误。
///
/// 写入失败同时记录在[`EeFs`](crate::EeFs)的粘滞错误标志上，
/// 下一次打开文件或开始写入时清除。
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// 空闲块耗尽，或文件超出目录项可记录的大小
    #[display(fmt = "no space left on medium")]
    Full,
    /// 文件号越界或文件不存在
    #[display(fmt = "no such file")]
    NotFound,
    /// 目录或块链损坏，介质已被重新格式化
    #[display(fmt = "filesystem corrupted")]
    Corrupt,
    /// 已有写入事务在进行
    #[display(fmt = "write in progress")]
    InProgress,
    /// 没有可追加数据的写入事务
    #[display(fmt = "no open write")]
    NotOpen,
    /// 文件只能以通用或模型类型写入
    #[display(fmt = "invalid file type")]
    InvalidType,
}
