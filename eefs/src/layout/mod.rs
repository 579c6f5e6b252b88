//! # 磁盘数据结构层
//!
//! eefs 的介质布局：
//! 目录头(版本 | 目录头大小 | 空闲链表头 | 块大小 | 保留 | 目录项 × MAXFILES) | 块1 | 块2 | ...
//!
//! 全部字段都是显式序列化的字节，不依赖编译器的内存布局。

mod dir_entry;
mod header;

pub use self::{
    dir_entry::{DirEnt, FileType},
    header::Header,
};
