//! # eefs
//!
//! 发射机 EEPROM 上的小型文件系统：通用设置一个文件，每个模型一个文件，
//! 另有一个暂存文件用于复制等分阶段操作。
//!
//! 写入由增量状态机完成，每次轮询只做有限的介质写入；
//! 新链先分配、旧链后释放、目录项最后提交，掉电时旧文件始终完好。

#![no_std]

extern crate alloc;

/* eefs 的整体架构，自上而下 */

// 写入层：增量写入状态机
mod writer;

// 读取层：顺序读取块链，可叠加游程解码
mod reader;

// 游程编码：压缩连续的零字节
pub mod rlc;

// 一致性检查与修复
mod fsck;

// 文件系统层：内存中的目录副本与空闲链表
mod efs;
mod free_list;

// 磁盘数据结构层：目录头与目录项的序列化
pub mod layout;

// 块存储层：块号到介质地址的映射
mod block;

mod error;
mod geometry;

pub use block_dev::BlockDevice;

pub use self::{
    block::{BlockId, BlockStore},
    efs::EeFs,
    error::Error,
    free_list::Chain,
    fsck::Damage,
    geometry::{EEFS_VERS, GENERAL_FILE, Geometry, LINK_SIZE},
    layout::{DirEnt, FileType},
    reader::{FileReader, RlcReader},
    writer::{WriteStep, Writer},
};
