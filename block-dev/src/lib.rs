//! # 介质驱动接口层
//!
//! 发射机上的配置存储介质（EEPROM / 片上 Flash 仿真）按**字节**寻址，
//! [`BlockDevice`] 就是对这类介质读写原语的抽象，实现了此特质的类型称为**介质驱动**。
//!
//! `eefs` 通过介质驱动读写块与目录，自身不关心物理细节。

#![no_std]

extern crate alloc;

mod ram_disk;

use core::any::Any;
use core::fmt::Debug;

pub use self::ram_disk::RamDisk;

/// 介质驱动特质
///
/// 读写都是同步的：`write`返回时数据已经落到介质上。
pub trait BlockDevice: Send + Sync + Any + Debug {
    /// 介质总字节数
    fn capacity(&self) -> usize;

    fn read(&self, addr: usize, buf: &mut [u8]);

    fn write(&self, addr: usize, buf: &[u8]);
}
