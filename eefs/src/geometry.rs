//! 介质几何参数

use crate::layout::{DirEnt, Header};

/// 文件系统格式版本
pub const EEFS_VERS: u8 = 1;

/// 链接字段的宽度，与块号同宽
pub const LINK_SIZE: usize = 1;

/// 通用设置文件的文件号
pub const GENERAL_FILE: usize = 0;

/// 介质布局：目录头 | 块1 | 块2 | ... | 块(blocks - 1)
///
/// 块0不存在于介质上，块号0用作链表结尾。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// 块大小，含末尾的链接字段
    pub block_size: usize,
    /// 块号空间大小，可用块为`1..blocks`
    pub blocks: usize,
    /// 目录项个数
    pub max_files: usize,
    /// 模型文件个数，文件号为`1..=max_models`
    pub max_models: usize,
}

impl Geometry {
    /// 32KiB EEPROM，128字节块，目录头恰好占128字节
    pub const REFERENCE: Self = Self::for_medium(128, 32 * 1024, 41, 32);

    pub const fn new(block_size: usize, blocks: usize, max_files: usize, max_models: usize) -> Self {
        Self {
            block_size,
            blocks,
            max_files,
            max_models,
        }
    }

    /// 根据介质容量推算块数，块号空间最多256。
    pub const fn for_medium(
        block_size: usize,
        medium_len: usize,
        max_files: usize,
        max_models: usize,
    ) -> Self {
        let header_len = Header::FIXED_LEN + DirEnt::SIZE * max_files;
        // 块大小为0或介质放不下目录头时得到无效的几何参数
        let blocks = match block_size {
            0 => 0,
            _ => 1 + medium_len.saturating_sub(header_len) / block_size,
        };
        let blocks = if blocks > 256 { 256 } else { blocks };
        Self::new(block_size, blocks, max_files, max_models)
    }

    /// 目录头字节数
    #[inline]
    pub const fn header_len(&self) -> usize {
        Header::FIXED_LEN + DirEnt::SIZE * self.max_files
    }

    /// 每块可存放的数据字节数
    #[inline]
    pub const fn payload(&self) -> usize {
        self.block_size - LINK_SIZE
    }

    /// 介质至少需要的字节数
    #[inline]
    pub const fn medium_len(&self) -> usize {
        self.header_len() + (self.blocks - 1) * self.block_size
    }

    /// 可用块总数
    #[inline]
    pub const fn usable_blocks(&self) -> usize {
        self.blocks - 1
    }

    #[inline]
    pub const fn model_file(&self, n: usize) -> usize {
        1 + n
    }

    /// 暂存文件的文件号
    #[inline]
    pub const fn tmp_file(&self) -> usize {
        1 + self.max_models
    }

    /// 单字节块号、单字节头字段、12位文件大小都得装得下。
    pub fn is_valid(&self) -> bool {
        (2..=u8::MAX as usize).contains(&self.block_size)
            && (2..=256).contains(&self.blocks)
            && self.header_len() <= u8::MAX as usize
            && self.tmp_file() < self.max_files
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_layout() {
        let geo = Geometry::REFERENCE;
        assert_eq!(128, geo.header_len());
        assert_eq!(256, geo.blocks);
        assert_eq!(127, geo.payload());
        assert_eq!(32 * 1024, geo.medium_len());
        assert_eq!(33, geo.tmp_file());
        assert!(geo.is_valid());
    }

    #[test]
    fn rejects_unaddressable() {
        assert!(!Geometry::new(128, 300, 41, 32).is_valid());
        assert!(!Geometry::new(1, 16, 41, 32).is_valid());
        assert!(!Geometry::new(4, 16, 41, 40).is_valid());
        assert!(!Geometry::new(4, 16, 100, 32).is_valid());
        assert!(!Geometry::for_medium(0, 1024, 41, 32).is_valid());
        assert!(!Geometry::for_medium(128, 64, 41, 32).is_valid());
    }
}
