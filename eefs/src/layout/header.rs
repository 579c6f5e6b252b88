use alloc::vec::Vec;

use crate::layout::DirEnt;
use crate::{BlockId, EEFS_VERS, Geometry};

/// 目录头，位于介质开头，运行时在内存中保留一份副本。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    /// 目录头字节数
    pub my_size: u8,
    /// 空闲链表头
    pub free_list: BlockId,
    pub block_size: u8,
    spare: u8,
    pub files: Vec<DirEnt>,
}

impl Header {
    /// 目录项之前的固定字段字节数
    pub const FIXED_LEN: usize = 5;

    pub const FREE_LIST_OFFSET: usize = 2;

    /// 刚格式化的目录头：没有文件，空闲链表为空
    pub fn new(geo: &Geometry) -> Self {
        Self {
            version: EEFS_VERS,
            my_size: geo.header_len() as u8,
            free_list: BlockId::NULL,
            block_size: geo.block_size as u8,
            spare: 0,
            files: alloc::vec![DirEnt::default(); geo.max_files],
        }
    }

    pub fn parse(bytes: &[u8], max_files: usize) -> Self {
        assert!(bytes.len() >= Self::FIXED_LEN + max_files * DirEnt::SIZE);
        let files = bytes[Self::FIXED_LEN..]
            .chunks_exact(DirEnt::SIZE)
            .take(max_files)
            .map(|raw| DirEnt::from_bytes(raw.try_into().expect("chunk of DirEnt::SIZE")))
            .collect();

        Self {
            version: bytes[0],
            my_size: bytes[1],
            free_list: bytes[2].into(),
            block_size: bytes[3],
            spare: bytes[4],
            files,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::FIXED_LEN + self.files.len() * DirEnt::SIZE);
        bytes.extend_from_slice(&[
            self.version,
            self.my_size,
            self.free_list.into(),
            self.block_size,
            self.spare,
        ]);
        for dirent in &self.files {
            bytes.extend_from_slice(&dirent.to_bytes());
        }
        bytes
    }

    /// 第`file_id`个目录项在目录头内的偏移
    #[inline]
    pub const fn dirent_offset(file_id: usize) -> usize {
        Self::FIXED_LEN + file_id * DirEnt::SIZE
    }

    /// 固定字段是否与几何参数相符
    pub fn is_valid(&self, geo: &Geometry) -> bool {
        self.version == EEFS_VERS
            && self.my_size as usize == geo.header_len()
            && self.block_size as usize == geo.block_size
            && (self.free_list.is_null() || self.free_list.index() < geo.blocks)
    }
}
