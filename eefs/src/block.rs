//! # 块存储层
//!
//! 块号到介质地址的映射。每个块末尾的一个字节是链接字段，
//! 存放链上下一块的块号，文件链与空闲链表都靠它串起来。

use alloc::sync::Arc;

use block_dev::BlockDevice;
use derive_more::{Display, From, Into};

use crate::{Geometry, LINK_SIZE};

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, From, Into)]
#[repr(transparent)]
pub struct BlockId(u8);

impl BlockId {
    /// 链表结尾，也表示“无块”
    pub const NULL: Self = Self(0);

    /// 最小的可用块号
    pub const FIRST: Self = Self(1);

    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// 以块为单位读写介质
#[derive(Debug, Clone)]
pub struct BlockStore {
    dev: Arc<dyn BlockDevice>,
    geo: Geometry,
}

impl BlockStore {
    pub fn new(dev: Arc<dyn BlockDevice>, geo: Geometry) -> Self {
        assert!(geo.is_valid(), "unaddressable geometry: {geo:?}");
        assert!(
            dev.capacity() >= geo.medium_len(),
            "medium of {} bytes cannot hold {} bytes",
            dev.capacity(),
            geo.medium_len()
        );
        Self { dev, geo }
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geo
    }

    /// `blk`是否为可用块号
    #[inline]
    pub fn contains(&self, blk: BlockId) -> bool {
        !blk.is_null() && blk.index() < self.geo.blocks
    }

    /// 全部可用块号，升序
    pub fn ids(&self) -> impl DoubleEndedIterator<Item = BlockId> + use<> {
        (BlockId::FIRST.0..=(self.geo.blocks - 1) as u8).map(BlockId)
    }

    pub fn link(&self, blk: BlockId) -> BlockId {
        let mut raw = [0; LINK_SIZE];
        self.dev.read(self.link_addr(blk), &mut raw);
        BlockId(raw[0])
    }

    pub fn set_link(&self, blk: BlockId, next: BlockId) {
        self.dev.write(self.link_addr(blk), &[next.0]);
    }

    pub fn read_payload(&self, blk: BlockId, offset: usize, buf: &mut [u8]) {
        assert!(offset + buf.len() <= self.geo.payload());
        self.dev.read(self.block_addr(blk) + offset, buf);
    }

    pub fn write_payload(&self, blk: BlockId, offset: usize, buf: &[u8]) {
        assert!(offset + buf.len() <= self.geo.payload());
        self.dev.write(self.block_addr(blk) + offset, buf);
    }

    pub fn read_header(&self, buf: &mut [u8]) {
        assert!(buf.len() <= self.geo.header_len());
        self.dev.read(0, buf);
    }

    /// 写入目录头中`offset`起的一段
    pub fn write_header(&self, offset: usize, bytes: &[u8]) {
        assert!(offset + bytes.len() <= self.geo.header_len());
        self.dev.write(offset, bytes);
    }
}

impl BlockStore {
    fn block_addr(&self, blk: BlockId) -> usize {
        assert!(self.contains(blk), "block {blk} out of range");
        self.geo.header_len() + (blk.index() - 1) * self.geo.block_size
    }

    #[inline]
    fn link_addr(&self, blk: BlockId) -> usize {
        self.block_addr(blk) + self.geo.payload()
    }
}

#[cfg(test)]
mod tests {
    use block_dev::RamDisk;

    use super::*;

    fn store() -> (Arc<RamDisk>, BlockStore) {
        let geo = Geometry::new(4, 8, 41, 32);
        let disk = Arc::new(RamDisk::new(geo.medium_len()));
        (disk.clone(), BlockStore::new(disk, geo))
    }

    #[test]
    fn link_is_block_trailer() {
        let (disk, store) = store();
        store.write_payload(BlockId::new(2), 0, &[7, 8, 9]);
        store.set_link(BlockId::new(2), BlockId::new(5));

        let image = disk.image();
        // 目录头128字节，块1占[128, 132)，块2占[132, 136)
        assert_eq!(&image[132..136], &[7, 8, 9, 5]);
        assert_eq!(BlockId::new(5), store.link(BlockId::new(2)));
    }

    #[test]
    fn ids_skip_null() {
        let (_, store) = store();
        let ids: alloc::vec::Vec<u8> = store.ids().map(u8::from).collect();
        assert_eq!(ids, [1, 2, 3, 4, 5, 6, 7]);
        assert!(!store.contains(BlockId::NULL));
        assert!(!store.contains(BlockId::new(8)));
    }

    #[test]
    #[should_panic]
    fn medium_too_small() {
        let geo = Geometry::new(4, 8, 41, 32);
        let disk = Arc::new(RamDisk::new(geo.medium_len() - 1));
        BlockStore::new(disk, geo);
    }
}
