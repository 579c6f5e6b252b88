//! # 空闲链表
//!
//! 未使用的块通过链接字段串成单链表，表头记录在目录头中。
//! 分配从表头摘下一块，释放则把块（或整条链）接回表头。

use crate::{BlockId, BlockStore, EeFs, Error};

impl EeFs {
    /// 从空闲链表摘下一块。
    ///
    /// 摘下的块仍保留旧的链接字段，调用者负责改写。
    pub fn claim(&mut self) -> Result<BlockId, Error> {
        let blk = self.free_head();
        if !self.store().contains(blk) {
            return Err(Error::Full);
        }

        let next = self.store().link(blk);
        self.header_mut().free_list = next;
        self.flush_free_list();
        self.adjust_free_blocks(1, 0);

        Ok(blk)
    }

    /// 把一块接到空闲链表头部。
    pub fn release(&mut self, blk: BlockId) {
        self.store().set_link(blk, self.free_head());
        self.header_mut().free_list = blk;
        self.flush_free_list();
        self.adjust_free_blocks(0, 1);
    }

    /// 把以`head`起始、共`count`块的链接到空闲链表头部。
    ///
    /// 只需两次写入：链尾的链接字段，以及目录头中的表头。
    pub fn release_chain(&mut self, head: BlockId, count: usize) -> Result<(), Error> {
        let tail = self.chain_tail(head, count)?;
        self.store().set_link(tail, self.free_head());
        self.header_mut().free_list = head;
        self.flush_free_list();
        self.adjust_free_blocks(0, count);

        Ok(())
    }

    /// 沿链走`count`块找到链尾。
    ///
    /// 文件链的长度由文件大小决定，链尾的链接字段不可信，因此不沿链走到空为止。
    pub fn chain_tail(&self, head: BlockId, count: usize) -> Result<BlockId, Error> {
        let store = self.store();
        if count == 0 || count > store.geometry().usable_blocks() {
            log::error!("chain from {head} cannot have {count} blocks");
            return Err(Error::Corrupt);
        }

        let mut blk = head;
        for i in 1..=count {
            if !store.contains(blk) {
                log::error!("chain from {head} broken at {blk} after {i} blocks");
                return Err(Error::Corrupt);
            }
            if i == count {
                break;
            }
            blk = store.link(blk);
        }

        Ok(blk)
    }

    /// 遍历以`head`起始的链
    #[inline]
    pub fn chain(&self, head: BlockId) -> Chain<'_> {
        Chain::new(self.store(), head)
    }

    /// 遍历空闲链表
    #[inline]
    pub fn free_chain(&self) -> Chain<'_> {
        self.chain(self.free_head())
    }
}

/// 沿链接字段前进的迭代器。
///
/// 遇到越界块号或走满块号空间就停下，不会陷入环中。
#[derive(Debug, Clone)]
pub struct Chain<'a> {
    store: &'a BlockStore,
    next: BlockId,
    left: usize,
}

impl<'a> Chain<'a> {
    fn new(store: &'a BlockStore, head: BlockId) -> Self {
        Self {
            store,
            next: head,
            left: store.geometry().usable_blocks(),
        }
    }
}

impl Iterator for Chain<'_> {
    type Item = BlockId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.left == 0 || !self.store.contains(self.next) {
            return None;
        }
        self.left -= 1;

        let blk = self.next;
        self.next = self.store.link(blk);
        Some(blk)
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;
    use alloc::vec::Vec;

    use block_dev::RamDisk;

    use crate::Geometry;

    use super::*;

    fn fresh(blocks: usize) -> EeFs {
        let geo = Geometry::new(4, blocks, 41, 32);
        EeFs::format(Arc::new(RamDisk::new(geo.medium_len())), geo)
    }

    #[test]
    fn claim_until_full() {
        let mut fs = fresh(4);
        let claimed: Vec<u8> = (0..3).map(|_| fs.claim().unwrap().into()).collect();
        assert_eq!(claimed, [1, 2, 3]);
        assert_eq!(0, fs.free_blocks());
        assert_eq!(Err(Error::Full), fs.claim());
    }

    #[test]
    fn release_goes_to_head() {
        let mut fs = fresh(4);
        let blk = fs.claim().unwrap();
        fs.release(blk);
        assert_eq!(3, fs.free_blocks());
        assert_eq!(blk, fs.free_head());
        assert_eq!(3, fs.free_chain().count());
    }

    #[test]
    fn release_whole_chain() {
        let mut fs = fresh(8);
        let a = fs.claim().unwrap();
        let b = fs.claim().unwrap();
        fs.store().set_link(a, b);
        fs.store().set_link(b, BlockId::NULL);
        assert_eq!(5, fs.free_blocks());

        assert_eq!(Ok(b), fs.chain_tail(a, 2));
        assert_eq!(Ok(()), fs.release_chain(a, 2));
        assert_eq!(7, fs.free_blocks());
        let free: Vec<BlockId> = fs.free_chain().collect();
        assert_eq!(&free[..3], &[a, b, BlockId::new(3)]);
    }

    #[test]
    fn tail_link_is_not_followed() {
        let mut fs = fresh(8);
        let a = fs.claim().unwrap();
        // 链尾仍指向空闲链表
        assert_eq!(Ok(a), fs.chain_tail(a, 1));
        assert_eq!(Ok(()), fs.release_chain(a, 1));
        assert_eq!(7, fs.free_blocks());
        assert_eq!(7, fs.free_chain().count());
    }

    #[test]
    fn short_chain_is_corruption() {
        let mut fs = fresh(8);
        let a = fs.claim().unwrap();
        fs.store().set_link(a, BlockId::NULL);

        assert_eq!(Err(Error::Corrupt), fs.chain_tail(a, 2));
        assert_eq!(Err(Error::Corrupt), fs.chain_tail(a, 0));
        assert_eq!(Err(Error::Corrupt), fs.release_chain(a, 8));
        assert_eq!(6, fs.free_blocks());
    }

    #[test]
    fn chain_walk_survives_cycle() {
        let mut fs = fresh(8);
        let a = fs.claim().unwrap();
        let b = fs.claim().unwrap();
        fs.store().set_link(a, b);
        fs.store().set_link(b, a);
        assert_eq!(7, fs.chain(a).count());
    }
}
