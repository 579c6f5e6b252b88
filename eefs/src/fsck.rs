//! # 一致性检查
//!
//! 文件链优先于空闲链表：先标记每个文件占用的块，再沿空闲链表走，
//! 最后把谁都不属于的块接回空闲链表。
//!
//! 目录头或文件链的问题无法修复，只能重新格式化；
//! 空闲链表的问题就地修复，不算损坏。

use alloc::vec;
use alloc::vec::Vec;

use enumflags2::{BitFlags, bitflags};

use crate::layout::FileType;
use crate::{BlockId, EeFs, Error};

#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Damage {
    /// 版本、大小、块大小或空闲链表头不对
    Header = 0b0001,
    /// 文件链越界、成环、与其他文件共用块，或比文件大小短
    FileChain = 0b0010,
    /// 空闲链表越界、成环，或经过文件占用的块
    FreeList = 0b0100,
    /// 有块既不属于文件也不在空闲链表上
    Leaked = 0b1000,
    /// 文件链尾的链接字段不为空，写入在提交前中断时会留下
    LooseTail = 0b1_0000,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Owner {
    Nobody,
    File(usize),
    Free,
}

/// 扫描的结果
#[derive(Debug)]
struct Scan {
    damage: BitFlags<Damage>,
    owners: Vec<Owner>,
    /// 链接字段需要清空的文件链尾
    loose_tails: Vec<BlockId>,
    /// 空闲链表上最后一个完好的块
    free_tail: BlockId,
    free_count: usize,
}

impl EeFs {
    /// 检查并修复，返回空闲块数。
    ///
    /// 目录头或文件链损坏时介质被重新格式化，返回[`Error::Corrupt`]。
    pub fn check(&mut self) -> Result<usize, Error> {
        if self.is_busy() {
            return Err(Error::InProgress);
        }

        let scan = self.scan();
        if scan.damage.intersects(Damage::Header | Damage::FileChain) {
            log::error!("{:?}, formatting", scan.damage);
            self.reformat();
            return Err(Error::Corrupt);
        }

        let mut free = scan.free_count;
        if !scan.damage.is_empty() {
            log::warn!("repairing {:?}", scan.damage);

            for &tail in &scan.loose_tails {
                self.store().set_link(tail, BlockId::NULL);
            }

            if scan.damage.contains(Damage::FreeList) {
                if scan.free_tail.is_null() {
                    self.header_mut().free_list = BlockId::NULL;
                } else {
                    self.store().set_link(scan.free_tail, BlockId::NULL);
                }
            }

            let leaked: Vec<BlockId> = self
                .store()
                .ids()
                .rev()
                .filter(|blk| scan.owners[blk.index()] == Owner::Nobody)
                .collect();
            for blk in leaked {
                self.store().set_link(blk, self.free_head());
                self.header_mut().free_list = blk;
                free += 1;
            }
            if scan.damage.intersects(Damage::FreeList | Damage::Leaked) {
                self.flush_free_list();
            }
        }

        self.set_free_blocks(free);
        Ok(free)
    }

    /// 只检查不修复
    pub fn inspect(&self) -> BitFlags<Damage> {
        self.scan().damage
    }

    fn scan(&self) -> Scan {
        let geo = *self.geometry();
        let mut scan = Scan {
            damage: BitFlags::empty(),
            owners: vec![Owner::Nobody; geo.blocks],
            loose_tails: Vec::new(),
            free_tail: BlockId::NULL,
            free_count: 0,
        };

        if !self.header().is_valid(&geo) {
            scan.damage |= Damage::Header;
            return scan;
        }

        for file_id in 0..geo.max_files {
            if !self.mark_file(file_id, &mut scan) {
                log::error!("file {file_id} is broken: {:?}", self.dirent(file_id));
                scan.damage |= Damage::FileChain;
            }
        }

        let mut blk = self.free_head();
        while !blk.is_null() {
            if !self.store().contains(blk) || scan.owners[blk.index()] != Owner::Nobody {
                log::warn!("free list cut at {blk}");
                scan.damage |= Damage::FreeList;
                break;
            }
            scan.owners[blk.index()] = Owner::Free;
            scan.free_tail = blk;
            scan.free_count += 1;
            blk = self.store().link(blk);
        }

        if self
            .store()
            .ids()
            .any(|blk| scan.owners[blk.index()] == Owner::Nobody)
        {
            scan.damage |= Damage::Leaked;
        }
        if !scan.loose_tails.is_empty() {
            scan.damage |= Damage::LooseTail;
        }

        scan
    }

    /// 标记文件占用的块，文件完好时返回`true`。
    ///
    /// 链长由文件大小决定；链尾的链接字段不为空时记下，修复时清空。
    fn mark_file(&self, file_id: usize, scan: &mut Scan) -> bool {
        let Some(dirent) = self.dirent(file_id) else {
            return true;
        };

        match dirent.file_type() {
            None => return false,
            Some(FileType::Unused) => return !dirent.exists(),
            Some(_) if !dirent.exists() => return true,
            Some(_) => {}
        }

        let mut blk = dirent.start;
        let mut tail = blk;
        for _ in 0..dirent.size().div_ceil(self.geometry().payload()) {
            if !self.store().contains(blk) || scan.owners[blk.index()] != Owner::Nobody {
                return false;
            }
            scan.owners[blk.index()] = Owner::File(file_id);
            tail = blk;
            blk = self.store().link(blk);
        }

        if !blk.is_null() {
            scan.loose_tails.push(tail);
        }
        true
    }
}
