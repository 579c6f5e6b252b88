//! # 文件系统层
//!
//! [`EeFs`]持有介质、目录头的内存副本与空闲块计数，
//! 目录的任何修改都先改副本，再把涉及的字节写回介质。

use alloc::sync::Arc;

use block_dev::BlockDevice;

use crate::layout::{DirEnt, FileType, Header};
use crate::{BlockId, BlockStore, Error, Geometry};

#[derive(Debug)]
pub struct EeFs {
    store: BlockStore,
    header: Header,
    /// 空闲链表上的块数，由格式化与检查程序重新计算
    free_blocks: usize,
    /// 粘滞的写入错误
    write_err: Option<Error>,
    /// 有写入事务在进行
    busy: bool,
    /// 挂载时介质被重新格式化
    mount_err: Option<Error>,
}

impl EeFs {
    /// 格式化介质：全部块串成空闲链表，目录清空。
    pub fn format(dev: Arc<dyn BlockDevice>, geo: Geometry) -> Self {
        let store = BlockStore::new(dev, geo);
        let mut fs = Self {
            header: Header::new(&geo),
            store,
            free_blocks: 0,
            write_err: None,
            busy: false,
            mount_err: None,
        };
        fs.reformat();
        fs
    }

    /// 挂载介质：目录头不认识就格式化，否则运行检查程序。
    ///
    /// 介质被重新格式化（全部文件丢失）时，[`EeFs::mount_errno`]返回[`Error::Corrupt`]。
    pub fn open(dev: Arc<dyn BlockDevice>, geo: Geometry) -> Self {
        let mut fs = Self::load(dev, geo);
        if !fs.header.is_valid(&geo) {
            log::warn!("unrecognized header, formatting");
            fs.reformat();
            fs.mount_err = Some(Error::Corrupt);
            return fs;
        }

        match fs.check() {
            Ok(free) => log::debug!("mounted with {free} free blocks"),
            Err(err) => fs.mount_err = Some(err),
        }
        fs
    }

    /// 只读入目录头，空闲块数按空闲链表数出。
    ///
    /// 此时的目录尚不可信，应先调用[`EeFs::check`]。
    pub fn load(dev: Arc<dyn BlockDevice>, geo: Geometry) -> Self {
        let store = BlockStore::new(dev, geo);
        let mut raw = alloc::vec![0; geo.header_len()];
        store.read_header(&mut raw);

        let mut fs = Self {
            header: Header::parse(&raw, geo.max_files),
            store,
            free_blocks: 0,
            write_err: None,
            busy: false,
            mount_err: None,
        };
        let free = fs.free_chain().count();
        fs.free_blocks = free;
        fs
    }

    /// 挂载时发生的错误；为[`Error::Corrupt`]时介质已被重新格式化
    #[inline]
    pub fn mount_errno(&self) -> Option<Error> {
        self.mount_err
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        self.store.geometry()
    }

    #[inline]
    pub fn store(&self) -> &BlockStore {
        &self.store
    }

    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// 越界的文件号返回`None`
    #[inline]
    pub fn dirent(&self, file_id: usize) -> Option<DirEnt> {
        self.header.files.get(file_id).copied()
    }

    pub fn exists(&self, file_id: usize) -> bool {
        self.dirent(file_id).is_some_and(|dirent| dirent.exists())
    }

    /// 文件的逻辑大小，不存在的文件为0
    pub fn size(&self, file_id: usize) -> usize {
        self.dirent(file_id).map_or(0, |dirent| dirent.size())
    }

    pub fn file_type(&self, file_id: usize) -> Option<FileType> {
        self.dirent(file_id).and_then(|dirent| dirent.file_type())
    }

    #[inline]
    pub fn free_blocks(&self) -> usize {
        self.free_blocks
    }

    /// 空闲块可以容纳的数据字节数
    #[inline]
    pub fn free_bytes(&self) -> usize {
        self.free_blocks * self.geometry().payload()
    }

    /// 最近一次写入的错误，打开文件或开始写入时清除
    #[inline]
    pub fn write_errno(&self) -> Option<Error> {
        self.write_err
    }

    #[inline]
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// 删除文件：先提交空目录项，再把整条链还给空闲链表。
    pub fn rm(&mut self, file_id: usize) -> Result<(), Error> {
        if self.busy {
            return Err(Error::InProgress);
        }
        let dirent = self
            .dirent(file_id)
            .filter(DirEnt::exists)
            .ok_or(Error::NotFound)?;

        self.commit_dirent(file_id, DirEnt::default());
        let blocks = dirent.size().div_ceil(self.geometry().payload());
        self.release_chain(dirent.start, blocks)?;
        log::debug!("rm file={file_id} start={}", dirent.start);

        Ok(())
    }

    /// 交换两个目录项。
    ///
    /// 两条链都不动，目录头中覆盖两个目录项的那一段一次写回。
    pub fn swap(&mut self, a: usize, b: usize) -> Result<(), Error> {
        if self.busy {
            return Err(Error::InProgress);
        }
        if a >= self.header.files.len() || b >= self.header.files.len() {
            return Err(Error::NotFound);
        }
        if a == b {
            return Ok(());
        }

        self.header.files.swap(a, b);
        let (lo, hi) = (a.min(b), a.max(b));
        let start = Header::dirent_offset(lo);
        let end = Header::dirent_offset(hi) + DirEnt::SIZE;
        self.store
            .write_header(start, &self.header.to_bytes()[start..end]);
        log::debug!("swap file={a} file={b}");

        Ok(())
    }
}

impl EeFs {
    /// 重建整个介质：块`i`链向`i + 1`，最后一块链向空。
    pub(crate) fn reformat(&mut self) {
        let geo = *self.geometry();
        let ids: alloc::vec::Vec<BlockId> = self.store.ids().collect();
        for pair in ids.windows(2) {
            self.store.set_link(pair[0], pair[1]);
        }
        if let Some(&last) = ids.last() {
            self.store.set_link(last, BlockId::NULL);
        }

        self.header = Header::new(&geo);
        self.header.free_list = BlockId::FIRST;
        self.free_blocks = geo.usable_blocks();
        self.flush_header();
        log::info!(
            "formatted: {} blocks of {} bytes",
            geo.usable_blocks(),
            geo.block_size
        );
    }

    /// 提交点：改写一个目录项并写回介质
    pub(crate) fn commit_dirent(&mut self, file_id: usize, dirent: DirEnt) {
        self.header.files[file_id] = dirent;
        self.store
            .write_header(Header::dirent_offset(file_id), &dirent.to_bytes());
    }

    pub(crate) fn flush_header(&self) {
        self.store.write_header(0, &self.header.to_bytes());
    }

    pub(crate) fn flush_free_list(&self) {
        self.store
            .write_header(Header::FREE_LIST_OFFSET, &[self.header.free_list.into()]);
    }

    #[inline]
    pub(crate) fn free_head(&self) -> BlockId {
        self.header.free_list
    }

    #[inline]
    pub(crate) fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    #[inline]
    pub(crate) fn set_free_blocks(&mut self, count: usize) {
        self.free_blocks = count;
    }

    #[inline]
    pub(crate) fn adjust_free_blocks(&mut self, claimed: usize, released: usize) {
        self.free_blocks = self
            .free_blocks
            .saturating_add(released)
            .saturating_sub(claimed);
    }

    #[inline]
    pub(crate) fn set_write_err(&mut self, err: Error) {
        self.write_err = Some(err);
    }

    #[inline]
    pub(crate) fn clear_write_err(&mut self) {
        self.write_err = None;
    }

    #[inline]
    pub(crate) fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }
}

#[cfg(test)]
mod tests {
    use block_dev::RamDisk;

    use super::*;

    fn fresh() -> (Arc<RamDisk>, EeFs) {
        let geo = Geometry::new(4, 8, 41, 32);
        let disk = Arc::new(RamDisk::new(geo.medium_len()));
        (disk.clone(), EeFs::format(disk, geo))
    }

    #[test]
    fn format_threads_free_list() {
        let (_, fs) = fresh();
        assert_eq!(7, fs.free_blocks());
        assert_eq!(7 * 3, fs.free_bytes());
        let free: alloc::vec::Vec<u8> = fs.free_chain().map(u8::from).collect();
        assert_eq!(free, [1, 2, 3, 4, 5, 6, 7]);
        assert!((0..41).all(|id| !fs.exists(id)));
    }

    #[test]
    fn open_reads_back_header() {
        let (disk, mut fs) = fresh();
        let blk = fs.claim().unwrap();
        fs.commit_dirent(2, DirEnt::new(blk, 3, FileType::Model));

        let reopened = EeFs::load(disk, *fs.geometry());
        assert_eq!(fs.header(), reopened.header());
    }

    #[test]
    fn swap_exchanges_descriptors_only() {
        let (disk, mut fs) = fresh();
        let a = fs.claim().unwrap();
        let b = fs.claim().unwrap();
        fs.commit_dirent(1, DirEnt::new(a, 2, FileType::Model));
        fs.commit_dirent(5, DirEnt::new(b, 3, FileType::Model));
        let writes = disk.writes();

        fs.swap(1, 5).unwrap();
        assert_eq!(writes + 1, disk.writes());
        assert_eq!(Some(DirEnt::new(b, 3, FileType::Model)), fs.dirent(1));
        assert_eq!(Some(DirEnt::new(a, 2, FileType::Model)), fs.dirent(5));

        let reopened = EeFs::load(disk, *fs.geometry());
        assert_eq!(fs.header(), reopened.header());
    }

    #[test]
    fn open_formats_blank_medium() {
        let geo = Geometry::new(4, 8, 41, 32);
        let disk = Arc::new(RamDisk::new(geo.medium_len()));
        let fs = EeFs::open(disk, geo);
        assert!(fs.header().is_valid(&geo));
        assert_eq!(7, fs.free_blocks());
        assert_eq!(Some(Error::Corrupt), fs.mount_errno());
    }

    #[test]
    fn open_reports_reformat() {
        let (disk, mut fs) = fresh();
        let a = fs.claim().unwrap();
        fs.commit_dirent(1, DirEnt::new(a, 3, FileType::Model));
        fs.commit_dirent(2, DirEnt::new(a, 3, FileType::Model));

        let fs = EeFs::open(disk, *fs.geometry());
        assert_eq!(Some(Error::Corrupt), fs.mount_errno());
        assert!(!fs.exists(1));
        assert!(!fs.exists(2));
    }

    #[test]
    fn open_clean_medium() {
        let (disk, mut fs) = fresh();
        let a = fs.claim().unwrap();
        fs.store().set_link(a, BlockId::NULL);
        fs.commit_dirent(1, DirEnt::new(a, 3, FileType::Model));

        let fs = EeFs::open(disk, *fs.geometry());
        assert_eq!(None, fs.mount_errno());
        assert!(fs.exists(1));
        assert_eq!(6, fs.free_blocks());
    }

    #[test]
    fn load_counts_free_list() {
        let (disk, mut fs) = fresh();
        fs.claim().unwrap();

        let mut loaded = EeFs::load(disk, *fs.geometry());
        assert_eq!(6, loaded.free_blocks());
        loaded.claim().unwrap();
        assert_eq!(5, loaded.free_blocks());
    }

    #[test]
    fn rm_missing_file() {
        let (_, mut fs) = fresh();
        assert_eq!(Err(Error::NotFound), fs.rm(3));
        assert_eq!(Err(Error::NotFound), fs.rm(41));
        assert_eq!(Err(Error::NotFound), fs.swap(0, 41));
    }

    #[test]
    fn busy_blocks_directory_changes() {
        let (_, mut fs) = fresh();
        fs.set_busy(true);
        assert_eq!(Err(Error::InProgress), fs.rm(0));
        assert_eq!(Err(Error::InProgress), fs.swap(0, 1));
    }
}
