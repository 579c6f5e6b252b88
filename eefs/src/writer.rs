//! # 写入层
//!
//! 写入是一个可恢复的状态机，每次[`Writer::poll`]推进一步，
//! 每步至多写三次介质。新内容写进一条新链，写完后：
//!
//! 1. 旧链接回空闲链表（[`WriteStep::FreeUnused1`]、[`WriteStep::FreeUnused2`]）
//! 2. 目录项指向新链（[`WriteStep::FinalDirent`]、[`WriteStep::TmpDirent`]）
//!
//! 提交之前掉电，旧目录项与旧链都还在，检查程序会把新链当作无主块回收。

use alloc::vec::Vec;

use crate::layout::{DirEnt, FileType};
use crate::reader::FileReader;
use crate::rlc::RlcEncoder;
use crate::{BlockId, EeFs, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteStep {
    /// 没有写入事务
    #[default]
    Idle,
    /// 向当前块写入暂存的数据，并决定下一步
    Start,
    /// 分配第一块
    FirstLink,
    /// 分配下一块
    NextLink1,
    /// 把下一块挂到链尾
    NextLink2,
    /// 旧链尾接到空闲链表头
    FreeUnused1,
    /// 空闲链表头改为旧链头
    FreeUnused2,
    /// 提交目录项
    FinalDirent,
    /// 提交暂存文件的目录项
    TmpDirent,
}

#[derive(Debug)]
enum Source {
    /// 调用者逐段追加原始字节
    Stream { closed: bool },
    /// 边写边编码
    Rlc(RlcEncoder),
}

/// 写入引擎，同一时刻只有一个写入事务。
#[derive(Debug, Default)]
pub struct Writer {
    step: WriteStep,
    file_id: usize,
    typ: FileType,
    source: Option<Source>,
    /// 等待写入块中的字节
    staged: Vec<u8>,
    /// 新链的头与尾
    head: BlockId,
    tail: BlockId,
    /// 链尾块内的偏移
    ofs: usize,
    /// 已写入新链的字节数
    size: usize,
    /// 新链的块数
    blocks: usize,
    /// 已分配、尚未挂上链尾的块
    next: BlockId,
    /// 被替换的旧链及其块数
    old: BlockId,
    old_blocks: usize,
    /// 同步模式下调用本身就推进状态机
    sync: bool,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以游程编码写入整个文件。
    ///
    /// `sync`为假时只开始事务，由[`Writer::poll`]逐步完成。
    pub fn write_rlc(
        &mut self,
        fs: &mut EeFs,
        file_id: usize,
        typ: FileType,
        data: &[u8],
        sync: bool,
    ) -> Result<(), Error> {
        let source = Source::Rlc(RlcEncoder::new(data.to_vec()));
        self.begin(fs, file_id, typ, source, sync)?;
        if sync {
            self.flush(fs)
        } else {
            Ok(())
        }
    }

    /// 开始写入原始字节，之后用[`Writer::write`]追加，[`Writer::close`]结束。
    pub fn create(
        &mut self,
        fs: &mut EeFs,
        file_id: usize,
        typ: FileType,
        sync: bool,
    ) -> Result<(), Error> {
        self.begin(fs, file_id, typ, Source::Stream { closed: false }, sync)
    }

    pub fn write(&mut self, fs: &mut EeFs, data: &[u8]) -> Result<(), Error> {
        if !matches!(self.source, Some(Source::Stream { closed: false })) {
            return Err(Error::NotOpen);
        }
        self.staged.extend_from_slice(data);

        if self.sync {
            while self.is_writing() && !(self.step == WriteStep::Start && self.staged.is_empty()) {
                self.poll(fs);
            }
            if let Some(err) = fs.write_errno() {
                return Err(err);
            }
        }
        Ok(())
    }

    #[inline]
    pub fn write1(&mut self, fs: &mut EeFs, byte: u8) -> Result<(), Error> {
        self.write(fs, &[byte])
    }

    /// 不再追加数据；同步模式下一直写到提交为止。
    pub fn close(&mut self, fs: &mut EeFs) -> Result<(), Error> {
        match &mut self.source {
            Some(Source::Stream { closed }) if !*closed => *closed = true,
            _ => return Err(Error::NotOpen),
        }

        if self.sync { self.flush(fs) } else { Ok(()) }
    }

    /// 把剩余步骤全部做完，未关闭的流式写入随之关闭。
    pub fn flush(&mut self, fs: &mut EeFs) -> Result<(), Error> {
        if let Some(Source::Stream { closed }) = &mut self.source {
            *closed = true;
        }
        while self.is_writing() {
            self.poll(fs);
        }

        match fs.write_errno() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// 推进一步，返回接下来的步骤
    pub fn poll(&mut self, fs: &mut EeFs) -> WriteStep {
        let step = self.step;
        match step {
            WriteStep::Idle => {}
            WriteStep::Start => self.start(fs),
            WriteStep::FirstLink => {
                if let Some(blk) = self.claim(fs) {
                    self.head = blk;
                    self.tail = blk;
                    self.blocks = 1;
                    self.ofs = 0;
                    self.write_chunk(fs);
                    self.step = WriteStep::Start;
                }
            }
            WriteStep::NextLink1 => {
                if let Some(blk) = self.claim(fs) {
                    self.next = blk;
                    self.step = WriteStep::NextLink2;
                }
            }
            WriteStep::NextLink2 => {
                fs.store().set_link(self.tail, self.next);
                self.tail = self.next;
                self.next = BlockId::NULL;
                self.blocks += 1;
                self.ofs = 0;
                self.write_chunk(fs);
                self.step = WriteStep::Start;
            }
            WriteStep::FreeUnused1 => match fs.chain_tail(self.old, self.old_blocks) {
                Ok(tail) => {
                    fs.store().set_link(tail, fs.free_head());
                    self.step = WriteStep::FreeUnused2;
                }
                Err(_) => {
                    // 旧链已损坏，留给检查程序
                    self.step = self.commit_step(fs);
                }
            },
            WriteStep::FreeUnused2 => {
                fs.header_mut().free_list = self.old;
                fs.flush_free_list();
                fs.adjust_free_blocks(0, self.old_blocks);
                self.step = self.commit_step(fs);
            }
            WriteStep::FinalDirent | WriteStep::TmpDirent => {
                let dirent = if self.head.is_null() {
                    DirEnt::default()
                } else {
                    DirEnt::new(self.head, self.size, self.typ)
                };
                fs.commit_dirent(self.file_id, dirent);
                log::debug!("file {} committed: {dirent:?}", self.file_id);
                self.finish(fs);
            }
        }

        if step != self.step {
            log::debug!("file {}: {step:?} -> {:?}", self.file_id, self.step);
        }
        self.step
    }

    #[inline]
    pub fn is_writing(&self) -> bool {
        self.step != WriteStep::Idle
    }

    #[inline]
    pub fn step(&self) -> WriteStep {
        self.step
    }

    /// 把`src`的原始字节经暂存文件复制到`dst`。
    ///
    /// 复制完成后交换`dst`与暂存文件的目录项，再删除暂存文件，
    /// 因此任何时刻掉电，`dst`要么是旧内容，要么是新内容。
    pub fn copy(&mut self, fs: &mut EeFs, dst: usize, src: usize) -> Result<(), Error> {
        let tmp = fs.geometry().tmp_file();
        if dst == tmp {
            return Ok(());
        }
        if dst >= fs.geometry().max_files {
            return Err(Error::NotFound);
        }

        let mut reader = FileReader::open(fs, src)?;
        let typ = fs.file_type(src).unwrap_or(FileType::Model);
        self.create(fs, tmp, typ, true)?;

        let mut buf = [0; 32];
        loop {
            let n = reader.read(fs, &mut buf);
            if n == 0 {
                break;
            }
            self.write(fs, &buf[..n])?;
        }
        self.close(fs)?;

        fs.swap(dst, tmp)?;
        if fs.exists(tmp) {
            fs.rm(tmp)?;
        }
        Ok(())
    }
}

impl Writer {
    fn begin(
        &mut self,
        fs: &mut EeFs,
        file_id: usize,
        typ: FileType,
        source: Source,
        sync: bool,
    ) -> Result<(), Error> {
        if self.is_writing() || fs.is_busy() {
            return Err(Error::InProgress);
        }
        if typ == FileType::Unused {
            return Err(Error::InvalidType);
        }
        let old = fs.dirent(file_id).ok_or(Error::NotFound)?;
        let (old_head, old_blocks) = if old.exists() {
            (old.start, old.size().div_ceil(fs.geometry().payload()))
        } else {
            (BlockId::NULL, 0)
        };

        fs.clear_write_err();
        fs.set_busy(true);
        *self = Self {
            step: WriteStep::Start,
            file_id,
            typ,
            source: Some(source),
            old: old_head,
            old_blocks,
            sync,
            ..Self::default()
        };
        log::debug!("file {file_id}: begin write over {old:?}");

        Ok(())
    }

    fn start(&mut self, fs: &mut EeFs) {
        let payload = fs.geometry().payload();
        if let Some(Source::Rlc(encoder)) = &mut self.source {
            while self.staged.len() < payload && encoder.encode_next(&mut self.staged) {}
        }

        if self.staged.is_empty() {
            if self.is_exhausted() {
                self.step = if self.old.is_null() {
                    self.commit_step(fs)
                } else {
                    WriteStep::FreeUnused1
                };
            }
            return;
        }

        if self.size + self.staged.len() > DirEnt::MAX_SIZE {
            log::error!("file {} exceeds {} bytes", self.file_id, DirEnt::MAX_SIZE);
            self.abort(fs, Error::Full);
        } else if self.head.is_null() {
            self.step = WriteStep::FirstLink;
        } else if self.ofs == payload {
            self.step = WriteStep::NextLink1;
        } else {
            self.write_chunk(fs);
        }
    }

    /// 暂存区中尽可能多的字节写进链尾块
    fn write_chunk(&mut self, fs: &EeFs) {
        let n = (fs.geometry().payload() - self.ofs).min(self.staged.len());
        fs.store()
            .write_payload(self.tail, self.ofs, &self.staged[..n]);
        self.staged.drain(..n);
        self.ofs += n;
        self.size += n;
    }

    /// 分配一块并清空其链接字段，空间不足时中止事务
    fn claim(&mut self, fs: &mut EeFs) -> Option<BlockId> {
        match fs.claim() {
            Ok(blk) => {
                fs.store().set_link(blk, BlockId::NULL);
                Some(blk)
            }
            Err(err) => {
                self.abort(fs, err);
                None
            }
        }
    }

    fn is_exhausted(&self) -> bool {
        match &self.source {
            Some(Source::Stream { closed }) => *closed,
            Some(Source::Rlc(encoder)) => encoder.is_done(),
            None => true,
        }
    }

    fn commit_step(&self, fs: &EeFs) -> WriteStep {
        if self.file_id == fs.geometry().tmp_file() {
            WriteStep::TmpDirent
        } else {
            WriteStep::FinalDirent
        }
    }

    /// 归还新链，旧文件保持不变
    fn abort(&mut self, fs: &mut EeFs, err: Error) {
        log::error!("file {}: write aborted: {err}", self.file_id);
        if !self.next.is_null() {
            fs.release(self.next);
        }
        if !self.head.is_null() && fs.release_chain(self.head, self.blocks).is_err() {
            log::error!("file {}: new chain lost", self.file_id);
        }
        fs.set_write_err(err);
        self.finish(fs);
    }

    fn finish(&mut self, fs: &mut EeFs) {
        fs.set_busy(false);
        *self = Self::default();
    }
}
