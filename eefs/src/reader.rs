//! # 读取层
//!
//! [`FileReader`]按链顺序读出文件的原始字节，
//! [`RlcReader`]在其上叠加游程解码。

use crate::rlc::RlcDecoder;
use crate::{BlockId, EeFs, Error};

/// 顺序读取一个文件。
///
/// 文件大小在打开时确定，之后的读取不会越过它。
#[derive(Debug, Clone)]
pub struct FileReader {
    file_id: usize,
    /// 已读出的字节数
    pos: usize,
    size: usize,
    /// 当前块
    curr: BlockId,
    /// 当前块内的偏移
    ofs: usize,
}

impl FileReader {
    /// 打开文件，同时清除粘滞的写入错误。
    pub fn open(fs: &mut EeFs, file_id: usize) -> Result<Self, Error> {
        let dirent = fs
            .dirent(file_id)
            .filter(|dirent| dirent.exists())
            .ok_or(Error::NotFound)?;
        fs.clear_write_err();

        Ok(Self {
            file_id,
            pos: 0,
            size: dirent.size(),
            curr: dirent.start,
            ofs: 0,
        })
    }

    /// 读取至多`buf.len()`字节，返回读到的字节数，读完后返回0。
    pub fn read(&mut self, fs: &EeFs, buf: &mut [u8]) -> usize {
        let store = fs.store();
        let payload = fs.geometry().payload();
        let want = buf.len().min(self.size - self.pos);
        let mut done = 0;

        while done < want {
            if self.ofs == payload {
                let next = store.link(self.curr);
                if !store.contains(next) {
                    log::warn!("file {} ends early at {}", self.file_id, self.pos);
                    break;
                }
                self.curr = next;
                self.ofs = 0;
            }
            if !store.contains(self.curr) {
                break;
            }

            let n = (payload - self.ofs).min(want - done);
            store.read_payload(self.curr, self.ofs, &mut buf[done..done + n]);
            self.ofs += n;
            self.pos += n;
            done += n;
        }

        done
    }

    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }
}

/// 读取游程编码的文件，得到解码后的字节
#[derive(Debug, Clone)]
pub struct RlcReader {
    file: FileReader,
    decoder: RlcDecoder,
}

impl RlcReader {
    pub fn open(fs: &mut EeFs, file_id: usize) -> Result<Self, Error> {
        Ok(Self {
            file: FileReader::open(fs, file_id)?,
            decoder: RlcDecoder::default(),
        })
    }

    /// 解码至多`buf.len()`字节，返回解码出的字节数
    pub fn read(&mut self, fs: &EeFs, buf: &mut [u8]) -> usize {
        self.decoder.decode(buf, |chunk| self.file.read(fs, chunk))
    }

    /// 编码流中遇到了非法控制字节，之后的内容已被丢弃
    #[inline]
    pub fn is_broken(&self) -> bool {
        self.decoder.is_broken()
    }
}
