use std::cell::RefCell;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use block_dev::BlockDevice;
use send_wrapper::SendWrapper;

/// 以宿主机上的文件充当 EEPROM
#[derive(Debug)]
pub struct BlockFile {
    inner: SendWrapper<RefCell<File>>,
    len: usize,
}

impl BlockFile {
    pub fn new(fd: File, len: usize) -> Self {
        Self {
            inner: SendWrapper::new(RefCell::new(fd)),
            len,
        }
    }
}

impl BlockDevice for BlockFile {
    fn capacity(&self) -> usize {
        self.len
    }

    fn read(&self, addr: usize, buf: &mut [u8]) {
        let mut file = self.inner.borrow_mut();
        file.seek(SeekFrom::Start(addr as u64))
            .expect("seeking error");
        file.read_exact(buf).expect("image shorter than medium");
    }

    fn write(&self, addr: usize, buf: &[u8]) {
        let mut file = self.inner.borrow_mut();
        file.seek(SeekFrom::Start(addr as u64))
            .expect("seeking error");
        file.write_all(buf).expect("writing error");
    }
}
