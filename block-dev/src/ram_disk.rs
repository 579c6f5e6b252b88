//! 内存中的介质，供模拟器与测试使用。
//!
//! 除了读写，还能统计写入次数，并模拟掉电：
//! 掉电之后的写入全部丢失，直到恢复供电。
//! 掉电点可以按写入次数设定，也可以按字节数设定，
//! 后者会让一次写入只落下前半截。

use alloc::vec;
use alloc::vec::Vec;

use spin::Mutex;

use crate::BlockDevice;

/// EEPROM 擦除后的字节值
const ERASED: u8 = 0xFF;

#[derive(Debug)]
pub struct RamDisk {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    data: Vec<u8>,
    /// 已经落盘的写入次数
    writes: usize,
    /// 掉电前的余量，`None`表示供电正常
    budget: Option<Budget>,
    /// 掉电后被丢弃的写入次数
    lost: usize,
}

#[derive(Debug, Clone, Copy)]
enum Budget {
    Writes(usize),
    Bytes(usize),
}

impl Budget {
    fn is_spent(self) -> bool {
        matches!(self, Self::Writes(0) | Self::Bytes(0))
    }
}

impl RamDisk {
    pub fn new(len: usize) -> Self {
        Self::from_image(vec![ERASED; len])
    }

    pub fn from_image(data: Vec<u8>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                data,
                writes: 0,
                budget: None,
                lost: 0,
            }),
        }
    }

    /// 介质内容的快照
    pub fn image(&self) -> Vec<u8> {
        self.inner.lock().data.clone()
    }

    pub fn writes(&self) -> usize {
        self.inner.lock().writes
    }

    pub fn lost_writes(&self) -> usize {
        self.inner.lock().lost
    }

    /// 再允许`writes`次写入，之后的写入全部丢失。
    pub fn cut_power_after(&self, writes: usize) {
        self.inner.lock().budget = Some(Budget::Writes(writes));
    }

    /// 再允许写入`bytes`字节，跨过掉电点的那次写入只落下前面的部分。
    pub fn cut_power_after_bytes(&self, bytes: usize) {
        self.inner.lock().budget = Some(Budget::Bytes(bytes));
    }

    pub fn restore_power(&self) {
        let mut inner = self.inner.lock();
        inner.budget = None;
        inner.lost = 0;
    }

    pub fn is_powered(&self) -> bool {
        !self.inner.lock().budget.is_some_and(Budget::is_spent)
    }
}

impl BlockDevice for RamDisk {
    fn capacity(&self) -> usize {
        self.inner.lock().data.len()
    }

    fn read(&self, addr: usize, buf: &mut [u8]) {
        let inner = self.inner.lock();
        buf.copy_from_slice(&inner.data[addr..addr + buf.len()]);
    }

    fn write(&self, addr: usize, buf: &[u8]) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let len = match inner.budget.as_mut() {
            None => buf.len(),
            Some(budget) if budget.is_spent() => {
                inner.lost += 1;
                return;
            }
            Some(Budget::Writes(left)) => {
                *left -= 1;
                buf.len()
            }
            Some(Budget::Bytes(left)) => {
                let len = buf.len().min(*left);
                *left -= len;
                len
            }
        };
        inner.data[addr..addr + len].copy_from_slice(&buf[..len]);
        if len < buf.len() {
            inner.lost += 1;
        } else {
            inner.writes += 1;
        }
    }
}
