use crate::BlockId;

/// 目录项，3字节：
///
/// | 字节 | 内容                                   |
/// |------|----------------------------------------|
/// | 0    | 起始块号                               |
/// | 1..3 | 小端`u16`，低12位为大小，高4位为类型   |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirEnt {
    pub start: BlockId,
    size: u16,
    typ: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum FileType {
    #[default]
    Unused = 0,
    General = 1,
    Model = 2,
}

impl TryFrom<u8> for FileType {
    type Error = u8;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::Unused),
            1 => Ok(Self::General),
            2 => Ok(Self::Model),
            raw => Err(raw),
        }
    }
}

impl DirEnt {
    pub const SIZE: usize = 3;

    /// 12位能表示的最大文件大小
    pub const MAX_SIZE: usize = 0x0FFF;

    pub fn new(start: BlockId, size: usize, typ: FileType) -> Self {
        assert!(size <= Self::MAX_SIZE);
        Self {
            start,
            size: size as u16,
            typ: typ as u8,
        }
    }

    #[inline]
    pub const fn size(&self) -> usize {
        self.size as usize
    }

    /// 类型标记非法时为`None`
    #[inline]
    pub fn file_type(&self) -> Option<FileType> {
        FileType::try_from(self.typ).ok()
    }

    /// 起始块为空或大小为0的目录项表示文件不存在
    #[inline]
    pub const fn exists(&self) -> bool {
        !self.start.is_null() && self.size != 0
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let packed = self.size & 0x0FFF | (self.typ as u16) << 12;
        let [lo, hi] = packed.to_le_bytes();
        [self.start.into(), lo, hi]
    }

    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let packed = u16::from_le_bytes([bytes[1], bytes[2]]);
        Self {
            start: bytes[0].into(),
            size: packed & 0x0FFF,
            typ: (packed >> 12) as u8,
        }
    }
}
