//! # 游程编码
//!
//! 模型数据中大量是零，编码时把连续的零折叠成控制字节。
//! 每个记号以一个控制字节开头：
//!
//! | 控制字节      | 含义                                   |
//! |---------------|----------------------------------------|
//! | `0b00LL_LLLL` | 之后跟`L`(1..=63)个原样字节            |
//! | `0b01ZZ_ZZZZ` | `Z`(1..=63)个零                        |
//! | `0b1ZZZ_LLLL` | `Z`(1..=7)个零，再跟`L`(1..=15)个原样字节 |
//!
//! 控制字节`0x00`不合法，解码器遇到它就停止。

use alloc::vec::Vec;

/// 单个记号能表示的最长游程
pub const MAX_RUN: usize = 0x3F;

/// 短于此长度、且后面跟着非零字节的零游程，与后续原样字节合并成一个记号
pub const SHORT_ZEROS: usize = 8;

/// 合并记号中原样字节的上限
pub const MAX_MIXED_LITERALS: usize = 0x0F;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Literal(u8),
    Zeros(u8),
    Mixed { zeros: u8, literals: u8 },
}

impl Token {
    /// 从剩余输入的开头切出下一个记号
    pub fn next(rest: &[u8]) -> Option<Self> {
        let first = *rest.first()?;

        let token = if first == 0 {
            let zeros = rest.iter().take(MAX_RUN).take_while(|&&b| b == 0).count();
            if zeros < SHORT_ZEROS && zeros < rest.len() {
                let literals = literal_run(&rest[zeros..], MAX_MIXED_LITERALS);
                Self::Mixed {
                    zeros: zeros as u8,
                    literals: literals as u8,
                }
            } else {
                Self::Zeros(zeros as u8)
            }
        } else {
            Self::Literal(literal_run(rest, MAX_RUN) as u8)
        };

        Some(token)
    }

    pub fn control(self) -> u8 {
        match self {
            Self::Literal(n) => n,
            Self::Zeros(n) => 0x40 | n,
            Self::Mixed { zeros, literals } => 0x80 | zeros << 4 | literals,
        }
    }

    /// 计数为零的记号不会由编码器产生，视为非法
    pub fn from_control(control: u8) -> Option<Self> {
        let token = if control & 0x80 != 0 {
            Self::Mixed {
                zeros: (control >> 4) & 0x07,
                literals: control & 0x0F,
            }
        } else if control & 0x40 != 0 {
            Self::Zeros(control & 0x3F)
        } else {
            Self::Literal(control)
        };

        let valid = match token {
            Self::Mixed { zeros, literals } => zeros > 0 && literals > 0,
            _ => token.span() > 0,
        };
        valid.then_some(token)
    }

    #[inline]
    pub fn zeros(self) -> usize {
        match self {
            Self::Literal(_) => 0,
            Self::Zeros(n) | Self::Mixed { zeros: n, .. } => n as usize,
        }
    }

    #[inline]
    pub fn literals(self) -> usize {
        match self {
            Self::Zeros(_) => 0,
            Self::Literal(n) | Self::Mixed { literals: n, .. } => n as usize,
        }
    }

    /// 记号覆盖的原始字节数
    #[inline]
    pub fn span(self) -> usize {
        self.zeros() + self.literals()
    }
}

/// 开头连续非零字节的个数，至多`max`
fn literal_run(bytes: &[u8], max: usize) -> usize {
    bytes.iter().take(max).take_while(|&&b| b != 0).count()
}

/// 分步编码器，每次产出一个记号。
///
/// 写入引擎按需取用，编码结果不必一次全部放进内存。
#[derive(Debug, Clone, Default)]
pub struct RlcEncoder {
    data: Vec<u8>,
    at: usize,
}

impl RlcEncoder {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, at: 0 }
    }

    /// 把下一个记号（控制字节与原样字节）追加到`out`，输入耗尽时返回`false`。
    pub fn encode_next(&mut self, out: &mut Vec<u8>) -> bool {
        let rest = &self.data[self.at..];
        let Some(token) = Token::next(rest) else {
            return false;
        };

        out.push(token.control());
        out.extend_from_slice(&rest[token.zeros()..token.span()]);
        self.at += token.span();
        true
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.at == self.data.len()
    }
}

/// 分步解码器。
///
/// 未输出完的零与原样字节计数保存在解码器中，
/// 因而可以跨越块边界、跨越多次读取调用继续解码。
#[derive(Debug, Clone, Copy, Default)]
pub struct RlcDecoder {
    zeros: usize,
    literals: usize,
    broken: bool,
}

impl RlcDecoder {
    /// 解码到`out`，返回写入的字节数。
    ///
    /// `pull`从编码流中读取字节，返回实际读到的个数，0表示流结束。
    pub fn decode(&mut self, out: &mut [u8], mut pull: impl FnMut(&mut [u8]) -> usize) -> usize {
        let mut i = 0;

        while !self.broken {
            let n = self.zeros.min(out.len() - i);
            out[i..i + n].fill(0);
            i += n;
            self.zeros -= n;
            if self.zeros > 0 {
                break;
            }

            let n = self.literals.min(out.len() - i);
            let got = pull(&mut out[i..i + n]);
            i += got;
            self.literals -= got;
            if self.literals > 0 {
                break;
            }

            let mut control = [0];
            if pull(&mut control) != 1 {
                break;
            }
            match Token::from_control(control[0]) {
                Some(token) => {
                    self.zeros = token.zeros();
                    self.literals = token.literals();
                }
                None => {
                    log::warn!("invalid rlc control byte {:#04x}", control[0]);
                    self.broken = true;
                }
            }
        }

        i
    }

    /// 是否遇到过非法控制字节
    #[inline]
    pub fn is_broken(&self) -> bool {
        self.broken
    }
}

pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut encoder = RlcEncoder::new(data.to_vec());
    let mut out = Vec::with_capacity(data.len() + data.len() / MAX_RUN + 1);
    while encoder.encode_next(&mut out) {}
    out
}

pub fn decode(mut encoded: &[u8]) -> Vec<u8> {
    let mut decoder = RlcDecoder::default();
    let mut out = Vec::new();
    let mut chunk = [0; 64];

    loop {
        let n = decoder.decode(&mut chunk, |buf| {
            let n = buf.len().min(encoded.len());
            buf[..n].copy_from_slice(&encoded[..n]);
            encoded = &encoded[n..];
            n
        });
        if n == 0 {
            break;
        }
        out.extend_from_slice(&chunk[..n]);
    }

    out
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    #[test]
    fn empty() {
        assert!(encode(&[]).is_empty());
        assert!(decode(&[]).is_empty());
    }

    #[test]
    fn short_zeros_merge_with_literals() {
        let data = [0, 0, 0, 0, 5, 6, 0, 0];
        let encoded = encode(&data);
        assert_eq!(encoded, [0xC2, 5, 6, 0x42]);
        assert_eq!(decode(&encoded), data);
    }

    #[test]
    fn long_zero_run_is_split() {
        let data = vec![0; 100];
        let encoded = encode(&data);
        assert_eq!(encoded, [0x40 | 63, 0x40 | 37]);
        assert_eq!(decode(&encoded), data);
    }

    #[test]
    fn eight_zeros_stand_alone() {
        let mut data = vec![0; 8];
        data.push(9);
        assert_eq!(encode(&data), [0x48, 0x01, 9]);
    }

    #[test]
    fn mixed_literals_are_capped() {
        let mut data = vec![0, 0];
        data.extend(1..=20);
        let encoded = encode(&data);
        assert_eq!(encoded[0], 0x80 | 2 << 4 | 15);
        assert_eq!(encoded[16], 5);
        assert_eq!(decode(&encoded), data);
    }

    #[test]
    fn literal_overhead_is_bounded() {
        let data: Vec<u8> = (0..1000).map(|i| (i % 255 + 1) as u8).collect();
        let encoded = encode(&data);
        assert_eq!(encoded.len(), data.len() + data.len().div_ceil(MAX_RUN));
        assert_eq!(decode(&encoded), data);
    }

    #[test]
    fn decoder_resumes_across_calls() {
        let data = [7, 0, 0, 0, 0, 0, 0, 0, 0, 0, 3, 0, 1, 2];
        let encoded = encode(&data);
        let mut source = &encoded[..];
        let mut decoder = RlcDecoder::default();
        let mut out = Vec::new();

        // 每次只取一个字节，逼迫状态跨调用保存
        loop {
            let mut byte = [0];
            let n = decoder.decode(&mut byte, |buf| {
                let n = buf.len().min(source.len().min(1));
                buf[..n].copy_from_slice(&source[..n]);
                source = &source[n..];
                n
            });
            if n == 0 {
                break;
            }
            out.push(byte[0]);
        }

        assert_eq!(out, data);
    }

    #[test]
    fn zero_control_stops_decoding() {
        let mut decoder = RlcDecoder::default();
        let mut out = [0xAA; 4];
        let mut stream: &[u8] = &[0x01, 9, 0x00, 0x01, 8];
        let n = decoder.decode(&mut out, |buf| {
            let n = buf.len().min(stream.len());
            buf[..n].copy_from_slice(&stream[..n]);
            stream = &stream[n..];
            n
        });
        assert_eq!(1, n);
        assert_eq!(9, out[0]);
        assert!(decoder.is_broken());
    }

    #[test]
    fn control_bytes() {
        for control in 1..=u8::MAX {
            if let Some(token) = Token::from_control(control) {
                assert_eq!(control, token.control());
            }
        }
        assert_eq!(None, Token::from_control(0x00));
        assert_eq!(None, Token::from_control(0x40));
        assert_eq!(None, Token::from_control(0x85));
        assert_eq!(None, Token::from_control(0xB0));
    }
}
