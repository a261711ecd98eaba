//! Enumerates the scalar element types a graph tensor may carry.

use serde::{Deserialize, Serialize};

/// Logical element type of a tensor; every variant has a fixed byte width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    /// 32-bit IEEE-754 floating point.
    F32,
    /// 16-bit floating point (fp16).
    F16,
    /// 16-bit bfloat16.
    BF16,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer, the widest supported element.
    I64,
    /// Unsigned byte, used for raw and quantized payloads.
    U8,
}

impl DType {
    /// Returns the number of bytes occupied by one scalar element.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 | DType::BF16 => 2,
            DType::I32 => 4,
            DType::I64 => 8,
            DType::U8 => 1,
        }
    }
}
