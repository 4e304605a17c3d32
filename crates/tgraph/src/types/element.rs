use std::fmt;

use serde::{Deserialize, Serialize};

/// Scalar element type of a tensor value.
///
/// `Dynamic` stands for "not yet known" and merges with any other type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Dynamic,
    Boolean,
    Bf16,
    F16,
    F32,
    F64,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
}

impl ElementType {
    pub fn is_dynamic(self) -> bool {
        matches!(self, ElementType::Dynamic)
    }

    pub fn is_static(self) -> bool {
        !self.is_dynamic()
    }

    /// Returns `true` for floating-point types.
    pub fn is_real(self) -> bool {
        matches!(
            self,
            ElementType::Bf16 | ElementType::F16 | ElementType::F32 | ElementType::F64
        )
    }

    pub fn is_integral(self) -> bool {
        matches!(
            self,
            ElementType::I8
                | ElementType::I16
                | ElementType::I32
                | ElementType::I64
                | ElementType::U8
                | ElementType::U16
                | ElementType::U32
                | ElementType::U64
        )
    }

    pub fn is_signed(self) -> bool {
        self.is_real()
            || matches!(
                self,
                ElementType::I8 | ElementType::I16 | ElementType::I32 | ElementType::I64
            )
    }

    /// Width of one element in bits, `None` while the type is dynamic.
    pub fn bitwidth(self) -> Option<usize> {
        let bits = match self {
            ElementType::Dynamic => return None,
            ElementType::Boolean | ElementType::I8 | ElementType::U8 => 8,
            ElementType::Bf16 | ElementType::F16 | ElementType::I16 | ElementType::U16 => 16,
            ElementType::F32 | ElementType::I32 | ElementType::U32 => 32,
            ElementType::F64 | ElementType::I64 | ElementType::U64 => 64,
        };
        Some(bits)
    }

    pub fn size_in_bytes(self) -> Option<usize> {
        self.bitwidth().map(|bits| bits / 8)
    }

    /// Unifies two element types. Returns `None` when both are static and differ.
    pub fn merge(self, other: ElementType) -> Option<ElementType> {
        match (self, other) {
            (ElementType::Dynamic, ty) | (ty, ElementType::Dynamic) => Some(ty),
            (lhs, rhs) if lhs == rhs => Some(lhs),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ElementType::Dynamic => "dynamic",
            ElementType::Boolean => "boolean",
            ElementType::Bf16 => "bf16",
            ElementType::F16 => "f16",
            ElementType::F32 => "f32",
            ElementType::F64 => "f64",
            ElementType::I8 => "i8",
            ElementType::I16 => "i16",
            ElementType::I32 => "i32",
            ElementType::I64 => "i64",
            ElementType::U8 => "u8",
            ElementType::U16 => "u16",
            ElementType::U32 => "u32",
            ElementType::U64 => "u64",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
