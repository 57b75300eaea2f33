//! Corruption primitives.
//!
//! Every instrumented operation falls into one [`FaultKind`]: integers of 1, 8, 16, 32
//! and 64 bits, IEEE-754 floats of 32 and 64 bits, and addresses of 32 and 64 bits
//! (split by the pointed-to type for statistics only). The corruption itself is a
//! single algorithm over the raw bit pattern of the value, expressed by the
//! [`BitPattern`] trait.

use crate::util::BYTE_BITS;
use rand::Rng;
use serde::Serialize;
use std::fmt;

/// Type an address category points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Pointee {
    /// Pointer to integer data
    Int,
    /// Pointer to floating-point data
    Float,
}

/// Inject-once bookkeeping is tracked separately for data and addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FaultClass {
    /// Integer or floating-point values
    Data,
    /// Memory addresses
    Address,
}

/// Category of a fault site: the kind of value and its width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FaultKind {
    /// Boolean (`i1`)
    Int1,
    /// 8-bit integer
    Int8,
    /// 16-bit integer
    Int16,
    /// 32-bit integer
    Int32,
    /// 64-bit integer
    Int64,
    /// IEEE-754 single precision
    Float32,
    /// IEEE-754 double precision
    Float64,
    /// 32-bit address
    Addr32(Pointee),
    /// 64-bit address
    Addr64(Pointee),
}

impl FaultKind {
    /// Number of distinct categories, counting address pointee types separately.
    pub const COUNT: usize = 11;

    /// Every category, in statistics order.
    pub const ALL: [FaultKind; FaultKind::COUNT] = [
        FaultKind::Int1,
        FaultKind::Int8,
        FaultKind::Int16,
        FaultKind::Int32,
        FaultKind::Int64,
        FaultKind::Float32,
        FaultKind::Float64,
        FaultKind::Addr32(Pointee::Int),
        FaultKind::Addr64(Pointee::Int),
        FaultKind::Addr32(Pointee::Float),
        FaultKind::Addr64(Pointee::Float),
    ];

    /// Width of the corrupted bit pattern in bits.
    pub const fn width(self) -> u32 {
        match self {
            FaultKind::Int1 => 1,
            FaultKind::Int8 => 8,
            FaultKind::Int16 => 16,
            FaultKind::Int32 | FaultKind::Float32 | FaultKind::Addr32(_) => 32,
            FaultKind::Int64 | FaultKind::Float64 | FaultKind::Addr64(_) => 64,
        }
    }

    /// Whether the category is data or an address.
    pub const fn class(self) -> FaultClass {
        match self {
            FaultKind::Addr32(_) | FaultKind::Addr64(_) => FaultClass::Address,
            _ => FaultClass::Data,
        }
    }

    /// Human-readable label used in injection diagnostics.
    pub const fn label(self) -> &'static str {
        match self {
            FaultKind::Int1 => "1-bit Int Data Error",
            FaultKind::Int8 => "8-bit Int Data Error",
            FaultKind::Int16 => "16-bit Int Data Error",
            FaultKind::Int32 => "32-bit Int Data Error",
            FaultKind::Int64 => "64-bit Int Data Error",
            FaultKind::Float32 => "32-bit IEEE Float Data Error",
            FaultKind::Float64 => "64-bit IEEE Float Data Error",
            FaultKind::Addr32(Pointee::Int) => "Ptr32 Error",
            FaultKind::Addr64(Pointee::Int) => "Ptr64 Error",
            FaultKind::Addr32(Pointee::Float) => "Float Addr32 Error",
            FaultKind::Addr64(Pointee::Float) => "Float Addr64 Error",
        }
    }

    /// Description used in the end-of-run statistics.
    pub const fn description(self) -> &'static str {
        match self {
            FaultKind::Int1 => "1-bit  Int Data",
            FaultKind::Int8 => "8-bit  Int Data",
            FaultKind::Int16 => "16-bit Int Data",
            FaultKind::Int32 => "32-bit Int Data",
            FaultKind::Int64 => "64-bit Int Data",
            FaultKind::Float32 => "32-bit IEEE Float Data",
            FaultKind::Float64 => "64-bit IEEE Float Data",
            FaultKind::Addr32(Pointee::Int) => "32-bit Int Ptr",
            FaultKind::Addr64(Pointee::Int) => "64-bit Int Ptr",
            FaultKind::Addr32(Pointee::Float) => "32-bit Float Ptr",
            FaultKind::Addr64(Pointee::Float) => "64-bit Float Ptr",
        }
    }

    /// Short machine-friendly name, used as key in serialized statistics.
    pub const fn name(self) -> &'static str {
        match self {
            FaultKind::Int1 => "int1",
            FaultKind::Int8 => "int8",
            FaultKind::Int16 => "int16",
            FaultKind::Int32 => "int32",
            FaultKind::Int64 => "int64",
            FaultKind::Float32 => "float32",
            FaultKind::Float64 => "float64",
            FaultKind::Addr32(Pointee::Int) => "int_addr32",
            FaultKind::Addr64(Pointee::Int) => "int_addr64",
            FaultKind::Addr32(Pointee::Float) => "float_addr32",
            FaultKind::Addr64(Pointee::Float) => "float_addr64",
        }
    }

    /// Index of this category in [`FaultKind::ALL`].
    pub const fn slot(self) -> usize {
        match self {
            FaultKind::Int1 => 0,
            FaultKind::Int8 => 1,
            FaultKind::Int16 => 2,
            FaultKind::Int32 => 3,
            FaultKind::Int64 => 4,
            FaultKind::Float32 => 5,
            FaultKind::Float64 => 6,
            FaultKind::Addr32(Pointee::Int) => 7,
            FaultKind::Addr64(Pointee::Int) => 8,
            FaultKind::Addr32(Pointee::Float) => 9,
            FaultKind::Addr64(Pointee::Float) => 10,
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Arguments every instrumented call site passes alongside the value.
///
/// `error_freq` and `total_trials` only feed diagnostics; scheduling always uses
/// the campaign state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FaultSite {
    /// Identity of the static call site, stable across runs
    pub index: i32,
    /// Force this site's category into inject-once mode
    pub inject_once: bool,
    /// Error frequency as seen by the call site
    pub error_freq: i32,
    /// Total trials as seen by the call site
    pub total_trials: i32,
    /// Byte holding the flip target, or negative for any bit of the value
    pub byte_position: i32,
}

impl FaultSite {
    /// A call site with no inject-once request and no byte hint.
    pub fn new(index: i32) -> Self {
        Self {
            index,
            inject_once: false,
            error_freq: 0,
            total_trials: 0,
            byte_position: -1,
        }
    }
}

/// Values whose raw bit pattern can be corrupted.
pub trait BitPattern: Copy {
    /// Number of bits in the pattern.
    const BITS: u32;

    /// Returns the value with exactly bit `bit` inverted.
    ///
    /// `bit` must be below [`BitPattern::BITS`].
    fn flip_bit(self, bit: u32) -> Self;
}

macro_rules! int_impl {
    ($($t:ty),*) => {
        $(
            impl BitPattern for $t {
                const BITS: u32 = <$t>::BITS;

                fn flip_bit(self, bit: u32) -> Self {
                    self ^ ((1 as $t) << bit)
                }
            }
        )*
    };
}

int_impl!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

macro_rules! float_impl {
    ($t:ty, $bits:expr) => {
        impl BitPattern for $t {
            const BITS: u32 = $bits;

            fn flip_bit(self, bit: u32) -> Self {
                <$t>::from_bits(self.to_bits().flip_bit(bit))
            }
        }
    };
}

float_impl!(f32, 32);
float_impl!(f64, 64);

impl BitPattern for bool {
    const BITS: u32 = 1;

    fn flip_bit(self, _bit: u32) -> Self {
        !self
    }
}

impl<T> BitPattern for *mut T {
    const BITS: u32 = usize::BITS;

    fn flip_bit(self, bit: u32) -> Self {
        self.map_addr(|addr| addr.flip_bit(bit))
    }
}

impl<T> BitPattern for *const T {
    const BITS: u32 = usize::BITS;

    fn flip_bit(self, bit: u32) -> Self {
        self.map_addr(|addr| addr.flip_bit(bit))
    }
}

/// Chooses the bit to flip in a pattern of `width` bits.
///
/// An explicit campaign-wide position is used as is when it lies within the
/// width; outside of it the injection is declined (`None`). Otherwise a
/// non-negative `byte_position` confines the random bit to that byte (modulo the
/// number of bytes in the width), and a negative one draws from the whole width.
/// A 1-bit value only has bit 0.
pub fn resolve_bit_position<R: Rng + ?Sized>(
    width: u32,
    explicit: Option<u32>,
    byte_position: i32,
    rng: &mut R,
) -> Option<u32> {
    if let Some(pos) = explicit {
        return (pos < width).then_some(pos);
    }
    if width <= 1 {
        return (width == 1).then_some(0);
    }
    if width < BYTE_BITS || byte_position < 0 {
        return Some(rng.random_range(0..width));
    }
    let bytes = width / BYTE_BITS;
    let byte = byte_position as u32 % bytes;
    Some(byte * BYTE_BITS + rng.random_range(0..BYTE_BITS))
}
