use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

// DType: element types an array buffer can hold
//
// Every array carries a DType that fixes its element width, so the byte
// length of a buffer is always `elem_count * size_in_bytes`:
//
//   U8 : unsigned byte, image data and raw masks
//   I8 : signed byte
//   I32: 32-bit integer, indices and labels
//   I64: 64-bit integer
//   F16: IEEE half float
//   F32: the default float
//   F64: double precision

/// Enum of all supported element data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    U8,
    I8,
    I32,
    I64,
    F16,
    F32,
    F64,
}

impl DType {
    pub const ALL: [DType; 7] = [
        DType::U8,
        DType::I8,
        DType::I32,
        DType::I64,
        DType::F16,
        DType::F32,
        DType::F64,
    ];

    /// Size of one element in bytes.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::U8 | DType::I8 => 1,
            DType::F16 => 2,
            DType::I32 | DType::F32 => 4,
            DType::I64 | DType::F64 => 8,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DType::F16 | DType::F32 | DType::F64)
    }

    /// Lowercase name, as printed in array headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            DType::U8 => "uint8",
            DType::I8 => "int8",
            DType::I32 => "int32",
            DType::I64 => "int64",
            DType::F16 => "float16",
            DType::F32 => "float32",
            DType::F64 => "float64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DType::ALL
            .into_iter()
            .find(|dt| dt.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidArgument(format!("unknown data type '{s}'")))
    }
}

// WithDType: bridge between Rust element types and DType
//
// Typed reads and writes (`NDArray::set`, `NDArray::to_vec`) are generic over
// this trait. The DTYPE constant is what makes `set::<i8>` on a uint8 array a
// dtype mismatch instead of a silent reinterpretation.

/// Rust types that can be stored in an array buffer.
pub trait WithDType:
    Copy + Send + Sync + 'static + PartialEq + fmt::Debug + fmt::Display
{
    /// The corresponding DType variant.
    const DTYPE: DType;

    /// Widen to f64 (for inspection and formatting).
    fn to_f64(self) -> f64;

    /// Checked conversion from f64. `None` when `v` is not representable:
    /// a fraction or out of range for integers, a finite value that
    /// overflows to infinity for floats.
    fn from_f64(v: f64) -> Option<Self>;

    /// Append the little-endian encoding of `self` to `out`.
    fn write_le(self, out: &mut Vec<u8>);

    /// Decode one element from exactly `size_in_bytes` little-endian bytes.
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_with_dtype_int {
    ($ty:ty, $dtype:expr, $n:expr) => {
        impl WithDType for $ty {
            const DTYPE: DType = $dtype;

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn from_f64(v: f64) -> Option<Self> {
                if v.fract() != 0.0 {
                    return None;
                }
                num_traits::cast(v)
            }

            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Self {
                let mut buf = [0u8; $n];
                buf.copy_from_slice(bytes);
                <$ty>::from_le_bytes(buf)
            }
        }
    };
}

macro_rules! impl_with_dtype_float {
    ($ty:ty, $dtype:expr, $n:expr) => {
        impl WithDType for $ty {
            const DTYPE: DType = $dtype;

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn from_f64(v: f64) -> Option<Self> {
                let narrowed = v as $ty;
                if v.is_finite() && narrowed.is_infinite() {
                    return None;
                }
                Some(narrowed)
            }

            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Self {
                let mut buf = [0u8; $n];
                buf.copy_from_slice(bytes);
                <$ty>::from_le_bytes(buf)
            }
        }
    };
}

impl_with_dtype_int!(u8, DType::U8, 1);
impl_with_dtype_int!(i8, DType::I8, 1);
impl_with_dtype_int!(i32, DType::I32, 4);
impl_with_dtype_int!(i64, DType::I64, 8);
impl_with_dtype_float!(f32, DType::F32, 4);
impl_with_dtype_float!(f64, DType::F64, 8);

impl WithDType for half::f16 {
    const DTYPE: DType = DType::F16;

    fn to_f64(self) -> f64 {
        half::f16::to_f64(self)
    }

    fn from_f64(v: f64) -> Option<Self> {
        let narrowed = half::f16::from_f64(v);
        if v.is_finite() && narrowed.is_infinite() {
            return None;
        }
        Some(narrowed)
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn read_le(bytes: &[u8]) -> Self {
        half::f16::from_le_bytes([bytes[0], bytes[1]])
    }
}

/// Encode a typed slice as little-endian bytes.
pub fn encode<T: WithDType>(data: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * T::DTYPE.size_in_bytes());
    for &v in data {
        v.write_le(&mut out);
    }
    out
}

/// Decode little-endian bytes into typed values. Trailing partial elements are ignored.
pub fn decode<T: WithDType>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(T::DTYPE.size_in_bytes())
        .map(T::read_le)
        .collect()
}

/// Encode f64 values as little-endian bytes of `dtype`.
///
/// Every value must be exactly representable for integer dtypes; there is no
/// silent truncation or wraparound.
pub fn encode_f64(dtype: DType, values: &[f64]) -> Result<Vec<u8>> {
    fn narrow<T: WithDType>(values: &[f64]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(values.len() * T::DTYPE.size_in_bytes());
        for &v in values {
            let x = T::from_f64(v).ok_or_else(|| {
                Error::InvalidArgument(format!("value {v} is not representable as {}", T::DTYPE))
            })?;
            x.write_le(&mut out);
        }
        Ok(out)
    }
    match dtype {
        DType::U8 => narrow::<u8>(values),
        DType::I8 => narrow::<i8>(values),
        DType::I32 => narrow::<i32>(values),
        DType::I64 => narrow::<i64>(values),
        DType::F16 => narrow::<half::f16>(values),
        DType::F32 => narrow::<f32>(values),
        DType::F64 => narrow::<f64>(values),
    }
}

/// Decode little-endian bytes of `dtype` into f64 values.
pub fn decode_f64(dtype: DType, bytes: &[u8]) -> Vec<f64> {
    fn widen<T: WithDType>(bytes: &[u8]) -> Vec<f64> {
        decode::<T>(bytes).into_iter().map(T::to_f64).collect()
    }
    match dtype {
        DType::U8 => widen::<u8>(bytes),
        DType::I8 => widen::<i8>(bytes),
        DType::I32 => widen::<i32>(bytes),
        DType::I64 => widen::<i64>(bytes),
        DType::F16 => widen::<half::f16>(bytes),
        DType::F32 => widen::<f32>(bytes),
        DType::F64 => widen::<f64>(bytes),
    }
}
