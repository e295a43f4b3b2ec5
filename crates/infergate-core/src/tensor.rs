use std::fmt;
use std::str::FromStr;

use half::f16;
use ndarray::{ArrayD, IxDyn};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::DecodeError;

/// Element types a chunk can be reinterpreted as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F16,
    F32,
    F64,
}

impl DType {
    /// Resolves a symbolic dtype name (numpy spelling or short code).
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "bool" | "?" => DType::Bool,
            "int8" | "i1" => DType::I8,
            "int16" | "i2" => DType::I16,
            "int32" | "i4" => DType::I32,
            "int64" | "i8" => DType::I64,
            "uint8" | "u1" => DType::U8,
            "uint16" | "u2" => DType::U16,
            "uint32" | "u4" => DType::U32,
            "uint64" | "u8" => DType::U64,
            "float16" | "f2" | "half" => DType::F16,
            "float32" | "f4" | "float" => DType::F32,
            "float64" | "f8" | "double" => DType::F64,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::I8 => "int8",
            DType::I16 => "int16",
            DType::I32 => "int32",
            DType::I64 => "int64",
            DType::U8 => "uint8",
            DType::U16 => "uint16",
            DType::U32 => "uint32",
            DType::U64 => "uint64",
            DType::F16 => "float16",
            DType::F32 => "float32",
            DType::F64 => "float64",
        }
    }

    pub fn byte_size(self) -> usize {
        match self {
            DType::Bool | DType::I8 | DType::U8 => 1,
            DType::I16 | DType::U16 | DType::F16 => 2,
            DType::I32 | DType::U32 | DType::F32 => 4,
            DType::I64 | DType::U64 | DType::F64 => 8,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for DType {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DType::from_symbol(s).ok_or_else(|| DecodeError::UnknownDType(s.to_string()))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Shape(pub SmallVec<[usize; 6]>);

impl Shape {
    pub fn scalar() -> Self {
        Self(SmallVec::new())
    }
    pub fn from_slice(d: &[usize]) -> Self {
        Self(d.iter().copied().collect())
    }
    pub fn dims(&self) -> &[usize] {
        &self.0
    }
    pub fn rank(&self) -> usize {
        self.0.len()
    }
    /// A rank-0 shape holds exactly one element.
    pub fn numel(&self) -> usize {
        self.0.iter().product::<usize>()
    }
    pub fn checked_numel(&self) -> Option<usize> {
        self.0.iter().try_fold(1usize, |acc, d| acc.checked_mul(*d))
    }
    /// Product of the non-zero dimensions; `None` on overflow.
    ///
    /// Bounds the nested arrays a zero-element shape still expands to.
    pub fn checked_nonzero_extent(&self) -> Option<usize> {
        self.0
            .iter()
            .filter(|d| **d != 0)
            .try_fold(1usize, |acc, d| acc.checked_mul(*d))
    }
    /// Prepends a leading batch axis.
    pub fn stacked(&self, batch: usize) -> Self {
        let mut dims = SmallVec::with_capacity(self.rank() + 1);
        dims.push(batch);
        dims.extend_from_slice(&self.0);
        Self(dims)
    }
}

impl Serialize for Shape {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

/// Side-channel description of every chunk in one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TensorMetadata {
    pub shape: Shape,
    pub dtype: DType,
}

#[derive(Deserialize)]
struct RawMetadata {
    shape: Vec<usize>,
    dtype: String,
}

impl TensorMetadata {
    pub fn new(shape: Shape, dtype: DType) -> Self {
        Self { shape, dtype }
    }

    /// Parses the JSON metadata document (`{"shape": [...], "dtype": "..."}`).
    /// Unknown fields are ignored.
    pub fn parse(text: &str) -> Result<Self, DecodeError> {
        let raw: RawMetadata = serde_json::from_str(text)?;
        let dtype = raw.dtype.parse()?;
        Ok(Self {
            shape: Shape::from_slice(&raw.shape),
            dtype,
        })
    }
}

/// Which in-memory representation the engine receives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensorBackend {
    /// Flat row-major `Vec` per dtype.
    #[default]
    Native,
    /// `ndarray::ArrayD` per dtype.
    Ndarray,
}

impl FromStr for TensorBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "native" => Ok(TensorBackend::Native),
            "ndarray" => Ok(TensorBackend::Ndarray),
            _ => Err(format!("unknown tensor backend: {s} (expected native or ndarray)")),
        }
    }
}

/// Rust element types that back a [`DType`].
pub trait Element: Copy + Send + Sync + 'static {
    const DTYPE: DType;

    fn buffer(buffer: &ElementBuffer) -> Option<&[Self]>;
    fn array(array: &ArrayBuffer) -> Option<&ArrayD<Self>>;
}

macro_rules! element_types {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        /// Flat row-major storage of a native batch.
        #[derive(Clone, Debug, PartialEq)]
        pub enum ElementBuffer {
            $($variant(Vec<$ty>),)*
        }

        /// Storage of a batch converted for the ndarray backend.
        #[derive(Clone, Debug, PartialEq)]
        pub enum ArrayBuffer {
            $($variant(ArrayD<$ty>),)*
        }

        impl ElementBuffer {
            pub fn dtype(&self) -> DType {
                match self {
                    $(ElementBuffer::$variant(_) => DType::$variant,)*
                }
            }

            pub fn len(&self) -> usize {
                match self {
                    $(ElementBuffer::$variant(v) => v.len(),)*
                }
            }

            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            fn into_array(self, dims: &[usize]) -> Result<ArrayBuffer, ndarray::ShapeError> {
                Ok(match self {
                    $(ElementBuffer::$variant(v) => {
                        ArrayBuffer::$variant(ArrayD::from_shape_vec(IxDyn(dims), v)?)
                    })*
                })
            }
        }

        impl ArrayBuffer {
            pub fn dtype(&self) -> DType {
                match self {
                    $(ArrayBuffer::$variant(_) => DType::$variant,)*
                }
            }

            pub fn shape(&self) -> &[usize] {
                match self {
                    $(ArrayBuffer::$variant(a) => a.shape(),)*
                }
            }

            /// Copies the elements out in logical (row-major) order.
            pub fn to_buffer(&self) -> ElementBuffer {
                match self {
                    $(ArrayBuffer::$variant(a) => ElementBuffer::$variant(a.iter().copied().collect()),)*
                }
            }
        }

        $(
            impl Element for $ty {
                const DTYPE: DType = DType::$variant;

                fn buffer(buffer: &ElementBuffer) -> Option<&[Self]> {
                    match buffer {
                        ElementBuffer::$variant(v) => Some(v),
                        _ => None,
                    }
                }

                fn array(array: &ArrayBuffer) -> Option<&ArrayD<Self>> {
                    match array {
                        ArrayBuffer::$variant(a) => Some(a),
                        _ => None,
                    }
                }
            }
        )*
    };
}

element_types! {
    Bool => bool,
    I8 => i8,
    I16 => i16,
    I32 => i32,
    I64 => i64,
    U8 => u8,
    U16 => u16,
    U32 => u32,
    U64 => u64,
    F16 => f16,
    F32 => f32,
    F64 => f64,
}

impl ElementBuffer {
    fn serialize_nested<S: Serializer>(&self, dims: &[usize], s: S) -> Result<S::Ok, S::Error> {
        match self {
            ElementBuffer::Bool(v) => Nested { dims, data: v.as_slice() }.serialize(s),
            ElementBuffer::I8(v) => Nested { dims, data: v.as_slice() }.serialize(s),
            ElementBuffer::I16(v) => Nested { dims, data: v.as_slice() }.serialize(s),
            ElementBuffer::I32(v) => Nested { dims, data: v.as_slice() }.serialize(s),
            ElementBuffer::I64(v) => Nested { dims, data: v.as_slice() }.serialize(s),
            ElementBuffer::U8(v) => Nested { dims, data: v.as_slice() }.serialize(s),
            ElementBuffer::U16(v) => Nested { dims, data: v.as_slice() }.serialize(s),
            ElementBuffer::U32(v) => Nested { dims, data: v.as_slice() }.serialize(s),
            ElementBuffer::U64(v) => Nested { dims, data: v.as_slice() }.serialize(s),
            ElementBuffer::F16(v) => Nested { dims, data: v.as_slice() }.serialize(s),
            ElementBuffer::F32(v) => Nested { dims, data: v.as_slice() }.serialize(s),
            ElementBuffer::F64(v) => Nested { dims, data: v.as_slice() }.serialize(s),
        }
    }
}

/// How a single element is written into a JSON document.
///
/// JSON has no numbers for NaN or the infinities, so non-finite floats are
/// written as the strings `"NaN"`, `"Infinity"` and `"-Infinity"`.
trait JsonLeaf {
    fn serialize_leaf<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error>;
}

macro_rules! exact_leaf {
    ($($ty:ty),* $(,)?) => {
        $(
            impl JsonLeaf for $ty {
                fn serialize_leaf<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                    self.serialize(serializer)
                }
            }
        )*
    };
}

exact_leaf!(bool, i8, i16, i32, i64, u8, u16, u32, u64);

impl JsonLeaf for f32 {
    fn serialize_leaf<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match non_finite_name(f64::from(*self)) {
            Some(name) => serializer.serialize_str(name),
            None => serializer.serialize_f32(*self),
        }
    }
}

impl JsonLeaf for f64 {
    fn serialize_leaf<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match non_finite_name(*self) {
            Some(name) => serializer.serialize_str(name),
            None => serializer.serialize_f64(*self),
        }
    }
}

// widened to f32
impl JsonLeaf for f16 {
    fn serialize_leaf<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_f32().serialize_leaf(serializer)
    }
}

fn non_finite_name(value: f64) -> Option<&'static str> {
    if value.is_nan() {
        Some("NaN")
    } else if value == f64::INFINITY {
        Some("Infinity")
    } else if value == f64::NEG_INFINITY {
        Some("-Infinity")
    } else {
        None
    }
}

/// Row-major slice viewed as nested JSON arrays following `dims`.
struct Nested<'a, T> {
    dims: &'a [usize],
    data: &'a [T],
}

impl<T: JsonLeaf> Serialize for Nested<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let Some((&outer, inner)) = self.dims.split_first() else {
            return match self.data.first() {
                Some(value) => value.serialize_leaf(serializer),
                None => serializer.serialize_unit(),
            };
        };

        let stride = inner.iter().product::<usize>();
        let mut seq = serializer.serialize_seq(Some(outer))?;
        for i in 0..outer {
            let start = i * stride;
            let data = self.data.get(start..start + stride).unwrap_or(&[]);
            seq.serialize_element(&Nested { dims: inner, data })?;
        }
        seq.end()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TensorStorage {
    Native(ElementBuffer),
    Ndarray(ArrayBuffer),
}

/// Decoded chunks stacked along a leading batch axis.
///
/// Serializes as nested JSON arrays following [`TensorBatch::shape`]; `float16`
/// elements are widened to `f32` on the way out, and NaN or infinite floats are
/// written as the strings `"NaN"`, `"Infinity"` and `"-Infinity"`.
#[derive(Clone, Debug, PartialEq)]
pub struct TensorBatch {
    shape: Shape,
    storage: TensorStorage,
}

impl TensorBatch {
    /// `shape` includes the leading batch axis.
    pub fn from_buffer(shape: Shape, buffer: ElementBuffer) -> Result<Self, DecodeError> {
        if shape.rank() == 0 || shape.checked_numel() != Some(buffer.len()) {
            return Err(ndarray::ShapeError::from_kind(ndarray::ErrorKind::IncompatibleShape).into());
        }
        Ok(Self {
            shape,
            storage: TensorStorage::Native(buffer),
        })
    }

    pub fn dtype(&self) -> DType {
        match &self.storage {
            TensorStorage::Native(buffer) => buffer.dtype(),
            TensorStorage::Ndarray(array) => array.dtype(),
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn batch_size(&self) -> usize {
        self.shape.0[0]
    }

    /// Shape of one stacked item.
    pub fn item_shape(&self) -> &[usize] {
        &self.shape.0[1..]
    }

    pub fn backend(&self) -> TensorBackend {
        match self.storage {
            TensorStorage::Native(_) => TensorBackend::Native,
            TensorStorage::Ndarray(_) => TensorBackend::Ndarray,
        }
    }

    pub fn storage(&self) -> &TensorStorage {
        &self.storage
    }

    pub fn into_storage(self) -> TensorStorage {
        self.storage
    }

    /// Row-major elements, if the batch holds `T` in contiguous storage.
    pub fn values<T: Element>(&self) -> Option<&[T]> {
        match &self.storage {
            TensorStorage::Native(buffer) => T::buffer(buffer),
            TensorStorage::Ndarray(array) => T::array(array).and_then(|a| a.as_slice()),
        }
    }

    pub fn array<T: Element>(&self) -> Option<&ArrayD<T>> {
        match &self.storage {
            TensorStorage::Native(_) => None,
            TensorStorage::Ndarray(array) => T::array(array),
        }
    }

    /// Converts the storage to `backend`; a no-op when it already matches.
    pub fn into_backend(self, backend: TensorBackend) -> Result<Self, DecodeError> {
        let storage = match (self.storage, backend) {
            (TensorStorage::Native(buffer), TensorBackend::Ndarray) => {
                TensorStorage::Ndarray(buffer.into_array(self.shape.dims())?)
            }
            (TensorStorage::Ndarray(array), TensorBackend::Native) => {
                TensorStorage::Native(array.to_buffer())
            }
            (storage, _) => storage,
        };
        Ok(Self {
            shape: self.shape,
            storage,
        })
    }
}

impl Serialize for TensorBatch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.storage {
            TensorStorage::Native(buffer) => buffer.serialize_nested(self.shape.dims(), serializer),
            TensorStorage::Ndarray(array) => array
                .to_buffer()
                .serialize_nested(self.shape.dims(), serializer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dtype_symbols_resolve() {
        assert_eq!(DType::from_symbol("float32"), Some(DType::F32));
        assert_eq!(DType::from_symbol("f4"), Some(DType::F32));
        assert_eq!(DType::from_symbol("i8"), Some(DType::I64));
        assert_eq!(DType::from_symbol("half"), Some(DType::F16));
        assert_eq!(DType::from_symbol("complex64"), None);
        assert!(matches!(
            "float128".parse::<DType>(),
            Err(DecodeError::UnknownDType(name)) if name == "float128"
        ));
        assert_eq!(DType::U16.to_string(), "uint16");
        assert_eq!(DType::F64.byte_size(), 8);
    }

    #[test]
    fn scalar_shape_holds_one_element() {
        assert_eq!(Shape::scalar().numel(), 1);
        assert_eq!(Shape::from_slice(&[3, 0, 2]).numel(), 0);
        assert_eq!(Shape::from_slice(&[usize::MAX, 2]).checked_numel(), None);
        assert_eq!(Shape::from_slice(&[3, 0, 2]).checked_nonzero_extent(), Some(6));
        assert_eq!(Shape::from_slice(&[usize::MAX, 0, 2]).checked_nonzero_extent(), None);
        assert_eq!(Shape::from_slice(&[2, 3]).stacked(4).dims(), &[4, 2, 3]);
    }

    #[test]
    fn metadata_parses_and_ignores_extra_fields() {
        let meta = TensorMetadata::parse(r#"{"shape":[2,2],"dtype":"float32","name":"x"}"#)
            .expect("valid metadata");
        assert_eq!(meta.shape.dims(), &[2, 2]);
        assert_eq!(meta.dtype, DType::F32);

        assert!(matches!(
            TensorMetadata::parse(r#"{"shape":[-1],"dtype":"float32"}"#),
            Err(DecodeError::Metadata(_))
        ));
        assert!(matches!(
            TensorMetadata::parse(r#"{"shape":[1],"dtype":"str"}"#),
            Err(DecodeError::UnknownDType(_))
        ));
    }

    #[test]
    fn batch_serializes_as_nested_arrays() {
        let batch = TensorBatch::from_buffer(
            Shape::from_slice(&[2, 1, 3]),
            ElementBuffer::I32(vec![1, 2, 3, 4, 5, 6]),
        )
        .expect("batch");
        let json = serde_json::to_string(&batch).expect("json");
        assert_eq!(json, "[[[1,2,3]],[[4,5,6]]]");

        let scalars = TensorBatch::from_buffer(
            Shape::from_slice(&[3]),
            ElementBuffer::Bool(vec![true, false, true]),
        )
        .expect("batch");
        assert_eq!(serde_json::to_string(&scalars).expect("json"), "[true,false,true]");

        let empty = TensorBatch::from_buffer(Shape::from_slice(&[2, 0]), ElementBuffer::U8(vec![]))
            .expect("batch");
        assert_eq!(serde_json::to_string(&empty).expect("json"), "[[],[]]");
    }

    #[test]
    fn half_values_widen_on_serialize() {
        let batch = TensorBatch::from_buffer(
            Shape::from_slice(&[2]),
            ElementBuffer::F16(vec![f16::from_f32(0.5), f16::from_f32(-2.0)]),
        )
        .expect("batch");
        assert_eq!(serde_json::to_string(&batch).expect("json"), "[0.5,-2.0]");
    }

    #[test]
    fn non_finite_floats_serialize_as_names() {
        let batch = TensorBatch::from_buffer(
            Shape::from_slice(&[1, 4]),
            ElementBuffer::F64(vec![f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 0.25]),
        )
        .expect("batch");
        assert_eq!(
            serde_json::to_string(&batch).expect("json"),
            r#"[["NaN","Infinity","-Infinity",0.25]]"#
        );

        let half = TensorBatch::from_buffer(
            Shape::from_slice(&[2]),
            ElementBuffer::F16(vec![f16::NAN, f16::NEG_INFINITY]),
        )
        .expect("batch");
        assert_eq!(serde_json::to_string(&half).expect("json"), r#"["NaN","-Infinity"]"#);
    }

    #[test]
    fn from_buffer_rejects_mismatched_shape() {
        let err = TensorBatch::from_buffer(Shape::from_slice(&[2, 2]), ElementBuffer::F32(vec![1.0]));
        assert!(matches!(err, Err(DecodeError::Layout(_))));
        let err = TensorBatch::from_buffer(Shape::scalar(), ElementBuffer::F32(vec![1.0]));
        assert!(matches!(err, Err(DecodeError::Layout(_))));
    }

    #[test]
    fn ndarray_backend_keeps_values_and_shape() {
        let batch = TensorBatch::from_buffer(
            Shape::from_slice(&[2, 2]),
            ElementBuffer::F64(vec![1.0, 2.0, 3.0, 4.0]),
        )
        .expect("batch");
        let native_json = serde_json::to_string(&batch).expect("json");

        let converted = batch.into_backend(TensorBackend::Ndarray).expect("convert");
        assert_eq!(converted.backend(), TensorBackend::Ndarray);
        let array = converted.array::<f64>().expect("f64 array");
        assert_eq!(array.shape(), &[2, 2]);
        assert_eq!(array[[1, 0]], 3.0);
        assert_eq!(converted.values::<f64>(), Some(&[1.0, 2.0, 3.0, 4.0][..]));
        assert_eq!(converted.values::<f32>(), None);
        assert_eq!(serde_json::to_string(&converted).expect("json"), native_json);

        let back = converted.into_backend(TensorBackend::Native).expect("convert");
        assert_eq!(back.backend(), TensorBackend::Native);
        assert_eq!(back.values::<f64>(), Some(&[1.0, 2.0, 3.0, 4.0][..]));
    }
}
