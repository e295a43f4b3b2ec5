//! Raw chunks plus metadata in, stacked [`TensorBatch`] out.
//!
//! Chunks are reinterpreted in the platform's native byte order. Nothing is
//! negotiated with the caller: a client on a machine with a different byte
//! order must swap before sending. Values are not inspected, so NaN and
//! infinities pass through unchanged; the JSON encoding of a batch writes them
//! as the strings `"NaN"`, `"Infinity"` and `"-Infinity"`.

use bytes::Bytes;
use half::f16;

use crate::{DType, DecodeError, ElementBuffer, Shape, TensorBatch, TensorMetadata};

/// Largest product of non-zero dimensions accepted for a shape holding no
/// elements. Such a shape costs nothing to send but still encodes to one
/// nested array per position.
pub const MAX_EMPTY_EXTENT: usize = 1 << 20;

pub fn parse_metadata(text: &str) -> Result<TensorMetadata, DecodeError> {
    TensorMetadata::parse(text)
}

/// Decodes every chunk as one tensor of `metadata.shape` and stacks them, in
/// input order, along a new leading axis.
pub fn decode<I>(chunks: I, metadata: &TensorMetadata) -> Result<TensorBatch, DecodeError>
where
    I: IntoIterator<Item = Bytes>,
{
    let chunks: Vec<Bytes> = chunks.into_iter().collect();
    let Some(first) = chunks.first() else {
        return Err(DecodeError::EmptyBatch);
    };

    let dtype = metadata.dtype;
    let width = dtype.byte_size();
    let numel = metadata
        .shape
        .checked_numel()
        .ok_or_else(|| DecodeError::ShapeOverflow(metadata.shape.dims().to_vec()))?;
    let expected_len = first.len();

    for (index, chunk) in chunks.iter().enumerate() {
        let len = chunk.len();
        if len % width != 0 {
            return Err(DecodeError::ByteLength {
                index,
                len,
                dtype,
                width,
            });
        }
        if len != expected_len {
            return Err(DecodeError::InconsistentChunks {
                index,
                len,
                expected: expected_len,
            });
        }
        if len / width != numel {
            return Err(DecodeError::ElementCount {
                index,
                got: len / width,
                expected: numel,
                shape: metadata.shape.dims().to_vec(),
            });
        }
    }

    let stacked = metadata.shape.stacked(chunks.len());
    let total = stacked
        .checked_numel()
        .ok_or_else(|| DecodeError::ShapeOverflow(stacked.dims().to_vec()))?;
    if total == 0 {
        check_empty_extent(&stacked)?;
    }
    let buffer = decode_elements(dtype, &chunks, total)?;

    TensorBatch::from_buffer(stacked, buffer)
}

/// Parses the JSON metadata, then decodes.
pub fn decode_request<I>(chunks: I, meta: &str) -> Result<TensorBatch, DecodeError>
where
    I: IntoIterator<Item = Bytes>,
{
    let metadata = parse_metadata(meta)?;
    decode(chunks, &metadata)
}

fn check_empty_extent(shape: &Shape) -> Result<(), DecodeError> {
    match shape.checked_nonzero_extent() {
        Some(extent) if extent <= MAX_EMPTY_EXTENT => Ok(()),
        _ => Err(DecodeError::EmptyExtent {
            shape: shape.dims().to_vec(),
            limit: MAX_EMPTY_EXTENT,
        }),
    }
}

/// Chunk lengths must already be validated.
fn decode_elements(
    dtype: DType,
    chunks: &[Bytes],
    total: usize,
) -> Result<ElementBuffer, DecodeError> {
    macro_rules! native {
        ($variant:ident, $ty:ty) => {{
            const WIDTH: usize = std::mem::size_of::<$ty>();
            let mut values = Vec::with_capacity(total);
            for chunk in chunks {
                values.extend(chunk.chunks_exact(WIDTH).map(|b| {
                    let mut raw = [0u8; WIDTH];
                    raw.copy_from_slice(b);
                    <$ty>::from_ne_bytes(raw)
                }));
            }
            ElementBuffer::$variant(values)
        }};
    }

    Ok(match dtype {
        DType::Bool => ElementBuffer::Bool(decode_bool(chunks, total)?),
        DType::I8 => native!(I8, i8),
        DType::I16 => native!(I16, i16),
        DType::I32 => native!(I32, i32),
        DType::I64 => native!(I64, i64),
        DType::U8 => ElementBuffer::U8(chunks.iter().flat_map(|c| c.iter().copied()).collect()),
        DType::U16 => native!(U16, u16),
        DType::U32 => native!(U32, u32),
        DType::U64 => native!(U64, u64),
        DType::F16 => native!(F16, f16),
        DType::F32 => native!(F32, f32),
        DType::F64 => native!(F64, f64),
    })
}

// A bool occupies one byte holding 0 or 1; any other byte has no bool meaning.
fn decode_bool(chunks: &[Bytes], total: usize) -> Result<Vec<bool>, DecodeError> {
    let mut values = Vec::with_capacity(total);
    for (index, chunk) in chunks.iter().enumerate() {
        for (offset, &value) in chunk.iter().enumerate() {
            values.push(match value {
                0 => false,
                1 => true,
                _ => {
                    return Err(DecodeError::InvalidBool {
                        index,
                        offset,
                        value,
                    })
                }
            });
        }
    }
    Ok(values)
}
