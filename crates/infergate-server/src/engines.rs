use anyhow::{bail, Context, Result};
use half::f16;
use infergate_core::{BatchPredict, DType, Element, ElementBuffer, Shape, TensorBatch};

/// Returns its input batch unchanged.
pub struct EchoEngine;

impl BatchPredict for EchoEngine {
    type Output = TensorBatch;

    fn batch_predict(&self, batch: TensorBatch) -> Result<TensorBatch> {
        Ok(batch)
    }
}

/// Arithmetic mean of every item in the batch, as a `float64` vector.
pub struct MeanEngine;

impl BatchPredict for MeanEngine {
    type Output = TensorBatch;

    fn batch_predict(&self, batch: TensorBatch) -> Result<TensorBatch> {
        let width: usize = batch.item_shape().iter().product();
        if width == 0 {
            bail!("cannot average zero-sized items of shape {:?}", batch.item_shape());
        }

        let values = match batch.dtype() {
            DType::Bool => widen(&batch, |v: bool| if v { 1.0 } else { 0.0 })?,
            DType::I8 => widen::<i8, _>(&batch, f64::from)?,
            DType::I16 => widen::<i16, _>(&batch, f64::from)?,
            DType::I32 => widen::<i32, _>(&batch, f64::from)?,
            DType::I64 => widen(&batch, |v: i64| v as f64)?,
            DType::U8 => widen::<u8, _>(&batch, f64::from)?,
            DType::U16 => widen::<u16, _>(&batch, f64::from)?,
            DType::U32 => widen::<u32, _>(&batch, f64::from)?,
            DType::U64 => widen(&batch, |v: u64| v as f64)?,
            DType::F16 => widen(&batch, f16::to_f64)?,
            DType::F32 => widen::<f32, _>(&batch, f64::from)?,
            DType::F64 => widen(&batch, |v: f64| v)?,
        };

        let means: Vec<f64> = values
            .chunks_exact(width)
            .map(|item| item.iter().sum::<f64>() / width as f64)
            .collect();
        Ok(TensorBatch::from_buffer(
            Shape::from_slice(&[means.len()]),
            ElementBuffer::F64(means),
        )?)
    }
}

fn widen<T, F>(batch: &TensorBatch, to_f64: F) -> Result<Vec<f64>>
where
    T: Element + Copy,
    F: Fn(T) -> f64,
{
    let values = batch
        .values::<T>()
        .with_context(|| format!("batch is not a contiguous {} tensor", batch.dtype()))?;
    Ok(values.iter().copied().map(to_f64).collect())
}
