use burn::prelude::*;

/// Sinusoidal position encodings, shape `[len, d_model]`.
///
///   PE[pos, 2i]   = sin(pos / 10000^(2i / d_model))
///   PE[pos, 2i+1] = cos(pos / 10000^(2i / d_model))
///
/// Computed on the host per call; the table is never trained.
pub fn sinusoidal_encoding<B: Backend>(len: usize, d_model: usize, device: &B::Device) -> Tensor<B, 2> {
    let mut pe = vec![0.0f32; len * d_model];
    for pos in 0..len {
        for i in 0..d_model {
            let angle = pos as f32 / 10000.0f32.powf((2 * (i / 2)) as f32 / d_model as f32);
            pe[pos * d_model + i] = if i % 2 == 0 { angle.sin() } else { angle.cos() };
        }
    }
    Tensor::<B, 1>::from_floats(pe.as_slice(), device).reshape([len, d_model])
}
