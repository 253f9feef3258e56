// Model export
// Burn record encoding of the trick network, full precision or int8-snapped

use burn::module::{ModuleMapper, ModuleVisitor, ParamId};
use burn::prelude::*;
use burn::record::{
    BinBytesRecorder, FullPrecisionSettings, HalfPrecisionSettings, Recorder, RecorderError,
};
use burn::tensor::ElementConversion;

use crate::model::backend::ExportVariant;
use crate::model::network::{TrickNet, TrickNetConfig};

/// Largest magnitude of a symmetric int8 code
const INT8_LEVELS: f32 = 127.0;

/// Snaps every weight matrix and kernel onto a symmetric per-tensor int8
/// grid. Biases, normalization parameters and running statistics are 1-D
/// and stay as they are.
#[derive(Debug, Default)]
pub struct Int8Weights;

impl<B: Backend> ModuleMapper<B> for Int8Weights {
    fn map_float<const D: usize>(&mut self, _id: ParamId, tensor: Tensor<B, D>) -> Tensor<B, D> {
        if D < 2 {
            return tensor;
        }

        let max_abs: f32 = tensor.clone().abs().max().into_scalar().elem();
        if !(max_abs > 0.0 && max_abs.is_finite()) {
            return tensor;
        }

        let scale = max_abs / INT8_LEVELS;
        tensor
            .div_scalar(scale)
            .round()
            .clamp(-INT8_LEVELS, INT8_LEVELS)
            .mul_scalar(scale)
    }
}

/// Finds the first parameter tensor holding NaN or infinity
#[derive(Debug, Default)]
struct FiniteCheck {
    visited: usize,
    non_finite: Option<usize>,
}

impl<B: Backend> ModuleVisitor<B> for FiniteCheck {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        if self.non_finite.is_none() && !tensor.to_data().iter::<f32>().all(f32::is_finite) {
            self.non_finite = Some(self.visited);
        }
        self.visited += 1;
    }
}

/// Index, in visiting order, of the first parameter tensor that is not finite
pub fn first_non_finite<B: Backend>(network: &TrickNet<B>) -> Option<usize> {
    let mut check = FiniteCheck::default();
    network.visit(&mut check);
    check.non_finite
}

/// Serialize `network` as a binary burn record.
///
/// The standard variant keeps f32 weights. The quantized variant snaps the
/// weights to int8 levels and stores them at half precision.
pub fn encode_network<B: Backend>(
    network: &TrickNet<B>,
    variant: ExportVariant,
) -> Result<Vec<u8>, RecorderError> {
    match variant {
        ExportVariant::Standard => BinBytesRecorder::<FullPrecisionSettings>::default()
            .record(network.clone().into_record(), ()),
        ExportVariant::Quantized => {
            let snapped = network.clone().map(&mut Int8Weights);
            BinBytesRecorder::<HalfPrecisionSettings>::default().record(snapped.into_record(), ())
        }
    }
}

/// Rebuild a network from bytes written by [`encode_network`]
pub fn decode_network<B: Backend>(
    config: &TrickNetConfig,
    bytes: Vec<u8>,
    variant: ExportVariant,
    device: &B::Device,
) -> Result<TrickNet<B>, RecorderError> {
    let network = config.init::<B>(device);
    let record: <TrickNet<B> as Module<B>>::Record = match variant {
        ExportVariant::Standard => {
            BinBytesRecorder::<FullPrecisionSettings>::default().load(bytes, device)?
        }
        ExportVariant::Quantized => {
            BinBytesRecorder::<HalfPrecisionSettings>::default().load(bytes, device)?
        }
    };
    Ok(network.load_record(record))
}
