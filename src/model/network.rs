// Trick classifier network
// Two-scale Conv1d front end, LSTM over the pooled sequence, dense head

use burn::nn::conv::{Conv1d, Conv1dConfig};
use burn::nn::pool::{MaxPool1d, MaxPool1dConfig};
use burn::nn::{
    BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, Lstm, LstmConfig,
    PaddingConfig1d,
};
use burn::prelude::*;
use burn::tensor::activation::{relu, softmax};

/// Layer sizes of [`TrickNet`]
#[derive(Config, Debug)]
pub struct TrickNetConfig {
    /// Columns per input row
    pub features: usize,
    pub classes: usize,

    /// Filters in each of the two parallel front-end convolutions
    #[config(default = 16)]
    pub branch_filters: usize,
    #[config(default = 32)]
    pub conv_filters: usize,
    #[config(default = 32)]
    pub lstm_hidden: usize,
    #[config(default = 32)]
    pub dense_units: usize,

    /// Dropout on the LSTM inputs
    #[config(default = 0.3)]
    pub lstm_dropout: f64,

    /// Dropout before the output layer
    #[config(default = 0.5)]
    pub head_dropout: f64,
}

/// Conv1d(k=3) and Conv1d(k=7) side by side, concatenated, then
/// BatchNorm -> MaxPool -> Conv1d(k=5) -> BatchNorm -> MaxPool -> LSTM ->
/// Dense(relu) -> Dropout -> Dense.
///
/// Each pooling halves the time axis, so inputs need at least 4 rows.
#[derive(Module, Debug)]
pub struct TrickNet<B: Backend> {
    short_conv: Conv1d<B>,
    long_conv: Conv1d<B>,
    norm1: BatchNorm<B, 1>,
    conv2: Conv1d<B>,
    norm2: BatchNorm<B, 1>,
    pool: MaxPool1d,
    lstm_dropout: Dropout,
    lstm: Lstm<B>,
    dense: Linear<B>,
    head_dropout: Dropout,
    output: Linear<B>,
}

impl TrickNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> TrickNet<B> {
        let merged = self.branch_filters * 2;
        let same = |c_in: usize, c_out: usize, kernel: usize| {
            Conv1dConfig::new(c_in, c_out, kernel)
                .with_padding(PaddingConfig1d::Same)
                .init(device)
        };

        TrickNet {
            short_conv: same(self.features, self.branch_filters, 3),
            long_conv: same(self.features, self.branch_filters, 7),
            norm1: BatchNormConfig::new(merged).init(device),
            conv2: same(merged, self.conv_filters, 5),
            norm2: BatchNormConfig::new(self.conv_filters).init(device),
            pool: MaxPool1dConfig::new(2).with_stride(2).init(),
            lstm_dropout: DropoutConfig::new(self.lstm_dropout).init(),
            lstm: LstmConfig::new(self.conv_filters, self.lstm_hidden, true).init(device),
            dense: LinearConfig::new(self.lstm_hidden, self.dense_units).init(device),
            head_dropout: DropoutConfig::new(self.head_dropout).init(),
            output: LinearConfig::new(self.dense_units, self.classes).init(device),
        }
    }
}

impl<B: Backend> TrickNet<B> {
    /// `[batch, timesteps, features]` -> class logits `[batch, classes]`
    pub fn forward(&self, input: Tensor<B, 3>) -> Tensor<B, 2> {
        // Convolutions run over [batch, channels, time]
        let x = input.swap_dims(1, 2);
        let short = relu(self.short_conv.forward(x.clone()));
        let long = relu(self.long_conv.forward(x));
        let x = Tensor::cat(vec![short, long], 1);
        let x = self.pool.forward(self.norm1.forward(x));

        let x = relu(self.conv2.forward(x));
        let x = self.pool.forward(self.norm2.forward(x));

        let x = self.lstm_dropout.forward(x.swap_dims(1, 2));
        let (_, state) = self.lstm.forward(x, None);

        let x = relu(self.dense.forward(state.hidden));
        let x = self.head_dropout.forward(x);
        self.output.forward(x)
    }

    /// Softmax over [`TrickNet::forward`]
    pub fn probabilities(&self, input: Tensor<B, 3>) -> Tensor<B, 2> {
        softmax(self.forward(input), 1)
    }
}
