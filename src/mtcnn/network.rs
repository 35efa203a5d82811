use std::path::Path;
use std::time::Instant;

use ndarray::{Array4, ArrayD};
use ort::execution_providers::CPUExecutionProvider;
use ort::inputs;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use tracing::{debug, info};

use crate::error::{DetectError, Result};

pub const INPUT_NAME: &str = "data";
/// Proposal network: box regression, face probability.
pub const PNET_OUTPUTS: [&str; 2] = ["conv4-2", "prob1"];
/// Refine network: box regression, face probability.
pub const RNET_OUTPUTS: [&str; 2] = ["conv5-2", "prob1"];
/// Output network: box regression, landmark regression, face probability.
pub const ONET_OUTPUTS: [&str; 3] = ["conv6-2", "conv6-3", "prob1"];

/// A loaded model that can run one forward pass.
pub trait Network {
    /// Feeds `input` to the port `input_name` and returns the tensors named in
    /// `output_names`, in that order.
    fn forward(&mut self, input: Array4<f32>, input_name: &str, output_names: &[&str]) -> Result<Vec<ArrayD<f32>>>;
}

pub struct OrtNetwork {
    session: Session,
    name: String,
}

impl OrtNetwork {
    pub fn from_file(path: impl AsRef<Path>, intra_threads: usize) -> Result<OrtNetwork> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DetectError::ModelNotFound(path.to_path_buf()));
        }
        let session = Session::builder()?
            .with_execution_providers([CPUExecutionProvider::default().build()])?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .commit_from_file(path)?;
        info!("Loaded model: {}", path.display());
        Ok(OrtNetwork {
            session,
            name: path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
        })
    }
}

impl Network for OrtNetwork {
    fn forward(&mut self, input: Array4<f32>, input_name: &str, output_names: &[&str]) -> Result<Vec<ArrayD<f32>>> {
        debug!("{} input: {:?}", self.name, input.dim());
        let now = Instant::now();

        let model_res = self.session.run(inputs! {input_name => Tensor::from_array(input)?})?;

        let mut outputs = Vec::with_capacity(output_names.len());
        for &label in output_names {
            let value = model_res
                .get(label)
                .ok_or_else(|| DetectError::MissingOutput(label.to_string()))?;
            outputs.push(value.try_extract_array::<f32>()?.into_owned());
        }
        debug!("{} inferred time: {:?}", self.name, now.elapsed());
        Ok(outputs)
    }
}

pub(crate) fn expect_outputs<const N: usize>(outputs: Vec<ArrayD<f32>>, network: &'static str) -> Result<[ArrayD<f32>; N]> {
    let count = outputs.len();
    outputs.try_into().map_err(|_| DetectError::ShapeMismatch {
        network,
        detail: format!("expected {N} output tensors, got {count}"),
    })
}
