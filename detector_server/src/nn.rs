//! Classifier adapter around a pretrained ImageNet model.
//!
//! The model is a MobileNetV2 exported to ONNX and run with `tract`. The network returns 1000
//! logits which are turned into a ranked list of `Prediction`s.
use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use common::protocol::Prediction;
use futures::{future::BoxFuture, FutureExt};
use image::RgbImage;
use ndarray::ArrayView1;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tract_onnx::prelude::*;

use crate::utils::download_file;

type NnModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

pub const MODEL_FILE: &str = "mobilenetv2-7.onnx";
pub const LABELS_FILE: &str = "imagenet_classes.txt";
pub const DEFAULT_MODEL_URL: &str =
    "https://github.com/onnx/models/raw/main/validated/vision/classification/mobilenet/model/mobilenetv2-7.onnx";
pub const DEFAULT_LABELS_URL: &str =
    "https://raw.githubusercontent.com/pytorch/hub/master/imagenet_classes.txt";

/// Classify a single frame into labels ranked by descending probability.
pub trait Classifier: Send + Sync {
    fn classify(&self, frame: &RgbImage) -> Result<Vec<Prediction>>;
}

/// Loads a classifier once per session.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> BoxFuture<'static, Result<Arc<dyn Classifier>>>;
}

pub struct MobileNetClassifier {
    model: NnModel,
    labels: Vec<String>,
    width: u32,
    height: u32,
    top_k: usize,
}

impl MobileNetClassifier {
    pub fn load(files: &ModelFiles, top_k: usize) -> Result<Self> {
        let (width, height) = (224, 224);
        let input_fact = InferenceFact::dt_shape(
            f32::datum_type(),
            tvec!(1, 3, height as usize, width as usize),
        );
        let model = tract_onnx::onnx()
            .model_for_path(&files.model)
            .with_context(|| format!("failed to read model {}", files.model.display()))?
            .with_input_fact(0, input_fact)?
            .into_optimized()?
            .into_runnable()?;

        let labels = read_labels(&files.labels)?;
        log::info!(
            "Loaded classifier {} with {} labels",
            files.model.display(),
            labels.len()
        );

        Ok(Self {
            model,
            labels,
            width,
            height,
            top_k,
        })
    }

    fn preproc(&self, input: &RgbImage) -> Tensor {
        preproc_imagenet(input, self.width, self.height)
    }
}

impl Classifier for MobileNetClassifier {
    fn classify(&self, frame: &RgbImage) -> Result<Vec<Prediction>> {
        let raw_nn_out = self.model.run(tvec!(self.preproc(frame).into()))?;
        let logits: Vec<f32> = raw_nn_out[0].to_array_view::<f32>()?.iter().copied().collect();

        rank_predictions(&logits, &self.labels, self.top_k)
    }
}

/// Resize and normalize an image into a `1x3xHxW` tensor with ImageNet mean and std.
pub fn preproc_imagenet(input: &RgbImage, width: u32, height: u32) -> Tensor {
    let resized: RgbImage =
        image::imageops::resize(input, width, height, image::imageops::FilterType::Triangle);

    tract_ndarray::Array4::from_shape_fn((1, 3, height as usize, width as usize), |(_, c, y, x)| {
        let mean = [0.485, 0.456, 0.406][c];
        let std = [0.229, 0.224, 0.225][c];
        (resized[(x as _, y as _)][c] as f32 / 255.0 - mean) / std
    })
    .into()
}

/// Softmax over the logits, paired with labels and cut to the `top_k` most probable ones.
pub fn rank_predictions(logits: &[f32], labels: &[String], top_k: usize) -> Result<Vec<Prediction>> {
    if logits.len() != labels.len() {
        bail!(
            "model returned {} scores for {} labels",
            logits.len(),
            labels.len()
        );
    }

    let logits = ArrayView1::from(logits);
    let max = logits.fold(f32::NEG_INFINITY, |acc, &x| acc.max(x));
    let exp = logits.mapv(|x| (x - max).exp());
    let sum = exp.sum();

    let mut ranked: Vec<(usize, f32)> = exp.iter().map(|x| x / sum).enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    Ok(ranked
        .into_iter()
        .take(top_k)
        .map(|(idx, probability)| Prediction::new(labels[idx].clone(), probability))
        .collect())
}

/// Read one label per line.
pub fn read_labels(path: &std::path::Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read labels {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect())
}

/// Decode an MJPEG frame.
pub fn decode_jpeg(data: &[u8]) -> Result<RgbImage> {
    turbojpeg::decompress_image(data).context("failed to decompress frame")
}

/// Local paths of the model and its labels.
#[derive(Clone, Debug)]
pub struct ModelFiles {
    pub model: PathBuf,
    pub labels: PathBuf,
}

/// Where model files live and where to fetch them from when missing.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ModelSource {
    pub dir: PathBuf,
    pub model_url: String,
    pub labels_url: String,
    pub offline: bool,
}

impl ModelSource {
    pub fn files(&self) -> ModelFiles {
        ModelFiles {
            model: self.dir.join(MODEL_FILE),
            labels: self.dir.join(LABELS_FILE),
        }
    }

    /// Make sure both files exist locally, downloading them if allowed.
    pub async fn ensure_files(&self) -> Result<ModelFiles> {
        let files = self.files();
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create model dir {}", self.dir.display()))?;

        let client = Client::new();
        for (path, url) in [
            (&files.model, &self.model_url),
            (&files.labels, &self.labels_url),
        ] {
            if path.exists() {
                continue;
            }
            if self.offline {
                bail!("{} is missing and downloads are disabled", path.display());
            }
            download_file(&client, url, path).await?;
        }

        Ok(files)
    }
}

/// Loader fetching and compiling the ONNX classifier.
pub struct OnnxModelLoader {
    source: ModelSource,
    top_k: usize,
}

impl OnnxModelLoader {
    pub fn new(source: ModelSource, top_k: usize) -> Self {
        Self { source, top_k }
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load(&self) -> BoxFuture<'static, Result<Arc<dyn Classifier>>> {
        let source = self.source.clone();
        let top_k = self.top_k;
        async move {
            let files = source.ensure_files().await?;
            let classifier =
                tokio::task::spawn_blocking(move || MobileNetClassifier::load(&files, top_k))
                    .await
                    .context("model loading task failed")??;
            Ok::<_, anyhow::Error>(Arc::new(classifier) as Arc<dyn Classifier>)
        }
        .boxed()
    }
}
