use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_cross_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use mtcnn_cascade::model_dir;
use mtcnn_cascade::mtcnn::{DetectorConfig, FoundFace, ModelConfig, MtcnnDetector, Stage};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Detect faces with the MTCNN cascade")]
struct Args {
    /// Images to scan.
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Directory holding det1.onnx, det2.onnx and det3.onnx.
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// JSON file with detector settings.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    min_size: Option<u32>,

    #[arg(long)]
    factor: Option<f64>,

    /// Per-stage score thresholds, e.g. `0.6,0.7,0.7`.
    #[arg(long, value_delimiter = ',', num_args = 3)]
    thresholds: Option<Vec<f32>>,

    /// Last stage to run (1-3).
    #[arg(long)]
    stage: Option<u8>,

    /// Write annotated copies of the images here.
    #[arg(long)]
    draw: Option<PathBuf>,

    /// ONNX Runtime intra-op threads.
    #[arg(long, default_value_t = 4)]
    threads: usize,
}

#[derive(Serialize)]
struct Detection<'a> {
    path: &'a str,
    faces: Vec<FoundFace>,
}

fn detector_config(args: &Args) -> Result<DetectorConfig> {
    let mut config = match &args.config {
        Some(path) => DetectorConfig::from_json_file(path).with_context(|| format!("reading {}", path.display()))?,
        None => DetectorConfig::default(),
    };
    if let Some(min_size) = args.min_size {
        config.min_size = min_size;
    }
    if let Some(factor) = args.factor {
        config.factor = factor;
    }
    if let Some(thresholds) = &args.thresholds {
        config.thresholds = thresholds.as_slice().try_into().context("expected 3 thresholds")?;
    }
    if let Some(stage) = args.stage {
        config.stage = Stage::try_from(stage)?;
    }
    config.validate()?;
    Ok(config)
}

fn draw_faces(image: &RgbImage, faces: &[FoundFace]) -> RgbImage {
    let mut palette = image.clone();
    for face in faces {
        let [xmin, ymin, xmax, ymax] = face.bbox;
        let width = (xmax - xmin + 1.0).max(1.0) as u32;
        let height = (ymax - ymin + 1.0).max(1.0) as u32;
        draw_hollow_rect_mut(&mut palette, Rect::at(xmin as i32, ymin as i32).of_size(width, height), Rgb([255, 0, 0]));
        for [x, y] in face.landmarks {
            if x > 0.0 || y > 0.0 {
                draw_cross_mut(&mut palette, Rgb([0, 255, 0]), x as i32, y as i32);
            }
        }
    }
    palette
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = detector_config(&args)?;
    debug!("{:?}", config);

    let mut models = ModelConfig::from_dir(args.model_dir.clone().unwrap_or_else(model_dir));
    models.intra_threads = args.threads;
    let mut detector = MtcnnDetector::from_models(&models)?;

    if let Some(dir) = &args.draw {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    for path in &args.images {
        let image = image::open(path)
            .with_context(|| format!("opening {}", path.display()))?
            .into_rgb8();
        let now = Instant::now();
        let faces = detector
            .detect_with(&image, &config)?
            .iter()
            .map(FoundFace::from)
            .collect::<Vec<_>>();
        info!("{}: {} faces in {:?}", path.display(), faces.len(), now.elapsed());

        if let Some(dir) = &args.draw {
            let file_name = path.file_name().context("image path has no file name")?;
            let out = dir.join(file_name);
            draw_faces(&image, &faces)
                .save(&out)
                .with_context(|| format!("writing {}", out.display()))?;
        }

        let path = path.to_string_lossy();
        println!("{}", serde_json::to_string(&Detection { path: &path, faces })?);
    }
    Ok(())
}
