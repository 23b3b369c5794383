use std::fs;
use std::path::Path;

use image::{Rgb, RgbImage};
use ndarray::Array4;
use serde_json::json;

use palette_infer::image::ImageTensor;
use palette_infer::model::{Restoration, RestorationInputs, TrainConfig};
use palette_infer::{generate_with_model, GenerateOptions};

/// Returns a white image shaped like the ground truth.
#[derive(Default)]
struct WhiteModel {
    calls: usize,
    input_shape: Vec<usize>,
}

impl Restoration for WhiteModel {
    fn restoration(
        &mut self,
        inputs: RestorationInputs<'_>,
        sample_num: usize,
    ) -> palette_infer::Result<ImageTensor> {
        assert!(sample_num > 0);
        assert_eq!(inputs.y_cond.dim(), inputs.y_0.dim());
        assert_eq!(inputs.y_t.dim(), inputs.y_0.dim());
        self.calls += 1;
        self.input_shape = inputs.y_0.shape().to_vec();
        Ok(Array4::ones(inputs.y_0.raw_dim()))
    }
}

fn train_config() -> TrainConfig {
    serde_json::from_value(json!({
        "model_type": "palette",
        "G_nblocks": 2,
        "data_load_size": 16,
        "data_online_creation_crop_size_A": 32,
        "data_online_creation_mask_delta_A": [0],
        "data_online_creation_rand_mask_A": true,
        "alg_palette_cond_image_creation": "y_t",
        "train_batch_size": 4
    }))
    .expect("train config")
}

fn write_inputs(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let img = RgbImage::from_fn(64, 64, |x, y| Rgb([x as u8 * 2, y as u8 * 2, 64]));
    let img_path = dir.join("frame.png");
    img.save(&img_path).expect("save input");

    let bbox_path = dir.join("frame.txt");
    fs::write(&bbox_path, "1 20 22 30 34\n").expect("write bbox");

    (img_path, bbox_path)
}

#[test]
fn generate_pastes_crop_back_and_writes_outputs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (img_in, bbox_in) = write_inputs(dir.path());
    let dir_out = dir.path().join("out");

    let options = GenerateOptions {
        img_in,
        bbox_in: Some(bbox_in),
        bbox_ref_id: 0,
        seed: Some(0),
        dir_out: dir_out.clone(),
        name: "gen_0".to_string(),
        ..GenerateOptions::default()
    };

    let mut model = WhiteModel::default();
    let generated = generate_with_model(&mut model, &train_config(), &options).expect("generate");

    assert_eq!(model.calls, 1);
    assert_eq!(model.input_shape, vec![1, 3, 16, 16]);
    assert_eq!(generated.bbox_index, Some(0));
    assert_eq!(generated.image.dimensions(), (64, 64));

    let sel = generated.selection.expect("selection");
    assert_eq!(sel.width(), 32);
    assert_eq!(sel.height(), 32);
    assert!(sel.xmin <= 20 && sel.xmax >= 30);
    assert!(sel.ymin <= 22 && sel.ymax >= 34);

    for (x, y, pixel) in generated.image.enumerate_pixels() {
        let (xi, yi) = (x as i32, y as i32);
        let inside = xi >= sel.xmin && xi < sel.xmax && yi >= sel.ymin && yi < sel.ymax;
        if inside {
            assert!(pixel.0.iter().all(|&c| c >= 250));
        } else {
            assert_eq!(pixel, generated.original.get_pixel(x, y));
        }
    }

    for suffix in [
        "orig",
        "generated_crop",
        "cond",
        "generated",
        "y_0",
        "y_t",
        "mask",
    ] {
        let path = dir_out.join(format!("gen_0_{suffix}.png"));
        assert!(path.exists(), "missing {}", path.display());
    }
}

#[test]
fn generate_without_bbox_keeps_original_size() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (img_in, _) = write_inputs(dir.path());

    let options = GenerateOptions {
        img_in,
        img_width: 24,
        img_height: 20,
        seed: Some(1),
        write: false,
        ..GenerateOptions::default()
    };

    let mut model = WhiteModel::default();
    let generated = generate_with_model(&mut model, &train_config(), &options).expect("generate");

    assert_eq!(model.input_shape, vec![1, 3, 20, 24]);
    assert_eq!(generated.selection, None);
    assert_eq!(generated.image.dimensions(), (64, 64));
    assert!(fs::read_dir(dir.path()).expect("read dir").count() == 2);
}

#[test]
fn unknown_conditioning_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (img_in, _) = write_inputs(dir.path());

    let mut config = train_config();
    config.alg_palette_cond_image_creation = "optical_flow".to_string();

    let options = GenerateOptions {
        img_in,
        write: false,
        ..GenerateOptions::default()
    };

    let mut model = WhiteModel::default();
    let err = generate_with_model(&mut model, &config, &options).expect_err("should fail");
    assert!(format!("{err}").contains("optical_flow"));
    assert_eq!(model.calls, 0);
}

#[test]
fn same_seed_gives_same_noise() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (img_in, bbox_in) = write_inputs(dir.path());

    let options = GenerateOptions {
        img_in,
        bbox_in: Some(bbox_in),
        seed: Some(1234),
        write: false,
        ..GenerateOptions::default()
    };

    let config = train_config();
    let a = generate_with_model(&mut WhiteModel::default(), &config, &options).expect("first");
    let b = generate_with_model(&mut WhiteModel::default(), &config, &options).expect("second");

    assert_eq!(a.y_t, b.y_t);
    assert_eq!(a.selection, b.selection);
}
