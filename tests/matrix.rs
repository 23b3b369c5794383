use std::fs;
use std::path::Path;

use serde_json::{json, Value};

use palette_infer::matrix::{
    run_matrix, Axis, ConfigMatrix, DryRunLauncher, Exclusion, ModelType, TrainOptions,
    TrainingLauncher,
};
use palette_infer::Error;

fn object(value: Value) -> TrainOptions {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

fn nosemantic() -> ConfigMatrix {
    let base = object(json!({
        "name": "joligen_utest",
        "G_netG": "mobile_resnet_attn",
        "data_dataset_mode": "unaligned",
        "data_load_size": 180,
        "data_crop_size": 180,
        "train_n_epochs": 1,
        "train_n_epochs_decay": 0,
        "data_max_dataset_size": 10,
        "model_depth_network": "MiDaS_small"
    }));

    ConfigMatrix::new(base)
        .axis(Axis::models(&[ModelType::Cut, ModelType::CycleGan]))
        .axis(Axis::new(
            "D_netDs",
            [
                json!(["projected_d", "basic"]),
                json!(["projected_d", "basic", "depth"]),
            ],
        ))
        .exclude(Exclusion {
            key: "model_type".to_string(),
            equals: json!("cycle_gan"),
            other_key: "D_netDs".to_string(),
            contains: json!("depth"),
        })
        .with_dataroot(Path::new("/data/horse2zebra"))
}

fn semantic_mask_online() -> ConfigMatrix {
    let base = object(json!({
        "name": "joligen_utest",
        "data_dataset_mode": "unaligned_labeled_mask_online",
        "data_load_size": 180,
        "data_crop_size": 180,
        "data_online_creation_crop_size_A": 420,
        "data_online_creation_crop_delta_A": 50,
        "data_online_creation_mask_delta_A": [50],
        "f_s_semantic_nclasses": 2,
        "D_netDs": ["basic", "projected_d", "temporal"],
        "train_semantic_mask": true
    }));

    ConfigMatrix::new(base)
        .axis(Axis::models(&[ModelType::CycleGan, ModelType::Cut]))
        .axis(Axis::new(
            "G_netG",
            ["mobile_resnet_attn", "segformer_attn_conv"],
        ))
        .axis(Axis::new("D_proj_network_type", ["efficientnet", "vitsmall"]))
        .axis(Axis::new("f_s_net", ["unet"]))
        .suffix_name_with("model_type")
        .with_dataroot(Path::new("/data/online_mario2sonic"))
}

/// Fails on the n-th launch.
struct FailingLauncher {
    remaining: usize,
    launched: usize,
}

impl TrainingLauncher for FailingLauncher {
    fn launch(&mut self, _options: &TrainOptions) -> palette_infer::Result<()> {
        if self.remaining == 0 {
            return Err(Error::InvalidParameter {
                name: "launcher".to_string(),
                reason: "out of GPUs".to_string(),
            });
        }
        self.remaining -= 1;
        self.launched += 1;
        Ok(())
    }
}

#[test]
fn nosemantic_matrix_skips_cycle_gan_with_depth() {
    let mut launcher = DryRunLauncher::default();
    let report = run_matrix(&nosemantic(), &mut launcher).expect("run matrix");

    assert_eq!(report.launched, 3);
    assert_eq!(report.skipped, 1);

    let launched: Vec<(&str, usize)> = launcher
        .launched
        .iter()
        .map(|o| {
            (
                o["model_type"].as_str().unwrap_or_default(),
                o["D_netDs"].as_array().map_or(0, Vec::len),
            )
        })
        .collect();
    assert_eq!(launched, vec![("cut", 2), ("cut", 3), ("cycle_gan", 2)]);

    for options in &launcher.launched {
        assert_eq!(options["dataroot"], "/data/horse2zebra");
        assert_eq!(options["checkpoints_dir"], "/data");
        assert_eq!(options["name"], "joligen_utest");
    }
}

#[test]
fn semantic_matrix_launches_every_combination() {
    let mut launcher = DryRunLauncher::default();
    let report = run_matrix(&semantic_mask_online(), &mut launcher).expect("run matrix");

    assert_eq!(report.launched, 8);
    assert_eq!(report.skipped, 0);

    let first = &launcher.launched[0];
    assert_eq!(first["name"], "joligen_utest_cycle_gan");
    assert_eq!(first["G_netG"], "mobile_resnet_attn");
    assert_eq!(first["D_proj_network_type"], "efficientnet");

    let last = &launcher.launched[7];
    assert_eq!(last["name"], "joligen_utest_cut");
    assert_eq!(last["G_netG"], "segformer_attn_conv");
    assert_eq!(last["D_proj_network_type"], "vitsmall");
    assert_eq!(last["f_s_net"], "unet");
    assert_eq!(last["data_online_creation_crop_size_A"], 420);
}

#[test]
fn first_failure_aborts_the_run() {
    let mut launcher = FailingLauncher {
        remaining: 1,
        launched: 0,
    };
    let err = run_matrix(&nosemantic(), &mut launcher).expect_err("should abort");

    assert_eq!(launcher.launched, 1);
    match err {
        Error::Launch { index, reason, .. } => {
            assert_eq!(index, 1);
            assert!(reason.contains("out of GPUs"));
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn matrix_loads_from_json() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("matrix.json");
    let description = json!({
        "base": {"name": "utest", "data_load_size": 128},
        "axes": [
            {"key": "model_type", "values": ["cut", "palette"]},
            {"key": "train_G_ema", "values": [true, false]}
        ],
        "exclusions": [
            {"key": "model_type", "equals": "palette", "other_key": "train_G_ema", "contains": true}
        ],
        "name_suffix_keys": ["model_type"]
    });
    fs::write(&path, description.to_string()).expect("write matrix");

    let matrix = ConfigMatrix::from_file(&path).expect("load matrix");
    let combos = matrix.combinations().expect("combinations");

    assert_eq!(combos.len(), 4);
    assert_eq!(combos.iter().filter(|c| c.excluded).count(), 1);
    assert_eq!(combos[2].options["name"], "utest_palette");
    assert!(combos[2].excluded);
}

#[test]
fn malformed_matrix_file_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("matrix.json");
    fs::write(&path, "{ not json").expect("write matrix");

    assert!(matches!(
        ConfigMatrix::from_file(&path),
        Err(Error::ConfigParse { .. })
    ));
}
