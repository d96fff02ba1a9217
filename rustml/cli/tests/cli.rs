use std::path::Path;
use std::process::Command;

use rustml_grad::Tensor;
use rustml_pix2pix::{write_sample_dir, GlyphSample, ModelConfig, Pix2PixConfig, Pix2PixModel};

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_sweai"))
}

fn tiny_config() -> Pix2PixConfig {
    let mut config = Pix2PixConfig {
        model: ModelConfig {
            ngf: 2,
            num_downs: 5,
            content_count: 2,
            use_dropout: false,
        },
        ..Default::default()
    };
    config.train.epochs = 1;
    config.train.epochs_decay = 0;
    config.train.pool_size = 2;
    config.train.checkpoint_every = 1;
    config.train.seed = Some(3);
    config
}

fn write_dataset(root: &Path, samples: usize) {
    for i in 0..samples {
        let sample = GlyphSample::new(
            Tensor::rand_uniform([2, 32, 32], 0.0, 1.0),
            Tensor::rand_uniform([2, 32, 32], 0.0, 1.0),
            Tensor::rand_uniform([32, 32], 0.0, 1.0),
        )
        .unwrap();
        write_sample_dir(root.join(format!("glyph_{i:02}")), &sample).unwrap();
    }
}

// ── help ────────────────────────────────────────────────────────────

#[test]
fn help_flag() {
    let out = bin().arg("--help").output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("sweai"));
    assert!(stdout.contains("train"));
    assert!(stdout.contains("generate"));
    assert!(stdout.contains("inspect"));
    assert!(stdout.contains("--log-level"));
}

#[test]
fn train_subcommand_help() {
    let out = bin().args(["train", "--help"]).output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("--data"));
    assert!(stdout.contains("--config"));
    assert!(stdout.contains("--epochs-decay"));
    assert!(stdout.contains("--out"));
}

#[test]
fn unknown_subcommand_fails() {
    let out = bin().arg("serve").output().unwrap();
    assert!(!out.status.success());
}

#[test]
fn log_level_flag_is_global() {
    let dir = tempfile::tempdir().unwrap();
    let out = bin()
        .env_remove("RUST_LOG")
        .args(["inspect", "--log-level", "debug", "--checkpoint"])
        .arg(dir.path().join("missing.safetensors"))
        .output()
        .unwrap();
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("DEBUG"));
    assert!(stderr.contains("Failed to load checkpoint"));
}

// ── inspect ─────────────────────────────────────────────────────────

#[test]
fn inspect_missing_checkpoint_fails() {
    let dir = tempfile::tempdir().unwrap();
    let out = bin()
        .args(["inspect", "--checkpoint"])
        .arg(dir.path().join("nope.safetensors"))
        .output()
        .unwrap();
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Failed to load checkpoint"));
}

#[test]
fn inspect_reports_groups_and_epoch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.safetensors");
    let model = Pix2PixModel::new(tiny_config()).unwrap();
    model.save(&path, 4).unwrap();

    let out = bin().args(["inspect", "--checkpoint"]).arg(&path).output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Epoch:      4"));
    assert!(stdout.contains("generator"));
    assert!(stdout.contains("discriminator"));
    assert!(stdout.contains("image 32x32"));
    assert!(stdout.contains("Total parameters"));
}

#[test]
fn inspect_config_only_is_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.safetensors");
    Pix2PixModel::new(tiny_config()).unwrap().save(&path, 1).unwrap();

    let out = bin()
        .args(["inspect", "--config-only", "--checkpoint"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(out.status.success());
    let config = Pix2PixConfig::from_json(&String::from_utf8_lossy(&out.stdout)).unwrap();
    assert_eq!(config, tiny_config());
}

// ── train / generate ────────────────────────────────────────────────

#[test]
fn train_then_generate() {
    let data = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    write_dataset(data.path(), 2);
    let config_path = out_dir.path().join("tiny.json");
    tiny_config().save(&config_path).unwrap();
    let run_dir = out_dir.path().join("run");

    let out = bin()
        .args(["train", "--data"])
        .arg(data.path())
        .arg("--config")
        .arg(&config_path)
        .arg("--out")
        .arg(&run_dir)
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "train failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("G_L1="));
    let checkpoint = run_dir.join("checkpoints").join("latest.safetensors");
    assert!(checkpoint.exists());
    assert!(run_dir.join("config.json").exists());

    let png = out_dir.path().join("glyph.png");
    let out = bin()
        .args(["generate", "--checkpoint"])
        .arg(&checkpoint)
        .arg("--sample")
        .arg(data.path().join("glyph_00"))
        .arg("--output")
        .arg(&png)
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "generate failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let img = image::open(&png).unwrap();
    assert_eq!((img.width(), img.height()), (32, 32));
}

#[test]
fn train_rejects_empty_dataset() {
    let data = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let out = bin()
        .args(["train", "--data"])
        .arg(data.path())
        .arg("--out")
        .arg(out_dir.path())
        .output()
        .unwrap();
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Failed to load dataset"));
}
