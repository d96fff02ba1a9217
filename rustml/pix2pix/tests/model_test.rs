use rustml_grad::{tape, Adam, Module, Optimizer, Tensor};
use rustml_pix2pix::*;

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
    config.train.epochs_decay = 1;
    config.train.pool_size = 2;
    config.train.seed = Some(42);
    config
}

fn batch(n: usize) -> (Tensor, Tensor, Tensor) {
    (
        Tensor::rand_uniform([n, 2, 32, 32], 0.0, 1.0),
        Tensor::rand_uniform([n, 3, 32, 32], 0.0, 1.0),
        Tensor::rand_uniform([n, 32, 32], 0.0, 1.0),
    )
}

fn snapshot(module: &dyn Module) -> Vec<Vec<f32>> {
    module.parameters().iter().map(|p| p.to_vec()).collect()
}

#[test]
fn optimize_parameters_updates_both_networks() {
    let mut model = Pix2PixModel::new(tiny_config()).unwrap();
    let (content, style, target) = batch(2);
    model.set_input(&content, &style, &target).unwrap();

    let g_before = snapshot(model.generator());
    let d_before = snapshot(model.discriminator());
    let report = model.optimize_parameters().unwrap();

    for (_, value) in report.entries() {
        assert!(value.is_finite());
    }
    assert!((report.d - 0.5 * (report.d_fake + report.d_real)).abs() < 1e-5);
    assert!((report.g - (report.g_gan + report.g_l1)).abs() < 1e-5);
    assert_ne!(snapshot(model.generator()), g_before);
    assert_ne!(snapshot(model.discriminator()), d_before);
    assert_eq!(model.fake().unwrap().shape(), &[2, 1, 32, 32]);
    assert_eq!(tape::tape_len(), 0);
}

#[test]
fn l1_term_is_weighted() {
    let mut config = tiny_config();
    config.train.lambda_l1 = 0.0;
    let mut model = Pix2PixModel::new(config).unwrap();
    let (content, style, target) = batch(1);
    model.set_input(&content, &style, &target).unwrap();
    let report = model.optimize_parameters().unwrap();
    assert_eq!(report.g_l1, 0.0);
    assert!((report.g - report.g_gan).abs() < 1e-6);
}

#[test]
fn vanilla_objective_trains_too() {
    let mut config = tiny_config();
    config.train.use_lsgan = false;
    let mut model = Pix2PixModel::new(config).unwrap();
    let (content, style, target) = batch(1);
    model.set_input(&content, &style, &target).unwrap();
    let report = model.optimize_parameters().unwrap();
    assert!(report.d_fake > 0.0 && report.d_real > 0.0);
}

#[test]
fn generate_does_not_record() {
    let mut model = Pix2PixModel::new(tiny_config()).unwrap();
    let (content, style, _) = batch(1);
    tape::clear_tape();
    let fake = model.generate(&content, &style).unwrap();
    assert_eq!(fake.shape(), &[1, 1, 32, 32]);
    assert!(fake.to_vec().iter().all(|v| (0.0..=1.0).contains(v)));
    assert_eq!(tape::tape_len(), 0);
}

#[test]
fn checkpoint_restores_generator_output() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.safetensors");
    let mut model = Pix2PixModel::new(tiny_config()).unwrap();
    let (content, style, target) = batch(1);
    model.set_input(&content, &style, &target).unwrap();
    model.optimize_parameters().unwrap();
    model.save(&path, 3).unwrap();

    let (mut restored, epoch) = Pix2PixModel::load(&path).unwrap();
    assert_eq!(epoch, 3);
    assert_eq!(restored.config(), model.config());
    model.eval();
    restored.eval();
    let expected = model.generate(&content, &style).unwrap().to_vec();
    let actual = restored.generate(&content, &style).unwrap().to_vec();
    for (a, b) in expected.iter().zip(&actual) {
        assert!((a - b).abs() < 1e-6);
    }
}

#[test]
fn checkpoint_from_other_shape_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.safetensors");
    Pix2PixModel::new(tiny_config()).unwrap().save(&path, 1).unwrap();

    let checkpoint = rustml_grad::Checkpoint::load(&path).unwrap();
    let config = Pix2PixModel::checkpoint_config(&checkpoint).unwrap();
    assert_eq!(config.model.ngf, 2);

    let mut wider = tiny_config();
    wider.model.ngf = 4;
    let mut other = Generator::new(&wider.model).unwrap();
    assert!(checkpoint.load_into_module("generator", &mut other).is_err());
}

#[test]
fn discriminator_loss_stops_at_the_fake_without_a_pool() {
    for pool_size in [0, 4] {
        let mut config = tiny_config();
        config.train.pool_size = pool_size;
        let mut model = Pix2PixModel::new(config).unwrap();
        let (content, style, target) = batch(1);
        model.set_input(&content, &style, &target).unwrap();

        tape::clear_tape();
        model.forward().unwrap();
        tape::zero_grad();
        model.backward_d().unwrap();

        let g_with_grad = model
            .generator()
            .parameters()
            .iter()
            .filter(|p| tape::grad(p).is_some())
            .count();
        let d_with_grad = model
            .discriminator()
            .parameters()
            .iter()
            .filter(|p| tape::grad(p).is_some())
            .count();
        assert_eq!(g_with_grad, 0, "pool_size {pool_size}");
        assert!(d_with_grad > 0, "pool_size {pool_size}");
        tape::clear_tape();
    }
}

#[test]
fn adversarial_term_alone_trains_the_generator() {
    let mut config = tiny_config();
    config.train.lambda_l1 = 0.0;
    let mut model = Pix2PixModel::new(config).unwrap();
    let (content, style, target) = batch(1);
    model.set_input(&content, &style, &target).unwrap();

    // gradient reaches G through D with no L1 term
    tape::clear_tape();
    model.forward().unwrap();
    tape::zero_grad();
    model.backward_g().unwrap();
    let g_with_grad = model
        .generator()
        .parameters()
        .iter()
        .filter(|p| tape::grad(p).is_some())
        .count();
    assert!(g_with_grad > 0);
    tape::clear_tape();

    let g_before = snapshot(model.generator());
    model.optimize_parameters().unwrap();
    let g_changed = snapshot(model.generator())
        .iter()
        .zip(&g_before)
        .filter(|(a, b)| a != b)
        .count();
    assert!(g_changed > 0);

    // left frozen after the generator phase
    assert!(model
        .discriminator()
        .parameters()
        .iter()
        .all(|p| !p.requires_grad()));
}

#[test]
fn frozen_discriminator_passes_gradient_but_does_not_move() {
    let config = tiny_config();
    let mut net_d = Discriminator::new(&config.model).unwrap();
    set_requires_grad(&mut net_d, false);
    let (content, style, _) = batch(1);
    let mut fake = Tensor::rand_uniform([1, 1, 32, 32], 0.0, 1.0);
    fake.set_requires_grad(true);

    tape::clear_tape();
    let pred = net_d.forward(&fake, &style, &content).unwrap();
    let loss = GanLoss::from_lsgan_flag(true).forward(&pred, true).unwrap();
    tape::backward(&loss);
    assert!(tape::grad(&fake).is_some());

    let before = snapshot(&net_d);
    let mut adam = Adam::new(0.1);
    let mut params = net_d.parameters_mut();
    adam.step(&mut params).unwrap();
    drop(params);
    assert_eq!(snapshot(&net_d), before);
    tape::clear_tape();
}
