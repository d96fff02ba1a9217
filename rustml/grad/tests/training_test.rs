use rustml_grad::*;

fn step(optimizer: &mut dyn Optimizer, model: &mut dyn Module) {
    let mut params: Vec<&mut Tensor> = model.parameters_mut();
    let mut param_refs: Vec<&mut Tensor> = params.iter_mut().map(|p| &mut **p).collect();
    optimizer.step(&mut param_refs).unwrap();
}

#[test]
fn test_linear_regression_convergence() {
    // Fit Linear(1, 1) to y = 2x + 1
    let mut model = Linear::new(1, 1);
    let mut optimizer = Adam::new(0.05);
    let loss_fn = MSELoss::new();

    let xs: Vec<f32> = (0..20).map(|i| i as f32 * 0.25 - 2.5).collect();
    let ys: Vec<f32> = xs.iter().map(|x| 2.0 * x + 1.0).collect();
    let x = Tensor::from_vec(xs, [20, 1]).unwrap();
    let y = Tensor::from_vec(ys, [20, 1]).unwrap();

    let mut last_loss = f32::MAX;
    for _ in 0..400 {
        tape::clear_tape();
        let out = model.forward(&x).unwrap();
        let loss = loss_fn.forward(&out, &y).unwrap();
        last_loss = loss.item();
        tape::backward(&loss);
        step(&mut optimizer, &mut model);
    }
    tape::clear_tape();

    assert!(
        last_loss < 5e-2,
        "final loss {last_loss} should be < 0.05 after 400 steps"
    );
}

#[test]
fn test_conv_autoencoder_loss_decreases() {
    // A down/up pair must at least learn to reproduce a fixed image.
    let mut model = Sequential::new(vec![
        Box::new(Conv2d::new(1, 4, 4, 2, 1, true)),
        Box::new(LeakyReLU::new(0.2)),
        Box::new(ConvTranspose2d::new(4, 1, 4, 2, 1, true)),
        Box::new(Tanh::new()),
    ]);
    let mut optimizer = Adam::new(0.01).with_betas(0.5, 0.999);
    let loss_fn = L1Loss::new();
    let target = Tensor::from_vec(
        (0..64).map(|i| if (i / 8 + i % 8) % 2 == 0 { 0.5 } else { -0.5 }).collect(),
        [1, 1, 8, 8],
    )
    .unwrap();

    let mut losses = Vec::new();
    for _ in 0..60 {
        tape::clear_tape();
        let out = model.forward(&target).unwrap();
        let loss = loss_fn.forward(&out, &target).unwrap();
        losses.push(loss.item());
        tape::backward(&loss);
        step(&mut optimizer, &mut model);
    }
    tape::clear_tape();

    let first = losses[0];
    let last = *losses.last().unwrap();
    assert!(last < first * 0.8, "loss went from {first} to {last}");
}

#[test]
fn test_no_grad_behavior() {
    tape::clear_tape();

    let mut model = Linear::new(2, 1);
    let input = Tensor::from_vec(vec![1.0, 2.0], [1, 2]).unwrap();
    let target = Tensor::from_vec(vec![3.0], [1, 1]).unwrap();

    // Forward inside no_grad should not record ops
    let output = tape::no_grad(|| model.forward(&input).unwrap());
    let loss = tape::no_grad(|| MSELoss::new().forward(&output, &target).unwrap());
    assert_eq!(tape::tape_len(), 0);

    tape::backward(&loss);
    for param in &model.parameters() {
        assert!(
            tape::grad(param).is_none(),
            "no gradient should be recorded inside no_grad"
        );
    }
    tape::clear_tape();
}

#[test]
fn test_zero_grad_keeps_graph_for_second_loss() {
    tape::clear_tape();

    let mut model = Linear::new(2, 2);
    let input = Tensor::from_vec(vec![1.0, -1.0], [1, 2]).unwrap();
    let out = model.forward(&input).unwrap();

    let first = ops::sum_all(&out);
    tape::backward(&first);
    let g1 = tape::grad(&model.parameters()[1]).unwrap().to_vec();
    assert_eq!(g1, vec![1.0, 1.0]);

    // A second loss over the same forward pass must not see stale gradients.
    tape::zero_grad();
    let second = ops::sum_all(&ops::scale(&out, 3.0, 0.0));
    tape::backward(&second);
    let g2 = tape::grad(&model.parameters()[1]).unwrap().to_vec();
    assert_eq!(g2, vec![3.0, 3.0]);
    tape::clear_tape();
}

#[test]
fn test_frozen_module_is_not_updated() {
    tape::clear_tape();

    let mut model = Linear::new(3, 1);
    model.set_requires_grad(false);
    let before: Vec<Vec<f32>> = model.parameters().iter().map(|p| p.to_vec()).collect();

    let out = model.forward(&Tensor::ones([2, 3])).unwrap();
    tape::backward(&ops::mean_all(&out));
    let mut optimizer = Adam::new(0.1);
    step(&mut optimizer, &mut model);

    let after: Vec<Vec<f32>> = model.parameters().iter().map(|p| p.to_vec()).collect();
    assert_eq!(before, after);
    tape::clear_tape();
}

#[test]
fn test_nested_no_grad() {
    tape::clear_tape();

    let mut model = Linear::new(2, 1);
    let input = Tensor::from_vec(vec![1.0, 2.0], [1, 2]).unwrap();

    tape::no_grad(|| {
        assert!(!tape::is_recording());

        tape::no_grad(|| {
            assert!(!tape::is_recording());
            let _ = model.forward(&input).unwrap();
        });

        assert!(
            !tape::is_recording(),
            "nested no_grad must not re-enable recording on inner exit"
        );
    });

    assert!(tape::is_recording());
}

#[test]
fn test_checkpoint_restores_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.safetensors");

    let original = Sequential::new(vec![
        Box::new(Conv2d::new(2, 3, 3, 1, 1, true)),
        Box::new(InstanceNorm2d::affine(3)),
        Box::new(Linear::new(4, 2)),
    ]);
    let mut checkpoint = Checkpoint::new().with_metadata("epoch", "7");
    checkpoint.add_module("net", &original);
    checkpoint.save(&path).unwrap();

    let mut restored = Sequential::new(vec![
        Box::new(Conv2d::new(2, 3, 3, 1, 1, true)),
        Box::new(InstanceNorm2d::affine(3)),
        Box::new(Linear::new(4, 2)),
    ]);
    let loaded = Checkpoint::load(&path).unwrap();
    assert_eq!(loaded.metadata("epoch"), Some("7"));
    loaded.load_into_module("net", &mut restored).unwrap();

    for (a, b) in original.parameters().iter().zip(restored.parameters()) {
        assert_eq!(a.shape(), b.shape());
        assert_eq!(a.to_vec(), b.to_vec());
    }

    // A model of a different shape must be refused.
    let mut wrong = Sequential::new(vec![Box::new(Linear::new(4, 2))]);
    assert!(loaded.load_into_module("net", &mut wrong).is_err());
}

#[test]
fn test_save_and_load_checkpoint_helpers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("linear.safetensors");

    let model = Linear::new(3, 2);
    save_checkpoint(&model, &path).unwrap();

    let mut other = Linear::new(3, 2);
    load_checkpoint(&mut other, &path).unwrap();
    assert_eq!(model.parameters()[0].to_vec(), other.parameters()[0].to_vec());
}
