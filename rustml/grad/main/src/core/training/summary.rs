use crate::api::layer::Module;

fn human_bytes(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b >= KB * KB {
        format!("{bytes} bytes ({:.2} MB)", b / (KB * KB))
    } else if b >= KB {
        format!("{bytes} bytes ({:.2} KB)", b / KB)
    } else {
        format!("{bytes} bytes")
    }
}

/// Parameter budget of a network: tensor count, total and trainable values,
/// the largest single tensor and the f32 memory footprint.
pub fn model_summary(model: &dyn Module) -> String {
    let params = model.parameters();
    let total: usize = params.iter().map(|p| p.numel()).sum();
    let trainable: usize = params
        .iter()
        .filter(|p| p.requires_grad())
        .map(|p| p.numel())
        .sum();
    let largest = params
        .iter()
        .max_by_key(|p| p.numel())
        .map(|p| format!("{:?}", p.shape()))
        .unwrap_or_else(|| "-".to_string());

    [
        "===== Model Summary =====".to_string(),
        format!("Parameter tensors:    {}", params.len()),
        format!("Total parameters:     {total}"),
        format!("Trainable parameters: {trainable}"),
        format!("Largest tensor:       {largest}"),
        format!("Memory estimate:      {}", human_bytes(total * std::mem::size_of::<f32>())),
        "=========================".to_string(),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::nn::activations::LeakyReLU;
    use crate::core::nn::conv2d::Conv2d;
    use crate::core::nn::linear::Linear;
    use crate::core::nn::sequential::Sequential;

    #[test]
    fn summary_single_linear() {
        let layer = Linear::new(4, 3);
        let summary = model_summary(&layer);

        // Linear(4, 3): weight [3,4] = 12 params + bias [3] = 3 params => 15 total
        assert!(summary.contains("Total parameters:     15"));
        assert!(summary.contains("Trainable parameters: 15"));
        assert!(summary.contains("Parameter tensors:    2"));
        assert!(summary.contains("Largest tensor:       [3, 4]"));
        assert!(summary.contains("60 bytes"));
    }

    #[test]
    fn summary_counts_frozen_parameters_separately() {
        let mut model = Sequential::new(vec![
            Box::new(Conv2d::new(1, 4, 3, 1, 1, false)),
            Box::new(LeakyReLU::new(0.2)),
            Box::new(Conv2d::new(4, 2, 3, 1, 1, true)),
        ]);
        // 36 + (72 + 2) = 110 params
        let summary = model_summary(&model);
        assert!(summary.contains("Total parameters:     110"));

        model.set_requires_grad(false);
        let summary = model_summary(&model);
        assert!(summary.contains("Trainable parameters: 0"));
        assert!(summary.contains("440 bytes"));
    }
}
