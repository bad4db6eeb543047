//! Generalized Advantage Estimation (GAE-λ)

/// Raw standard deviation below which advantages are left unnormalized
pub const ADV_STD_EPS: f32 = 1e-6;

/// Advantages and returns for one role's batch
#[derive(Debug, Clone, PartialEq)]
pub struct AdvantageBatch {
    /// Normalized advantages used by the objective
    pub advantages: Vec<f32>,
    /// Value targets, `A[t] + value[t]` on raw advantages
    pub returns: Vec<f32>,
    /// Mean of the raw advantages
    pub raw_mean: f32,
    /// Population standard deviation of the raw advantages
    pub raw_std: f32,
}

/// Backward GAE recursion over one chronological trace.
///
/// Returns `(advantages, returns)`, both unnormalized.
pub fn compute_gae(
    rewards: &[f32],
    values: &[f32],
    next_values: &[f32],
    dones: &[bool],
    gamma: f32,
    lambda: f32,
) -> (Vec<f32>, Vec<f32>) {
    let n = rewards.len();
    let mut advantages = vec![0.0f32; n];
    let mut gae = 0.0f32;

    for t in (0..n).rev() {
        let mask = if dones[t] { 0.0 } else { 1.0 };
        let delta = rewards[t] + gamma * next_values[t] * mask - values[t];
        gae = delta + gamma * lambda * mask * gae;
        advantages[t] = gae;
    }

    let returns = advantages
        .iter()
        .zip(values)
        .map(|(a, v)| a + v)
        .collect();

    (advantages, returns)
}

/// Mean and population standard deviation
pub fn mean_std(values: &[f32]) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    (mean, var.sqrt())
}

/// Normalize to zero mean and unit variance unless the spread is degenerate
pub fn normalize_advantages(advantages: &[f32]) -> (Vec<f32>, f32, f32) {
    let (mean, std) = mean_std(advantages);
    let normalized = if std < ADV_STD_EPS || !std.is_finite() {
        advantages.to_vec()
    } else {
        advantages.iter().map(|a| (a - mean) / (std + 1e-8)).collect()
    };
    (normalized, mean, std)
}

/// Full advantage pipeline for a batch
pub fn advantage_batch(
    rewards: &[f32],
    values: &[f32],
    next_values: &[f32],
    dones: &[bool],
    gamma: f32,
    lambda: f32,
) -> AdvantageBatch {
    let (raw, returns) = compute_gae(rewards, values, next_values, dones, gamma, lambda);
    let (advantages, raw_mean, raw_std) = normalize_advantages(&raw);
    AdvantageBatch {
        advantages,
        returns,
        raw_mean,
        raw_std,
    }
}
