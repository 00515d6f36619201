//! Seeded train/validation split.

use rand::Rng;
use rand::seq::SliceRandom;

/// Shuffle `samples` with `rng` and hold out `validation_fraction` of them.
///
/// Returns `(train, validation)`. The validation size is rounded to the
/// nearest whole sample, so tiny corpora may get an empty validation set.
pub fn split_train_val<T, R: Rng + ?Sized>(
    mut samples: Vec<T>,
    validation_fraction: f64,
    rng: &mut R,
) -> (Vec<T>, Vec<T>) {
    samples.shuffle(rng);

    let total = samples.len();
    let validation = ((total as f64) * validation_fraction).round() as usize;
    let split_at = total - validation.min(total);
    let held_out = samples.split_off(split_at);

    tracing::debug!(
        train = samples.len(),
        validation = held_out.len(),
        "Dataset split"
    );
    (samples, held_out)
}
