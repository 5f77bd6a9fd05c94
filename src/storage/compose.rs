//! Multi-stage compose under a fixed per-call fan-in.

use super::{ObjectStore, StorageResult};
use futures::future::try_join_all;

/// Compose any number of sources into `dest`
///
/// - no sources: `dest` is written as an empty object
/// - up to `fan_in` sources: a single compose call
/// - otherwise: sources are composed in `fan_in`-sized groups into
///   temporaries under `tmp_prefix`, stage by stage, until at most `fan_in`
///   remain; those are composed into `dest`
///
/// `fan_in` is clamped to the store's own limit and to a minimum of 2.
/// Groups of one stage are composed concurrently; source order is preserved
/// at every stage.
pub async fn compose_many(
    store: &dyn ObjectStore,
    sources: &[String],
    dest: &str,
    tmp_prefix: &str,
    fan_in: usize,
) -> StorageResult<()> {
    let fan_in = fan_in.min(store.max_compose_sources()).max(2);

    if sources.is_empty() {
        return store.put(dest, Vec::new()).await;
    }

    let mut current: Vec<String> = sources.to_vec();
    let mut stage = 0usize;

    while current.len() > fan_in {
        let outputs: Vec<String> = (0..current.len().div_ceil(fan_in))
            .map(|index| format!("{}/compose-s{}-{}.csv", tmp_prefix, stage, index))
            .collect();

        // Groups within a stage are independent
        try_join_all(
            current
                .chunks(fan_in)
                .zip(&outputs)
                .map(|(group, tmp)| store.compose(group, tmp)),
        )
        .await?;

        tracing::debug!(
            stage,
            inputs = current.len(),
            outputs = outputs.len(),
            "Composed intermediate stage"
        );

        current = outputs;
        stage += 1;
    }

    store.compose(&current, dest).await
}
