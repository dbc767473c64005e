//! Stage graph fixtures.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::pipeline::StageDefinition;

/// The prompt every fixture stage sends: `prompt:<id>`.
#[must_use]
pub fn fixture_prompt(stage_id: &str) -> String {
    format!("prompt:{stage_id}")
}

/// A stage whose prompt is [`fixture_prompt`] and that reads nothing.
#[must_use]
pub fn fixture_stage(id: &str) -> StageDefinition {
    let prompt = fixture_prompt(id);
    StageDefinition::new(id, move |_| prompt.clone())
}

/// Generates a random acyclic pipeline of `stages` stages named `s0..sN`.
///
/// Stage `i` may only depend on stages `j < i`, each edge present with
/// probability `edge_probability`. The definitions are returned shuffled so
/// definition order differs from dependency order.
pub fn random_dag<R: Rng + ?Sized>(
    rng: &mut R,
    stages: usize,
    edge_probability: f64,
) -> Vec<StageDefinition> {
    let mut defs: Vec<StageDefinition> = (0..stages)
        .map(|i| {
            let id = format!("s{i}");
            let deps: Vec<String> = (0..i)
                .filter(|_| rng.gen_bool(edge_probability))
                .map(|j| format!("s{j}"))
                .collect();
            fixture_stage(&id).with_dependencies(deps)
        })
        .collect();
    defs.shuffle(rng);
    defs
}
