//! Ordering requested stages against the static dependency table.

use std::collections::VecDeque;

use crate::stage::Stage;

/// Return the requested stages in dependency order, duplicates removed.
///
/// Kahn's algorithm over the edges of [`Stage::prerequisite`] that connect
/// two requested stages. Stages that become ready together keep the order
/// in which they were requested. The table is acyclic so every requested
/// stage is returned.
pub fn execution_order(requested: &[Stage]) -> Vec<Stage> {
    let mut stages: Vec<Stage> = Vec::with_capacity(requested.len());
    for stage in requested {
        if !stages.contains(stage) {
            stages.push(*stage);
        }
    }

    let in_set = |s: &Stage| stages.contains(s);
    let mut in_degree: Vec<usize> = stages
        .iter()
        .map(|s| usize::from(s.prerequisite().is_some_and(|p| in_set(&p))))
        .collect();

    let mut queue: VecDeque<usize> = (0..stages.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut sorted = Vec::with_capacity(stages.len());

    while let Some(i) = queue.pop_front() {
        let done = stages[i];
        sorted.push(done);
        for (j, stage) in stages.iter().enumerate() {
            if in_degree[j] > 0 && stage.prerequisite() == Some(done) {
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    queue.push_back(j);
                }
            }
        }
    }

    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependents_follow_prerequisites() {
        assert_eq!(
            execution_order(&[Stage::Simulate, Stage::Compile]),
            vec![Stage::Compile, Stage::Simulate]
        );
        assert_eq!(
            execution_order(&[Stage::Schematic, Stage::Synthesize]),
            vec![Stage::Synthesize, Stage::Schematic]
        );
    }

    #[test]
    fn test_transitive_chain() {
        assert_eq!(
            execution_order(&[Stage::Waveform, Stage::Simulate, Stage::Compile]),
            vec![Stage::Compile, Stage::Simulate, Stage::Waveform]
        );
    }

    #[test]
    fn test_independent_stages_keep_request_order() {
        assert_eq!(
            execution_order(&[Stage::Lint, Stage::Synthesize, Stage::Compile]),
            vec![Stage::Lint, Stage::Synthesize, Stage::Compile]
        );
    }

    #[test]
    fn test_duplicates_removed() {
        assert_eq!(
            execution_order(&[Stage::Compile, Stage::Lint, Stage::Compile]),
            vec![Stage::Compile, Stage::Lint]
        );
    }

    #[test]
    fn test_unrequested_prerequisite_does_not_block() {
        assert_eq!(execution_order(&[Stage::Simulate]), vec![Stage::Simulate]);
        assert!(execution_order(&[]).is_empty());
    }

    #[test]
    fn test_every_permutation_respects_table() {
        let all = Stage::ALL;
        for rotate in 0..all.len() {
            let mut requested = all.to_vec();
            requested.rotate_left(rotate);
            let order = execution_order(&requested);
            assert_eq!(order.len(), all.len());
            for (pos, stage) in order.iter().enumerate() {
                if let Some(pre) = stage.prerequisite() {
                    let pre_pos = order.iter().position(|s| *s == pre).unwrap();
                    assert!(pre_pos < pos, "{pre} must precede {stage}");
                }
            }
        }
    }
}
