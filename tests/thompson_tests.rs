// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Thompson-selection-with-confidence-fallback scenario: a strongly-favored
//! candidate should be selected whether it wins the
//! Thompson draw outright or the draw falls below the confidence
//! threshold and the scheduler falls back to the configured default
//! agent — and a successful dispatch should fold back into its belief.

use dashkernel::belief::{select_agent, AgentCandidate, BeliefStore};
use dashkernel::task::TaskFeatures;

const REQUIRES_FACTUAL: u64 = 0b01;

fn task() -> TaskFeatures {
    TaskFeatures {
        category: "Factual".to_string(),
        complexity: None,
        required_capabilities: REQUIRES_FACTUAL,
    }
}

#[test]
fn fallback_always_resolves_to_the_strong_default_candidate() {
    let store = BeliefStore::new();

    // gpt-4: 13 successes + 1 failure on top of the Beta(2,2) prior -> Beta(15,3).
    for _ in 0..13 {
        store.update("gpt-4", "Factual", true);
    }
    store.update("gpt-4", "Factual", false);

    // local: 6 failures on top of the prior -> Beta(2,8).
    for _ in 0..6 {
        store.update("local", "Factual", false);
    }

    let gpt4_belief = store.get("gpt-4", "Factual");
    assert_eq!(gpt4_belief.alpha, 15.0);
    assert_eq!(gpt4_belief.beta, 3.0);
    let local_belief = store.get("local", "Factual");
    assert_eq!(local_belief.alpha, 2.0);
    assert_eq!(local_belief.beta, 8.0);

    // `local` lacks the capability the task requires, so its score is
    // pinned to 0 regardless of its Thompson draw: gpt-4 always wins the
    // argmax, and the confidence threshold only decides whether it wins
    // outright or arrives via the default-agent fallback.
    let candidates = vec![
        AgentCandidate { agent_id: "gpt-4".to_string(), capabilities: REQUIRES_FACTUAL },
        AgentCandidate { agent_id: "local".to_string(), capabilities: 0 },
    ];

    let task = task();
    let mut rng = rand::thread_rng();
    for _ in 0..25 {
        let selection = select_agent(
            &store,
            &candidates,
            &task,
            1.0,
            Some(0.6),
            Some("gpt-4"),
            &mut rng,
        )
        .unwrap();
        assert_eq!(selection.agent_id, "gpt-4");
    }

    let updated = store.update("gpt-4", "Factual", true);
    assert_eq!(updated.alpha, 16.0);
    assert_eq!(updated.beta, 3.0);
}

#[test]
fn no_fallback_configured_still_prefers_the_capable_candidate() {
    let store = BeliefStore::new();
    for _ in 0..13 {
        store.update("gpt-4", "Factual", true);
    }
    store.update("gpt-4", "Factual", false);
    for _ in 0..6 {
        store.update("local", "Factual", false);
    }

    let candidates = vec![
        AgentCandidate { agent_id: "gpt-4".to_string(), capabilities: REQUIRES_FACTUAL },
        AgentCandidate { agent_id: "local".to_string(), capabilities: 0 },
    ];

    let task = task();
    let mut rng = rand::thread_rng();
    for _ in 0..25 {
        let selection =
            select_agent(&store, &candidates, &task, 1.0, None, None, &mut rng).unwrap();
        assert_eq!(selection.agent_id, "gpt-4");
        assert!(!selection.fell_back);
    }
}
