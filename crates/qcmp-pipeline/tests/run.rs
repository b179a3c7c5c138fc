mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use common::{data_url, detail_url, endpoints, fixture, quarters_payload, search_url, CannedFetcher};
use qcmp_core::stats::summarize;
use qcmp_core::EntityReference;
use qcmp_pipeline::{run, FundamentalsResolver};

const N: usize = 6;

fn entity(i: usize) -> EntityReference {
    EntityReference::new(format!("CO{i}"), format!("Company {i} Ltd"), None)
}

/// Entities below `failing` break at a rotating stage; the rest resolve.
fn fetcher_with_failures(failing: usize) -> CannedFetcher {
    let mut fetcher = CannedFetcher::new();
    for i in 0..N {
        let id = format!("CO{i}");
        let k = 100 + i as i64;
        let payload = quarters_payload(&[
            ("Q1", 110.0 + i as f64, 11.0),
            ("Q2", 100.0, 10.0),
            ("Q3", 90.0, 9.0),
            ("Q4", 80.0, 8.0),
        ]);
        fetcher = if i >= failing {
            fetcher.entity(&id, k, payload)
        } else {
            match i % 4 {
                0 => fetcher.body(search_url(&id), "[]"),
                1 => fetcher.entity(&id, k, payload).status(detail_url(&id, k), 500),
                2 => fetcher.entity(&id, k, payload).body(data_url(k), ""),
                _ => fetcher
                    .entity(&id, k, payload)
                    .body(detail_url(&id, k), "<html>no data here</html>"),
            }
        };
    }
    fetcher
}

#[tokio::test]
async fn returns_exactly_the_successful_entities_for_any_failure_count_and_limit() {
    for failing in 0..=N {
        for limit in [1, N, N * 2] {
            let resolver = Arc::new(FundamentalsResolver::new(fetcher_with_failures(failing), endpoints()).unwrap());
            let entities = (0..N).map(entity).collect::<Vec<_>>();

            let results = run(resolver, entities, limit).await;

            assert_eq!(results.len(), N - failing, "failing={failing} limit={limit}");
            let ids = results.iter().map(|r| r.display_id.clone()).collect::<BTreeSet<_>>();
            let expected = (failing..N).map(|i| format!("CO{i}")).collect::<BTreeSet<_>>();
            assert_eq!(ids, expected, "failing={failing} limit={limit}");
        }
    }
}

#[tokio::test]
async fn zero_candidate_entity_does_not_affect_others() {
    let fetcher = CannedFetcher::new()
        .entity("ACME", 1234, fixture("data/acme_partial.json"))
        .body(search_url("GHOST"), "[]");
    let resolver = Arc::new(FundamentalsResolver::new(fetcher, endpoints()).unwrap());
    let entities = vec![
        EntityReference::new("GHOST", "Ghost Holdings", None),
        EntityReference::new("ACME", "Acme Industries Ltd", None),
    ];

    let results = run(resolver, entities, 2).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].display_id, "ACME");
    assert_eq!(results[0].periods, ["Q1", "Q2", "", ""].map(String::from));
}

#[tokio::test]
async fn all_failing_batch_is_an_empty_result() {
    let resolver = Arc::new(FundamentalsResolver::new(CannedFetcher::new(), endpoints()).unwrap());
    let entities = (0..3).map(entity).collect::<Vec<_>>();

    let results = run(resolver, entities, 2).await;
    assert!(results.is_empty());

    let summary = summarize(&results);
    assert_eq!(summary.total_companies, 0);
    assert!(summary.avg_latest_rev_pct.is_none());
}

#[tokio::test]
async fn summary_ranks_resolved_batch() {
    let resolver = Arc::new(FundamentalsResolver::new(fetcher_with_failures(0), endpoints()).unwrap());
    let results = run(resolver, (0..N).map(entity).collect(), 3).await;

    let summary = summarize(&results);
    assert_eq!(summary.total_companies, N);
    assert_eq!(summary.not_declared_revenue_slots, 0);
    let top = summary.top_revenue_mover.expect("finite changes");
    assert_eq!(top.display_id, format!("CO{}", N - 1));
    let worst = summary.worst_revenue_mover.expect("finite changes");
    assert_eq!(worst.display_id, "CO0");
}
