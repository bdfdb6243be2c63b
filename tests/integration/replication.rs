//! Integration tests: replication factor and provider filters.

use floe_api::PushOptions;
use floe_integration_tests::{require_config, require_success, Harness};

#[tokio::test]
async fn test_rep_factor_one_and_two() {
    for rep_factor in [1usize, 2] {
        let h = Harness::new(2).await;
        let (cid, _) = h.add_random_file(40 + rep_factor as u32);

        let config = h
            .api
            .get_default_cid_config(cid)
            .await
            .with_rep_factor(rep_factor);
        let jid = h
            .api
            .push(&cid, PushOptions::new().with_config(config.clone()))
            .await
            .unwrap();
        require_success(&h.api, &jid).await;
        require_config(&h.api, &cid, Some(&config)).await;

        let info = h.api.show(&cid).unwrap();
        assert_eq!(info.cold.filecoin.proposals.len(), rep_factor);

        h.sched.close().await;
    }
}

/// Raising the replication factor keeps the original deal and adds one
/// on a distinct miner.
#[tokio::test]
async fn test_rep_factor_increase() {
    let h = Harness::new(2).await;
    let (cid, _) = h.add_random_file(42);

    let jid = h.api.push_default(&cid).await.unwrap();
    require_success(&h.api, &jid).await;

    let info = h.api.show(&cid).unwrap();
    assert_eq!(info.cold.filecoin.proposals.len(), 1);
    let first = info.cold.filecoin.proposals[0].clone();

    let config = h.api.get_default_cid_config(cid).await.with_rep_factor(2);
    let jid = h
        .api
        .push(
            &cid,
            PushOptions::new().with_config(config.clone()).with_override(true),
        )
        .await
        .unwrap();
    require_success(&h.api, &jid).await;
    require_config(&h.api, &cid, Some(&config)).await;

    let info = h.api.show(&cid).unwrap();
    assert_eq!(info.cold.filecoin.proposals.len(), 2);
    assert!(info.cold.filecoin.proposals.contains(&first));
    assert_ne!(
        info.cold.filecoin.proposals[0].miner,
        info.cold.filecoin.proposals[1].miner
    );

    h.sched.close().await;
}

/// Lowering the replication factor never removes recorded deals.
#[tokio::test]
async fn test_rep_factor_decrease_preserves_history() {
    let h = Harness::new(2).await;
    let (cid, _) = h.add_random_file(43);

    let config = h.api.get_default_cid_config(cid).await.with_rep_factor(2);
    let jid = h
        .api
        .push(&cid, PushOptions::new().with_config(config))
        .await
        .unwrap();
    require_success(&h.api, &jid).await;
    assert_eq!(h.api.show(&cid).unwrap().cold.filecoin.proposals.len(), 2);

    let config = h.api.get_default_cid_config(cid).await.with_rep_factor(1);
    let jid = h
        .api
        .push(
            &cid,
            PushOptions::new().with_config(config.clone()).with_override(true),
        )
        .await
        .unwrap();
    require_success(&h.api, &jid).await;
    require_config(&h.api, &cid, Some(&config)).await;

    assert_eq!(h.api.show(&cid).unwrap().cold.filecoin.proposals.len(), 2);

    h.sched.close().await;
}

#[tokio::test]
async fn test_excluded_miners() {
    let h = Harness::new(2).await;
    let (cid, _) = h.add_random_file(44);

    let excluded = "t01000".to_string();
    let config = h
        .api
        .get_default_cid_config(cid)
        .await
        .with_excluded_miners(vec![excluded.clone()]);
    let jid = h
        .api
        .push(&cid, PushOptions::new().with_config(config.clone()))
        .await
        .unwrap();
    require_success(&h.api, &jid).await;
    require_config(&h.api, &cid, Some(&config)).await;

    let info = h.api.show(&cid).unwrap();
    assert_ne!(info.cold.filecoin.proposals[0].miner, excluded);

    h.sched.close().await;
}

/// The country filter restricts selection: with miners in CN and UY,
/// filtering on UY lands the deal on the second miner.
#[tokio::test]
async fn test_country_filter() {
    let h = Harness::new(2).await;
    let (cid, _) = h.add_random_file(45);

    let config = h
        .api
        .get_default_cid_config(cid)
        .await
        .with_country_codes(vec!["UY".to_string()]);
    let jid = h
        .api
        .push(&cid, PushOptions::new().with_config(config.clone()))
        .await
        .unwrap();
    require_success(&h.api, &jid).await;
    require_config(&h.api, &cid, Some(&config)).await;

    let info = h.api.show(&cid).unwrap();
    assert_eq!(info.cold.filecoin.proposals[0].miner, "t01001");

    h.sched.close().await;
}

/// A push whose filter no miner satisfies fails and reports the
/// selector error as the job's cause.
#[tokio::test]
async fn test_unsatisfiable_filter_fails_job() {
    let h = Harness::new(1).await;
    let (cid, _) = h.add_random_file(46);

    let config = h
        .api
        .get_default_cid_config(cid)
        .await
        .with_country_codes(vec!["ZZ".to_string()]);
    let jid = h
        .api
        .push(&cid, PushOptions::new().with_config(config))
        .await
        .unwrap();
    let job = floe_integration_tests::require_failed(&h.api, &jid).await;
    assert!(job.err_cause.unwrap().contains("no miners available"));

    h.sched.close().await;
}
