//! Integration tests: tier enablement, unpinning, unfreeze, timeouts.

use floe_api::{ApiError, PushOptions};
use floe_integration_tests::{
    cid_for, require_config, require_fil_stored, require_failed, require_success, Harness,
};

/// All four hot/cold enablement combinations reconcile successfully and
/// leave the expected observable state in both networks.
#[tokio::test]
async fn test_enablement_matrix() {
    let cases = [(true, true), (false, true), (true, false), (false, false)];
    for (seed, (hot_enabled, cold_enabled)) in cases.into_iter().enumerate() {
        let h = Harness::new(1).await;
        let (cid, _) = h.add_random_file(50 + seed as u32);

        let config = h
            .api
            .get_default_cid_config(cid)
            .await
            .with_hot_enabled(hot_enabled)
            .with_cold_enabled(cold_enabled);
        let jid = h
            .api
            .push(&cid, PushOptions::new().with_config(config.clone()))
            .await
            .unwrap();
        require_success(&h.api, &jid).await;
        require_config(&h.api, &cid, Some(&config)).await;

        let info = h.api.show(&cid).unwrap();
        assert_eq!(info.hot.enabled, hot_enabled);
        if cold_enabled {
            assert!(!info.cold.filecoin.proposals.is_empty());
        } else {
            assert!(info.cold.filecoin.proposals.is_empty());
        }

        let get = h.api.get(&cid).await;
        if hot_enabled {
            assert!(get.is_ok());
            assert!(h.ipfs.is_pinned(&cid));
        } else {
            assert!(matches!(get, Err(ApiError::HotStorageDisabled)));
            assert!(!h.ipfs.is_pinned(&cid));
        }
        require_fil_stored(&h.devnet, &cid, cold_enabled).await;

        h.sched.close().await;
    }
}

#[tokio::test]
async fn test_hot_enabled_then_disabled_unpins() {
    let h = Harness::new(1).await;
    let (cid, _) = h.add_random_file(54);

    let jid = h.api.push_default(&cid).await.unwrap();
    require_success(&h.api, &jid).await;
    assert!(h.ipfs.is_pinned(&cid));

    let config = h
        .api
        .get_default_cid_config(cid)
        .await
        .with_hot_enabled(false);
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
    assert!(!h.ipfs.is_pinned(&cid));

    h.sched.close().await;
}

#[tokio::test]
async fn test_hot_disabled_then_enabled_pins() {
    let h = Harness::new(1).await;
    let (cid, _) = h.add_random_file(55);

    let config = h
        .api
        .get_default_cid_config(cid)
        .await
        .with_hot_enabled(false);
    let jid = h
        .api
        .push(&cid, PushOptions::new().with_config(config))
        .await
        .unwrap();
    require_success(&h.api, &jid).await;
    assert!(!h.ipfs.is_pinned(&cid));

    let config = h.api.get_default_cid_config(cid).await;
    let jid = h
        .api
        .push(
            &cid,
            PushOptions::new().with_config(config).with_override(true),
        )
        .await
        .unwrap();
    require_success(&h.api, &jid).await;
    assert!(h.ipfs.is_pinned(&cid));

    h.sched.close().await;
}

#[tokio::test]
async fn test_cold_disabled_then_enabled_stores() {
    let h = Harness::new(1).await;
    let (cid, _) = h.add_random_file(56);

    let config = h
        .api
        .get_default_cid_config(cid)
        .await
        .with_cold_enabled(false);
    let jid = h
        .api
        .push(&cid, PushOptions::new().with_config(config))
        .await
        .unwrap();
    require_success(&h.api, &jid).await;
    require_fil_stored(&h.devnet, &cid, false).await;

    let config = h.api.get_default_cid_config(cid).await;
    let jid = h
        .api
        .push(
            &cid,
            PushOptions::new().with_config(config).with_override(true),
        )
        .await
        .unwrap();
    require_success(&h.api, &jid).await;
    require_fil_stored(&h.devnet, &cid, true).await;

    h.sched.close().await;
}

/// Disabling the cold tier never undoes deals: the data stays
/// retrievable from the cold network while the config records the
/// intent that it no longer be cold-stored.
#[tokio::test]
async fn test_cold_enabled_then_disabled_keeps_deals() {
    let h = Harness::new(1).await;
    let (cid, _) = h.add_random_file(57);

    let jid = h.api.push_default(&cid).await.unwrap();
    require_success(&h.api, &jid).await;
    require_fil_stored(&h.devnet, &cid, true).await;

    let config = h
        .api
        .get_default_cid_config(cid)
        .await
        .with_cold_enabled(false);
    let jid = h
        .api
        .push(
            &cid,
            PushOptions::new().with_config(config.clone()).with_override(true),
        )
        .await
        .unwrap();
    require_success(&h.api, &jid).await;

    require_fil_stored(&h.devnet, &cid, true).await;
    require_config(&h.api, &cid, Some(&config)).await;
    let info = h.api.show(&cid).unwrap();
    assert!(!info.cold.filecoin.proposals.is_empty());

    h.sched.close().await;
}

/// Unfreeze: the object is gone from the hot network but covered by a
/// deal; re-enabling the hot tier restores it from cold storage.
#[tokio::test]
async fn test_unfreeze_restores_from_cold() {
    let h = Harness::new(1).await;
    let (cid, data) = h.add_random_file(58);

    let config = h
        .api
        .get_default_cid_config(cid)
        .await
        .with_hot_enabled(false)
        .with_allow_unfreeze(true);
    let jid = h
        .api
        .push(&cid, PushOptions::new().with_config(config.clone()))
        .await
        .unwrap();
    require_success(&h.api, &jid).await;

    assert!(matches!(
        h.api.get(&cid).await,
        Err(ApiError::HotStorageDisabled)
    ));

    h.ipfs.drop_object(&cid);

    let config = config.with_hot_enabled(true).with_add_timeout(1);
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

    let fetched = h.api.get(&cid).await.unwrap();
    assert_eq!(&fetched[..], &data[..]);

    h.sched.close().await;
}

/// A pin of an unavailable object fails once the configured deadline
/// passes; with the cold tier also unable to store it, the job fails.
#[tokio::test]
async fn test_hot_import_timeout_fails_job() {
    let h = Harness::new(1).await;
    let missing = cid_for(b"not on any peer");

    let config = h
        .api
        .get_default_cid_config(missing)
        .await
        .with_add_timeout(1);
    let jid = h
        .api
        .push(&missing, PushOptions::new().with_config(config))
        .await
        .unwrap();
    let job = require_failed(&h.api, &jid).await;
    assert!(job.err_cause.unwrap().contains("timed out"));

    h.sched.close().await;
}
