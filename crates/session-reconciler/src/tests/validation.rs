//! Every session-bearing event is re-validated before it can authenticate.

use super::harness::{
    session, settle, signed_in_as, signed_out, wait_for_identity, wait_for_validations,
    TestHarness, Verdict,
};
use crate::EventOrdering;
use std::time::Duration;

const ORDERINGS: [EventOrdering; 2] = [EventOrdering::LastCompletedWins, EventOrdering::Sequential];

#[tokio::test(start_paused = true)]
async fn failing_initial_validation_signs_out_once() {
    for ordering in ORDERINGS {
        let harness = TestHarness::with_session(Some(session("stale", "u1")));
        harness
            .mirror
            .persist(&session("stale", "u1").to_raw().unwrap())
            .unwrap();
        harness.provider.push_verdict(Duration::ZERO, Verdict::Fail);

        let handle = harness.spawn(ordering);
        let identity = handle.wait_until_initialized().await.unwrap();
        settle().await;

        assert!(signed_out(&identity), "{:?}", ordering);
        assert!(signed_out(&handle.snapshot()));
        assert_eq!(harness.provider.sign_outs(), 1, "{:?}", ordering);
        assert!(harness.stored_session().is_none());
    }
}

#[tokio::test(start_paused = true)]
async fn initial_session_without_user_is_rejected() {
    let harness = TestHarness::with_session(Some(session("t1", "u1")));
    harness.provider.push_verdict(Duration::ZERO, Verdict::NoUser);

    let handle = harness.spawn(EventOrdering::default());
    let identity = handle.wait_until_initialized().await.unwrap();
    settle().await;

    assert!(signed_out(&identity));
    assert_eq!(harness.provider.sign_outs(), 1);
    assert!(harness.stored_session().is_none());
}

#[tokio::test(start_paused = true)]
async fn token_refresh_keeps_user_and_mirrors_new_session() {
    for ordering in ORDERINGS {
        let harness = TestHarness::new();
        let handle = harness.spawn(ordering);
        handle.wait_until_initialized().await.unwrap();

        harness.provider.sign_in(session("t1", "u1"));
        wait_for_identity(&handle, |i| signed_in_as(i, "u1")).await;
        assert_eq!(harness.stored_session().unwrap().access_token, "t1");

        harness.provider.refresh(session("t2", "u1"));
        wait_for_validations(&harness.provider, 2).await;
        settle().await;

        assert!(signed_in_as(&handle.snapshot(), "u1"), "{:?}", ordering);
        assert_eq!(harness.stored_session().unwrap().access_token, "t2");
        assert_eq!(harness.provider.sign_outs(), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn sign_in_validation_error_clears_storage_and_signs_out_once() {
    for ordering in ORDERINGS {
        let harness = TestHarness::new();
        let handle = harness.spawn(ordering);
        handle.wait_until_initialized().await.unwrap();

        harness.provider.push_verdict(Duration::ZERO, Verdict::Fail);
        harness.provider.sign_in(session("t1", "u1"));
        wait_for_validations(&harness.provider, 1).await;
        settle().await;

        assert!(signed_out(&handle.snapshot()), "{:?}", ordering);
        assert!(harness.stored_session().is_none());
        assert_eq!(harness.provider.sign_outs(), 1, "{:?}", ordering);
    }
}

#[tokio::test(start_paused = true)]
async fn failed_token_refresh_demotes() {
    let harness = TestHarness::with_session(Some(session("t1", "u1")));
    let handle = harness.spawn(EventOrdering::default());
    wait_for_identity(&handle, |i| signed_in_as(i, "u1")).await;

    harness.provider.push_verdict(Duration::ZERO, Verdict::Fail);
    harness.provider.refresh(session("t2", "u1"));
    let identity = wait_for_identity(&handle, signed_out).await;
    settle().await;

    assert!(identity.user_id.is_none());
    assert!(harness.stored_session().is_none());
    assert_eq!(harness.provider.sign_outs(), 1);
}

#[tokio::test(start_paused = true)]
async fn user_id_comes_from_validation_not_the_session_claim() {
    let harness = TestHarness::new();
    let handle = harness.spawn(EventOrdering::default());
    handle.wait_until_initialized().await.unwrap();

    harness
        .provider
        .push_verdict(Duration::ZERO, Verdict::User("u-verified".to_string()));
    harness.provider.sign_in(session("t1", "u-claimed"));

    let identity = wait_for_identity(&handle, |i| i.authenticated).await;
    assert_eq!(identity.user_id.as_deref(), Some("u-verified"));
}

#[tokio::test(start_paused = true)]
async fn authenticated_tracks_latest_completed_validation() {
    let harness = TestHarness::new();
    let handle = harness.spawn(EventOrdering::Sequential);
    handle.wait_until_initialized().await.unwrap();

    let script = [
        (Verdict::User("u1".to_string()), true),
        (Verdict::NoUser, false),
        (Verdict::User("u2".to_string()), true),
        (Verdict::Fail, false),
    ];

    for (round, (verdict, authenticated)) in script.into_iter().enumerate() {
        harness.provider.push_verdict(Duration::ZERO, verdict);
        harness
            .provider
            .sign_in(session(&format!("t{}", round), "claimed"));
        wait_for_validations(&harness.provider, round + 1).await;
        settle().await;

        assert_eq!(handle.snapshot().authenticated, authenticated, "round {}", round);
        assert!(handle.snapshot().initialized);
    }
}
