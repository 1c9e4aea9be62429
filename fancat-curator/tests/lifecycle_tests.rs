//! Integration tests for link verification, attachment, and closure

mod helpers;

use fancat_common::{InactiveReason, LinkState};
use fancat_curator::services::{AttachOutcome, Enricher, VerificationOutcome, VerifyOutcome};
use fancat_curator::services::mismatch_detector::{audit_owner, Mismatch};
use fancat_curator::utils::{BackoffPolicy, LookupError};
use fancat_curator::workflow::BatchRunner;
use fancat_curator::CurationError;
use helpers::*;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_closed_place_deactivates_and_keeps_url() {
    let pool = setup_test_db().await;
    let owner = seed_owner(&pool, "channel-a").await;
    let entity = store_entity(&pool, owner.id, "Daruma Yakiniku", LinkState::Active).await;
    let directory = Arc::new(FakeDirectory::verifying(VerificationOutcome::Closed));
    let manager = lifecycle(&pool, directory, 3);

    let outcome = manager.verify(entity.id).await.unwrap();
    assert_eq!(outcome, VerifyOutcome::Deactivated(InactiveReason::Closed));

    let stored = load(&pool, entity.id).await.unwrap();
    assert_eq!(stored.link_state, LinkState::Inactive);
    assert_eq!(stored.external_link, entity.external_link);
    assert!(!stored.is_monetizable());

    let entry = stored.link_audit.last().unwrap();
    assert_eq!(entry.reason, Some(InactiveReason::Closed));
    assert_eq!(entry.from_state, LinkState::Active);
    assert_eq!(entry.to_state, LinkState::Inactive);
    assert_eq!(entry.source, "directory");
    assert_eq!(stored.link_audit.len(), entity.link_audit.len() + 1);
}

#[tokio::test]
async fn test_verified_candidate_becomes_active() {
    let pool = setup_test_db().await;
    let owner = seed_owner(&pool, "channel-a").await;
    let entity = store_entity(&pool, owner.id, "Ichiban Sushi", LinkState::Candidate).await;
    let directory = Arc::new(FakeDirectory::verifying(VerificationOutcome::Verified));
    let manager = lifecycle(&pool, directory, 3);

    assert_eq!(manager.verify(entity.id).await.unwrap(), VerifyOutcome::Activated);

    let stored = load(&pool, entity.id).await.unwrap();
    assert_eq!(stored.link_state, LinkState::Active);
    assert!(stored.is_monetizable());
    let entry = stored.link_audit.last().unwrap();
    assert_eq!(entry.to_state, LinkState::Active);
    assert_eq!(entry.new_url, entity.external_link);
}

#[tokio::test]
async fn test_still_active_writes_nothing() {
    let pool = setup_test_db().await;
    let owner = seed_owner(&pool, "channel-a").await;
    let entity = store_entity(&pool, owner.id, "Ichiban Sushi", LinkState::Active).await;
    let directory = Arc::new(FakeDirectory::verifying(VerificationOutcome::Verified));
    let manager = lifecycle(&pool, directory, 3);

    assert_eq!(manager.verify(entity.id).await.unwrap(), VerifyOutcome::StillActive);
    let stored = load(&pool, entity.id).await.unwrap();
    assert_eq!(stored.link_audit.len(), entity.link_audit.len());
}

#[tokio::test]
async fn test_unavailable_directory_leaves_state_unchanged() {
    let pool = setup_test_db().await;
    let owner = seed_owner(&pool, "channel-a").await;
    let entity = store_entity(&pool, owner.id, "Ichiban Sushi", LinkState::Active).await;
    let directory = Arc::new(FakeDirectory::failing(LookupError::Transient("timeout".to_string())));
    let manager = lifecycle(&pool, Arc::clone(&directory), 3);

    let outcome = manager.verify(entity.id).await.unwrap();
    assert!(matches!(outcome, VerifyOutcome::Unverifiable(_)));
    assert_eq!(directory.verify_count(), 3);

    let stored = load(&pool, entity.id).await.unwrap();
    assert_eq!(stored.link_state, LinkState::Active);
    assert_eq!(stored.link_audit.len(), entity.link_audit.len());
}

#[tokio::test]
async fn test_permanent_lookup_error_is_not_retried() {
    let pool = setup_test_db().await;
    let owner = seed_owner(&pool, "channel-a").await;
    let entity = store_entity(&pool, owner.id, "Ichiban Sushi", LinkState::Candidate).await;
    let forbidden = LookupError::Permanent("forbidden".to_string());
    let directory = Arc::new(FakeDirectory::failing(forbidden));
    let manager = lifecycle(&pool, Arc::clone(&directory), 3);

    let outcome = manager.verify(entity.id).await.unwrap();
    assert!(matches!(outcome, VerifyOutcome::Unverifiable(_)));
    assert_eq!(directory.verify_count(), 1);
}

#[tokio::test]
async fn test_transient_failure_then_success_activates() {
    let pool = setup_test_db().await;
    let owner = seed_owner(&pool, "channel-a").await;
    let entity = store_entity(&pool, owner.id, "Ichiban Sushi", LinkState::Candidate).await;
    let directory = Arc::new(FakeDirectory::scripted(vec![
        Err(LookupError::Transient("HTTP 503".to_string())),
        Ok(VerificationOutcome::Verified),
    ]));
    let manager = lifecycle(&pool, Arc::clone(&directory), 3);

    assert_eq!(manager.verify(entity.id).await.unwrap(), VerifyOutcome::Activated);
    assert_eq!(directory.verify_count(), 2);
}

#[tokio::test]
async fn test_corrected_link_failing_verification_stays_for_review() {
    let pool = setup_test_db().await;
    let owner = seed_owner(&pool, "channel-a").await;
    let entity = store_entity(&pool, owner.id, "Ichiban Sushi", LinkState::Corrected).await;
    let directory = Arc::new(FakeDirectory::verifying(VerificationOutcome::Relocated));
    let manager = lifecycle(&pool, directory, 3);

    let outcome = manager.verify(entity.id).await.unwrap();
    assert_eq!(outcome, VerifyOutcome::CorrectionUnconfirmed(InactiveReason::Relocated));

    let stored = load(&pool, entity.id).await.unwrap();
    assert_eq!(stored.link_state, LinkState::Corrected);
    assert_eq!(stored.link_audit.len(), entity.link_audit.len());
}

#[tokio::test]
async fn test_verify_without_link_is_invalid_input() {
    let pool = setup_test_db().await;
    let owner = seed_owner(&pool, "channel-a").await;
    let entity = store_entity(&pool, owner.id, "Ichiban Sushi", LinkState::Unlinked).await;
    let directory = Arc::new(FakeDirectory::verifying(VerificationOutcome::Verified));
    let manager = lifecycle(&pool, Arc::clone(&directory), 3);

    let result = manager.verify(entity.id).await;
    assert!(matches!(result, Err(CurationError::InvalidInput(_))));
    assert_eq!(directory.verify_count(), 0);
}

#[tokio::test]
async fn test_find_and_attach_sets_candidate() {
    let pool = setup_test_db().await;
    let owner = seed_owner(&pool, "channel-a").await;
    let unlinked = store_entity(&pool, owner.id, "Ichiban Sushi", LinkState::Unlinked).await;
    let linked = store_entity(&pool, owner.id, "Daruma Yakiniku", LinkState::Candidate).await;
    let directory = Arc::new(FakeDirectory::resolving("https://tabelog.com/tokyo/A1301/13009999/"));
    let manager = lifecycle(&pool, Arc::clone(&directory), 3);

    let outcome = manager.find_and_attach(unlinked.id).await.unwrap();
    assert_eq!(
        outcome,
        AttachOutcome::Attached("https://tabelog.com/tokyo/A1301/13009999/".to_string())
    );
    let stored = load(&pool, unlinked.id).await.unwrap();
    assert_eq!(stored.link_state, LinkState::Candidate);
    assert_eq!(stored.link_audit.len(), 1);
    assert_eq!(stored.link_audit[0].source, "directory");

    assert_eq!(manager.find_and_attach(linked.id).await.unwrap(), AttachOutcome::Skipped);
}

#[tokio::test]
async fn test_find_and_attach_without_result_is_not_found() {
    let pool = setup_test_db().await;
    let owner = seed_owner(&pool, "channel-a").await;
    let entity = store_entity(&pool, owner.id, "Ichiban Sushi", LinkState::Unlinked).await;
    let manager = lifecycle(&pool, Arc::new(FakeDirectory::default()), 3);

    assert_eq!(manager.find_and_attach(entity.id).await.unwrap(), AttachOutcome::NotFound);
    assert_eq!(load(&pool, entity.id).await.unwrap().link_state, LinkState::Unlinked);
}

#[tokio::test]
async fn test_close_unlinked_entity_is_invalid_transition() {
    let pool = setup_test_db().await;
    let owner = seed_owner(&pool, "channel-a").await;
    let entity = store_entity(&pool, owner.id, "Ichiban Sushi", LinkState::Unlinked).await;
    let manager = lifecycle(&pool, Arc::new(FakeDirectory::default()), 3);

    let result = manager.close(entity.id, InactiveReason::Closed, "").await;
    assert!(matches!(
        result,
        Err(CurationError::InvalidTransition {
            from: LinkState::Unlinked,
            to: LinkState::Inactive
        })
    ));
    assert!(load(&pool, entity.id).await.unwrap().link_audit.is_empty());
}

#[tokio::test]
async fn test_audit_trail_only_grows() {
    let pool = setup_test_db().await;
    let owner = seed_owner(&pool, "channel-a").await;
    let entity = store_entity(&pool, owner.id, "Ichiban Sushi", LinkState::Unlinked).await;
    let directory = Arc::new(FakeDirectory::verifying(VerificationOutcome::Verified));
    let manager = lifecycle(&pool, directory, 3);

    let mut history = Vec::new();
    manager
        .attach(entity.id, "https://tabelog.com/tokyo/A1301/13000003/", "curator")
        .await
        .unwrap();
    history.push(load(&pool, entity.id).await.unwrap().link_audit);
    manager.verify(entity.id).await.unwrap();
    history.push(load(&pool, entity.id).await.unwrap().link_audit);
    manager
        .close(entity.id, InactiveReason::Relocated, "moved across the street")
        .await
        .unwrap();
    history.push(load(&pool, entity.id).await.unwrap().link_audit);
    manager.verify(entity.id).await.unwrap();
    history.push(load(&pool, entity.id).await.unwrap().link_audit);

    for pair in history.windows(2) {
        assert_eq!(pair[1].len(), pair[0].len() + 1);
        assert_eq!(&pair[1][..pair[0].len()], pair[0].as_slice());
    }

    let states: Vec<LinkState> = history[3].iter().map(|e| e.to_state).collect();
    assert_eq!(
        states,
        vec![LinkState::Candidate, LinkState::Active, LinkState::Inactive, LinkState::Active]
    );
    assert_eq!(history[3][2].note, "moved across the street");
}

#[tokio::test]
async fn test_concurrent_verifications_serialize_per_entity() {
    let pool = setup_test_db().await;
    let owner = seed_owner(&pool, "channel-a").await;
    let entity = store_entity(&pool, owner.id, "Ichiban Sushi", LinkState::Candidate).await;
    let directory = Arc::new(FakeDirectory::verifying(VerificationOutcome::Verified));
    let manager = lifecycle(&pool, directory, 3);

    let (first, second) = tokio::join!(manager.verify(entity.id), manager.verify(entity.id));
    let mut outcomes = vec![first.unwrap(), second.unwrap()];
    outcomes.sort_by_key(|o| matches!(o, VerifyOutcome::StillActive));
    assert_eq!(outcomes, vec![VerifyOutcome::Activated, VerifyOutcome::StillActive]);

    let stored = load(&pool, entity.id).await.unwrap();
    assert_eq!(stored.link_audit.len(), 2);
}

#[tokio::test]
async fn test_batch_verification_counts_outcomes() {
    let pool = setup_test_db().await;
    let owner = seed_owner(&pool, "channel-a").await;
    let candidate = store_entity(&pool, owner.id, "Ichiban Sushi", LinkState::Candidate).await;
    let active = store_entity(&pool, owner.id, "Daruma Yakiniku", LinkState::Active).await;
    let unlinked = store_entity(&pool, owner.id, "Blue Bottle Coffee", LinkState::Unlinked).await;
    let directory = Arc::new(FakeDirectory::verifying(VerificationOutcome::Verified));
    let manager = lifecycle(&pool, directory, 3);

    let runner = BatchRunner::new(CancellationToken::new(), Duration::ZERO);
    let summary = runner
        .verify_links(&manager, &[candidate.id, active.id, unlinked.id], |_| {})
        .await;

    assert_eq!(summary.activated, 1);
    assert_eq!(summary.unchanged, 1);
    assert_eq!(summary.error, 1);
    assert!(!summary.cancelled);
}

#[tokio::test]
async fn test_batch_counts_unconfirmed_correction_apart_from_errors() {
    let pool = setup_test_db().await;
    let owner = seed_owner(&pool, "channel-a").await;
    let corrected = store_entity(&pool, owner.id, "Ichiban Sushi", LinkState::Corrected).await;
    let directory = Arc::new(FakeDirectory::verifying(VerificationOutcome::Closed));
    let manager = lifecycle(&pool, directory, 3);
    let runner = BatchRunner::new(CancellationToken::new(), Duration::ZERO);

    let summary = runner.verify_links(&manager, &[corrected.id], |_| {}).await;

    assert_eq!(summary.unconfirmed, 1);
    assert_eq!(summary.error, 0);
    assert_eq!(summary.processed(), 1);
}

#[tokio::test]
async fn test_cancelled_verification_run_makes_no_lookups() {
    let pool = setup_test_db().await;
    let owner = seed_owner(&pool, "channel-a").await;
    let entity = store_entity(&pool, owner.id, "Ichiban Sushi", LinkState::Candidate).await;
    let directory = Arc::new(FakeDirectory::verifying(VerificationOutcome::Verified));
    let manager = lifecycle(&pool, Arc::clone(&directory), 3);

    let token = CancellationToken::new();
    token.cancel();
    let summary = BatchRunner::new(token, Duration::ZERO)
        .verify_links(&manager, &[entity.id], |_| {})
        .await;

    assert!(summary.cancelled);
    assert_eq!(summary.processed(), 0);
    assert_eq!(directory.verify_count(), 0);
}

#[tokio::test]
async fn test_enrichment_fills_missing_metadata() {
    let pool = setup_test_db().await;
    let owner = seed_owner(&pool, "channel-a").await;
    let episode = seed_episode(&pool, owner.id, "Sushi Night", 1).await;
    let enricher = Enricher::new(
        pool.clone(),
        Arc::new(CannedMetadata),
        BackoffPolicy::immediate(2),
        Duration::ZERO,
    );

    let report = enricher.enrich_owner(owner.id).await.unwrap();
    assert!(report.owner_enriched);
    assert_eq!(report.episodes_enriched, 1);

    let mut conn = pool.acquire().await.unwrap();
    let stored = fancat_curator::db::episodes::load_episode(&mut conn, episode.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.description.as_deref(), Some("Overview of Sushi Night"));
    let owner = fancat_curator::db::owners::load_owner(&mut conn, owner.id)
        .await
        .unwrap()
        .unwrap();
    assert!(owner.external_id.is_some());
}

#[tokio::test]
async fn test_enrichment_skips_when_lookup_unavailable() {
    let pool = setup_test_db().await;
    let owner = seed_owner(&pool, "channel-a").await;
    seed_episode(&pool, owner.id, "Sushi Night", 1).await;
    let enricher = Enricher::new(
        pool.clone(),
        Arc::new(UnavailableMetadata),
        BackoffPolicy::immediate(2),
        Duration::ZERO,
    );

    let report = enricher.enrich_owner(owner.id).await.unwrap();
    assert!(!report.owner_enriched);
    assert_eq!(report.episodes_enriched, 0);
    assert_eq!(report.skipped, 2);
}

#[tokio::test]
async fn test_audit_flags_geographic_mismatch() {
    let pool = setup_test_db().await;
    let owner = seed_owner(&pool, "channel-a").await;
    let episode = seed_episode(&pool, owner.id, "Ramen crawl in Shibuya", 1).await;
    let entity = store_entity(&pool, owner.id, "Ichiban Ramen", LinkState::Unlinked).await;
    {
        let mut conn = pool.acquire().await.unwrap();
        let mut moved = entity.clone();
        moved.address = Some("2-1 Kyoto Station Road".to_string());
        fancat_curator::db::entities::update_entity(&mut conn, &moved).await.unwrap();
    }
    associate(&pool, episode.id, entity.id).await;

    let reports = audit_owner(&pool, owner.id, &fixture_config()).await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].entity_id, entity.id);
    assert!(matches!(
        &reports[0].mismatches[0],
        Mismatch::Geographic { episode_area, entity_area }
            if episode_area == "shibuya" && entity_area == "kyoto"
    ));
}
