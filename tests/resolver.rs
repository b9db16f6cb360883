mod common;

use common::{identity, FakeLedger};
use displaysync::config::DeviceHints;
use displaysync::ledger::LedgerError;
use displaysync::resolver::{DeviceResolver, ResolveError};
use displaysync::state::SyncState;

fn hints_with_location() -> DeviceHints {
    DeviceHints { location: Some("mall-east-03".into()), ..DeviceHints::default() }
}

#[tokio::test]
async fn greenfield_start_creates_registry_and_registers() {
    let me = identity(1);
    let ledger = FakeLedger::new(me);
    let hints = hints_with_location();

    let ctx = DeviceResolver::new(&ledger, me, &hints)
        .ensure_device(&SyncState::default(), true)
        .await
        .unwrap();

    assert_eq!(ledger.registry_creations(), 1);
    assert_eq!(ledger.registrations(), 1);
    assert_eq!(ctx.device_authority, me);
    assert_eq!(ctx.device_index, 0);
    assert_eq!(ctx.recorder_identity, me);
    assert_eq!(ctx.device_record.location, "mall-east-03");
}

#[tokio::test]
async fn existing_registry_is_not_recreated() {
    let me = identity(1);
    let ledger = FakeLedger::new(me).with_device(me, 2, me);
    let hints = DeviceHints::default();
    let state = SyncState { last_sample_id: 10, device_index: Some("2".into()) };

    let ctx = DeviceResolver::new(&ledger, me, &hints)
        .ensure_device(&state, true)
        .await
        .unwrap();

    assert_eq!(ctx.device_index, 2);
    assert_eq!(ledger.registry_creations(), 0);
    assert_eq!(ledger.registrations(), 0);
}

#[tokio::test]
async fn explicit_index_wins_over_cached_index() {
    let me = identity(1);
    let ledger = FakeLedger::new(me).with_device(me, 0, me).with_device(me, 5, me);
    let hints = DeviceHints { device_index: Some(5), ..DeviceHints::default() };
    let state = SyncState { last_sample_id: 0, device_index: Some("0".into()) };

    let ctx = DeviceResolver::new(&ledger, me, &hints)
        .ensure_device(&state, false)
        .await
        .unwrap();

    assert_eq!(ctx.device_index, 5);
}

#[tokio::test]
async fn registration_disabled_without_index_fails_without_registering() {
    let me = identity(1);
    let ledger = FakeLedger::new(me).with_registry(me);
    let hints = hints_with_location();

    let err = DeviceResolver::new(&ledger, me, &hints)
        .ensure_device(&SyncState::default(), false)
        .await
        .unwrap_err();

    assert!(matches!(err, ResolveError::IndexRequired));
    assert_eq!(ledger.registrations(), 0);
}

#[tokio::test]
async fn recorder_mismatch_is_fatal_even_when_registration_allowed() {
    let me = identity(1);
    let someone_else = identity(2);
    let ledger = FakeLedger::new(me).with_device(me, 0, someone_else);
    let hints = DeviceHints { device_index: Some(0), ..hints_with_location() };

    let err = DeviceResolver::new(&ledger, me, &hints)
        .ensure_device(&SyncState::default(), true)
        .await
        .unwrap_err();

    match err {
        ResolveError::RecorderMismatch { recorded, signer, index, .. } => {
            assert_eq!(recorded, someone_else);
            assert_eq!(signer, me);
            assert_eq!(index, 0);
        }
        other => panic!("expected recorder mismatch, got {other:?}"),
    }
    assert_eq!(ledger.registrations(), 0);
    assert_eq!(ledger.device(me, 0).unwrap().recorder, someone_else);
}

#[tokio::test]
async fn missing_cached_device_is_re_registered_when_allowed() {
    let me = identity(1);
    let ledger = FakeLedger::new(me).with_registry(me);
    let hints = hints_with_location();
    let state = SyncState { last_sample_id: 40, device_index: Some("9".into()) };

    let ctx = DeviceResolver::new(&ledger, me, &hints)
        .ensure_device(&state, true)
        .await
        .unwrap();

    assert_eq!(ledger.registrations(), 1);
    assert_eq!(ctx.device_index, 0);
}

#[tokio::test]
async fn missing_device_with_registration_disabled_is_fatal() {
    let me = identity(1);
    let ledger = FakeLedger::new(me).with_registry(me);
    let hints = DeviceHints { device_index: Some(3), ..hints_with_location() };

    let err = DeviceResolver::new(&ledger, me, &hints)
        .ensure_device(&SyncState::default(), false)
        .await
        .unwrap_err();

    assert!(matches!(err, ResolveError::DeviceNotFound { index: 3, .. }));
    assert_eq!(ledger.registrations(), 0);
}

#[tokio::test]
async fn other_device_fetch_errors_do_not_fall_through_to_registration() {
    let me = identity(1);
    let ledger = FakeLedger::new(me).with_registry(me);
    ledger.book.lock().unwrap().fail_device_fetch = Some(LedgerError::Transport("timeout".into()));
    let hints = DeviceHints { device_index: Some(0), ..hints_with_location() };

    let err = DeviceResolver::new(&ledger, me, &hints)
        .ensure_device(&SyncState::default(), true)
        .await
        .unwrap_err();

    assert!(matches!(err, ResolveError::DeviceFetch { .. }));
    assert_eq!(ledger.registrations(), 0);
}

#[tokio::test]
async fn registry_fetch_failure_other_than_not_found_is_fatal() {
    let me = identity(1);
    let ledger = FakeLedger::new(me);
    ledger.book.lock().unwrap().fail_registry_fetch =
        Some(LedgerError::Rejected { status: 500, message: "boom".into() });
    let hints = hints_with_location();

    let err = DeviceResolver::new(&ledger, me, &hints)
        .ensure_device(&SyncState::default(), true)
        .await
        .unwrap_err();

    assert!(matches!(err, ResolveError::Registry { .. }));
    assert_eq!(ledger.registry_creations(), 0);
}

#[tokio::test]
async fn registration_requires_location() {
    let me = identity(1);
    let ledger = FakeLedger::new(me);
    let hints = DeviceHints::default();

    let err = DeviceResolver::new(&ledger, me, &hints)
        .ensure_device(&SyncState::default(), true)
        .await
        .unwrap_err();

    assert!(matches!(err, ResolveError::LocationRequired));
    assert_eq!(ledger.registrations(), 0);
}

#[tokio::test]
async fn registration_refused_for_foreign_authority() {
    let me = identity(1);
    let owner = identity(7);
    let ledger = FakeLedger::new(me);
    let hints = DeviceHints { device_authority: Some(owner), ..hints_with_location() };

    let err = DeviceResolver::new(&ledger, me, &hints)
        .ensure_device(&SyncState::default(), true)
        .await
        .unwrap_err();

    assert!(matches!(err, ResolveError::ForeignAuthority { authority, .. } if authority == owner));
    assert_eq!(ledger.registrations(), 0);
}

#[tokio::test]
async fn third_party_authority_device_resolves_when_recorder_is_self() {
    let me = identity(1);
    let owner = identity(7);
    let ledger = FakeLedger::new(me).with_device(owner, 4, me);
    let hints = DeviceHints { device_authority: Some(owner), device_index: Some(4), ..DeviceHints::default() };

    let ctx = DeviceResolver::new(&ledger, me, &hints)
        .ensure_device(&SyncState::default(), false)
        .await
        .unwrap();

    assert_eq!(ctx.device_authority, owner);
    assert_eq!(ctx.recorder_identity, me);
    // own registry is still ensured for the signing identity
    assert_eq!(ledger.registry_creations(), 1);
}

#[tokio::test]
async fn recorder_override_must_match_signer() {
    let me = identity(1);
    let ledger = FakeLedger::new(me).with_device(me, 0, me);
    let hints = DeviceHints {
        device_index: Some(0),
        recorder_authority: Some(identity(3)),
        ..DeviceHints::default()
    };

    let err = DeviceResolver::new(&ledger, me, &hints)
        .ensure_device(&SyncState::default(), true)
        .await
        .unwrap_err();

    assert!(matches!(err, ResolveError::RecorderOverrideMismatch { .. }));
}

#[tokio::test]
async fn inspect_never_creates_registry_or_registers() {
    let me = identity(1);
    let ledger = FakeLedger::new(me);
    let hints = hints_with_location();

    let err = DeviceResolver::new(&ledger, me, &hints)
        .inspect_device(&SyncState::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ResolveError::IndexRequired));
    assert_eq!(ledger.registry_creations(), 0);
    assert_eq!(ledger.registrations(), 0);
}
