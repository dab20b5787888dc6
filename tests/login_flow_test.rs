use fblogin::accounts::{AccountStatus, GatePolicy, RegistrationPolicy};
use fblogin::login::{BeginOutcome, BeginRequest, LoginFailure, Outcome};
use fblogin::oauth::{AccessToken, OAuthCallback, PictureResolution, ProviderError};
use fblogin::session::{committed_access_token, LoginAttempt, MemoryStateStore};
use fblogin::testing::constants::{TEST_EMAIL, TEST_EXTERNAL_ID, TEST_PICTURE_URL};
use fblogin::testing::fixtures::query_param;
use fblogin::testing::{FakeProviderClient, LoginHarness, LoginHarnessBuilder, TestFixtures};
use serde_json::json;

fn expect_success(outcome: Outcome) -> fblogin::login::LoginSuccess {
    match outcome {
        Outcome::Success(success) => success,
        Outcome::Failure(failure) => panic!("expected success, got {failure:?}"),
    }
}

/// Seed a committed token so tests can check that failures remove it
fn with_committed_token(store: &mut MemoryStateStore) {
    let mut attempt = LoginAttempt::new(store);
    attempt.set_pending_token(&AccessToken::new("previous-token", None));
    attempt.commit_pending_token();
}

#[tokio::test]
async fn test_missing_credentials_fail_before_any_provider_call() {
    for facebook in TestFixtures::unconfigured_facebook_settings() {
        let harness = LoginHarnessBuilder::new().with_facebook(facebook).build();
        let mut store = MemoryStateStore::new();

        assert_eq!(
            harness
                .controller
                .begin_login(&BeginRequest::default(), &mut store),
            BeginOutcome::Failure(LoginFailure::ConfigurationError)
        );

        LoginAttempt::new(&mut store).set_csrf_state("known-state");
        let outcome = harness
            .controller
            .complete_login(&LoginHarness::callback("code", "known-state"), &mut store)
            .await;
        assert_eq!(outcome.failure(), Some(&LoginFailure::ConfigurationError));
        assert_eq!(harness.provider.total_calls(), 0);
        assert!(outcome.redirect_location().starts_with("/user/login?error=configuration_error"));
    }
}

#[tokio::test]
async fn test_state_mismatch_never_exchanges_code() {
    let cases: [(Option<&str>, Option<&str>); 6] = [
        (Some("stored-state"), Some("other-state")),
        (Some("stored-state"), Some("STORED-STATE")),
        (Some("stored-state"), Some("stored-state ")),
        (None, Some("stored-state")),
        (Some("stored-state"), None),
        (None, None),
    ];

    for (stored, received) in cases {
        let harness = LoginHarnessBuilder::new().build();
        let mut store = MemoryStateStore::new();
        with_committed_token(&mut store);
        if let Some(stored) = stored {
            LoginAttempt::new(&mut store).set_csrf_state(stored);
        }

        let callback = OAuthCallback {
            code: Some("code".to_string()),
            state: received.map(str::to_string),
            ..OAuthCallback::default()
        };
        let outcome = harness.controller.complete_login(&callback, &mut store).await;

        assert_eq!(
            outcome.failure(),
            Some(&LoginFailure::InvalidState),
            "stored {stored:?}, received {received:?}"
        );
        assert_eq!(harness.provider.call_count("exchange_code"), 0);
        assert!(committed_access_token(&store).is_none());
        assert!(LoginAttempt::new(&mut store).csrf_state().is_none());
    }
}

#[tokio::test]
async fn test_state_is_single_use() {
    let harness = LoginHarnessBuilder::new().build();
    let mut store = MemoryStateStore::new();
    let state = harness.begin(&mut store);
    let callback = LoginHarness::callback("code", &state);

    expect_success(harness.controller.complete_login(&callback, &mut store).await);
    let replay = harness.controller.complete_login(&callback, &mut store).await;

    assert_eq!(replay.failure(), Some(&LoginFailure::InvalidState));
    assert_eq!(harness.provider.call_count("exchange_code"), 1);
    assert!(committed_access_token(&store).is_none());
}

#[tokio::test]
async fn test_username_gets_numeric_suffix() {
    let harness = LoginHarnessBuilder::new()
        .with_account(TestFixtures::account(2, "Jane Doe", "someone@example.com"))
        .build();
    let success = expect_success(harness.login(&mut MemoryStateStore::new()).await);
    assert_eq!(success.account.username, "Jane Doe 2");

    let harness = LoginHarnessBuilder::new()
        .with_account(TestFixtures::account(2, "Jane Doe", "someone@example.com"))
        .with_account(TestFixtures::account(3, "Jane Doe 2", "other@example.com"))
        .build();
    let success = expect_success(harness.login(&mut MemoryStateStore::new()).await);
    assert_eq!(success.account.username, "Jane Doe 3");
}

#[tokio::test]
async fn test_gate_rules_apply_to_existing_accounts() {
    let cases = [
        (
            TestFixtures::account_with(1, TEST_EMAIL, AccountStatus::Active, &["editor"]),
            LoginFailure::AdminLoginDisabled,
        ),
        (
            TestFixtures::account_with(7, TEST_EMAIL, AccountStatus::Active, &["editor"]),
            LoginFailure::RoleDisabled("editor".to_string()),
        ),
        (
            TestFixtures::account_with(7, TEST_EMAIL, AccountStatus::Blocked, &[]),
            LoginFailure::InactiveAccount,
        ),
    ];

    for (account, expected) in cases {
        let harness = LoginHarnessBuilder::new()
            .with_gate(GatePolicy {
                disabled_roles: ["editor".to_string()].into_iter().collect(),
                ..GatePolicy::default()
            })
            .with_account(account)
            .build();
        let mut store = MemoryStateStore::new();

        let outcome = harness.login(&mut store).await;
        assert_eq!(outcome.failure(), Some(&expected));
        assert!(committed_access_token(&store).is_none());
        assert!(LoginAttempt::new(&mut store).authenticated_uid().is_none());
        assert_eq!(harness.directory.accounts().len(), 1);
        assert!(harness.listener.created().is_empty());
        assert!(harness.listener.logged_in().is_empty());
    }
}

#[tokio::test]
async fn test_existing_account_logs_in_without_creation() {
    let harness = LoginHarnessBuilder::new()
        .with_account(TestFixtures::account(5, "jane", TEST_EMAIL))
        .with_facebook(fblogin::settings::FacebookSettings {
            endpoints: "/me/friends|friends".to_string(),
            ..TestFixtures::facebook_settings()
        })
        .build();
    let mut store = MemoryStateStore::new();

    let success = expect_success(harness.login(&mut store).await);
    assert_eq!(success.account.id, 5);
    assert!(!success.is_new);
    assert!(success.extra_data.is_empty());
    assert_eq!(success.redirect_path, "/user");
    assert_eq!(harness.directory.accounts().len(), 1);
    assert_eq!(harness.provider.call_count("fetch_picture_url"), 0);
    assert_eq!(harness.provider.call_count("request_endpoint"), 0);

    assert_eq!(
        committed_access_token(&store).map(|token| token.value),
        Some(FakeProviderClient::LONG_LIVED_TOKEN.to_string())
    );
    assert!(harness.controller.has_valid_access_token(&store));
    assert_eq!(LoginAttempt::new(&mut store).authenticated_uid(), Some(5));
    assert!(harness.listener.created().is_empty());
    assert_eq!(harness.listener.logged_in(), vec![5]);
}

#[tokio::test]
async fn test_new_account_is_created_with_picture() {
    let temp = tempfile::tempdir().unwrap();
    let harness = LoginHarnessBuilder::new()
        .with_picture_root(temp.path().to_path_buf())
        .with_provider(
            FakeProviderClient::new().with_endpoint("/me/friends", json!({ "data": [] })),
        )
        .with_facebook(fblogin::settings::FacebookSettings {
            endpoints: "/me/friends|friends\n/me/likes".to_string(),
            ..TestFixtures::facebook_settings()
        })
        .build();
    let mut store = MemoryStateStore::new();

    let success = expect_success(harness.login(&mut store).await);
    assert!(success.is_new);
    assert_eq!(success.account.email, TEST_EMAIL);
    assert_eq!(success.account.status, AccountStatus::Active);

    assert_eq!(harness.fetcher.urls(), vec![TEST_PICTURE_URL.to_string()]);
    assert_eq!(
        harness.provider.last_picture_resolution(),
        Some(PictureResolution {
            width: 85,
            height: 85
        })
    );
    let picture = temp
        .path()
        .join("pictures")
        .join(format!("{TEST_EXTERNAL_ID}.jpg"));
    assert!(picture.exists());
    assert_eq!(
        harness.directory.get(success.account.id).unwrap().picture,
        Some(picture)
    );

    assert_eq!(success.extra_data.get("friends"), Some(&json!({ "data": [] })));
    assert!(!success.extra_data.contains_key("me/likes"));
    assert!(committed_access_token(&store).is_some());
    assert_eq!(harness.listener.created(), vec![success.account.id]);
    assert_eq!(harness.listener.logged_in(), vec![success.account.id]);
}

#[tokio::test]
async fn test_picture_failure_does_not_fail_login() {
    let temp = tempfile::tempdir().unwrap();
    let harness = LoginHarnessBuilder::new()
        .with_picture_root(temp.path().to_path_buf())
        .with_fetcher(fblogin::testing::RecordingPictureFetcher::failing(
            ProviderError::transport("connection reset"),
        ))
        .build();

    let success = expect_success(harness.login(&mut MemoryStateStore::new()).await);
    assert!(success.is_new);
    assert_eq!(harness.fetcher.urls().len(), 1);
    assert_eq!(harness.directory.get(success.account.id).unwrap().picture, None);
}

#[tokio::test]
async fn test_pending_approval_keeps_token_out_of_session() {
    let harness = LoginHarnessBuilder::new()
        .with_registration(RegistrationPolicy::VisitorsAdminApproval)
        .build();
    let mut store = MemoryStateStore::new();

    let outcome = harness.login(&mut store).await;
    assert_eq!(outcome.failure(), Some(&LoginFailure::PendingApproval));
    let accounts = harness.directory.accounts();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].status, AccountStatus::Pending);
    assert!(committed_access_token(&store).is_none());
    assert!(LoginAttempt::new(&mut store).pending_token().is_none());
    assert!(LoginAttempt::new(&mut store).authenticated_uid().is_none());
    // The account exists, so creation is announced, but nobody logged in
    assert_eq!(harness.listener.created(), vec![accounts[0].id]);
    assert!(harness.listener.logged_in().is_empty());
}

#[tokio::test]
async fn test_admin_only_registration_is_blocked() {
    let harness = LoginHarnessBuilder::new()
        .with_registration(RegistrationPolicy::AdminOnly)
        .build();

    let outcome = harness.login(&mut MemoryStateStore::new()).await;
    assert_eq!(outcome.failure(), Some(&LoginFailure::RegistrationBlocked));
    assert!(harness.directory.accounts().is_empty());
    assert!(harness.listener.created().is_empty());
    assert!(harness.listener.logged_in().is_empty());
}

#[tokio::test]
async fn test_second_login_announces_only_the_login() {
    let harness = LoginHarnessBuilder::new().build();

    let first = expect_success(harness.login(&mut MemoryStateStore::new()).await);
    let second = expect_success(harness.login(&mut MemoryStateStore::new()).await);
    assert!(first.is_new);
    assert!(!second.is_new);
    assert_eq!(harness.listener.created(), vec![first.account.id]);
    assert_eq!(
        harness.listener.logged_in(),
        vec![first.account.id, first.account.id]
    );
}

#[tokio::test]
async fn test_declined_dialog_makes_no_provider_calls() {
    let harness = LoginHarnessBuilder::new().build();
    let mut store = MemoryStateStore::new();
    harness.begin(&mut store);
    let calls_before = harness.provider.total_calls();

    let callback = OAuthCallback {
        error: Some("access_denied".to_string()),
        error_reason: Some("user_denied".to_string()),
        ..OAuthCallback::default()
    };
    let outcome = harness.controller.complete_login(&callback, &mut store).await;

    assert_eq!(outcome.failure(), Some(&LoginFailure::UserDenied));
    assert_eq!(harness.provider.total_calls(), calls_before);
}

#[tokio::test]
async fn test_missing_email_permission_triggers_rerequest() {
    let harness = LoginHarnessBuilder::new()
        .with_provider(FakeProviderClient::new().with_permissions(&["public_profile"]))
        .build();
    let mut store = MemoryStateStore::new();

    let outcome = harness.login(&mut store).await;
    assert_eq!(outcome.failure(), Some(&LoginFailure::PermissionDenied));
    assert!(LoginAttempt::new(&mut store).reprompt_requested());
    assert_eq!(harness.provider.call_count("fetch_profile"), 0);
    assert!(committed_access_token(&store).is_none());

    let BeginOutcome::Redirect { url } = harness
        .controller
        .begin_login(&BeginRequest::default(), &mut store)
    else {
        panic!("expected a re-request redirect");
    };
    assert_eq!(query_param(&url, "auth_type").as_deref(), Some("rerequest"));
    assert_eq!(query_param(&url, "scope").as_deref(), Some("email"));
    assert_eq!(harness.provider.call_count("build_reauthorization_url"), 1);
    assert_eq!(harness.provider.last_scopes(), Some(vec!["email".to_string()]));
}

#[tokio::test]
async fn test_provider_failures_map_to_outcomes() {
    let cases = [
        (
            FakeProviderClient::new().with_exchange_error(ProviderError::api("invalid code")),
            LoginFailure::TokenExchangeFailed,
        ),
        (
            FakeProviderClient::new().with_long_lived_error(ProviderError::transport("timeout")),
            LoginFailure::TokenExchangeFailed,
        ),
        (
            FakeProviderClient::new().with_profile_error(ProviderError::malformed("not json")),
            LoginFailure::ProfileFetchFailed,
        ),
        (
            FakeProviderClient::new().with_profile(TestFixtures::profile_with(
                TEST_EXTERNAL_ID,
                "Jane Doe",
                None,
            )),
            LoginFailure::EmailMissing,
        ),
    ];

    for (provider, expected) in cases {
        let harness = LoginHarnessBuilder::new().with_provider(provider).build();
        let mut store = MemoryStateStore::new();
        with_committed_token(&mut store);

        let outcome = harness.login(&mut store).await;
        assert_eq!(outcome.failure(), Some(&expected));
        assert!(committed_access_token(&store).is_none());
        assert!(LoginAttempt::new(&mut store).pending_token().is_none());
        assert!(harness.directory.accounts().is_empty());
    }
}

#[tokio::test]
async fn test_post_login_destination() {
    let harness = LoginHarnessBuilder::new()
        .with_post_login_path("/welcome")
        .build();
    let mut store = MemoryStateStore::new();
    let state = harness.begin_with(
        &BeginRequest {
            destination: Some("https://evil.example/phish".to_string()),
        },
        &mut store,
    );
    let success = expect_success(
        harness
            .controller
            .complete_login(&LoginHarness::callback("code", &state), &mut store)
            .await,
    );
    assert_eq!(success.redirect_path, "/welcome");
    assert!(LoginAttempt::new(&mut store).post_login_path().is_none());

    let harness = LoginHarnessBuilder::new().with_redirect_user_form(true).build();
    let success = expect_success(harness.login(&mut MemoryStateStore::new()).await);
    assert_eq!(success.redirect_path, format!("/user/{}/edit", success.account.id));
}
