//! Integration tests for the provider contract across all strategies.

use integrations_drive_intake::host::{ManualDecision, PickerDocument, SdkLibrary, TokenResponse};
use integrations_drive_intake::mocks::{
    MockHttpTransport, PickerScript, RecordingLoader, ScriptedPicker, ScriptedPrompt,
    ScriptedSession, ScriptedTokenClient, TokenScript,
};
use integrations_drive_intake::prelude::*;
use integrations_drive_intake::providers::SAMPLE_FILES;
use secrecy::ExposeSecret;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

struct Host {
    loader: Arc<RecordingLoader>,
    tokens: Arc<ScriptedTokenClient>,
    picker: Arc<ScriptedPicker>,
    session: Arc<ScriptedSession>,
    prompt: Arc<ScriptedPrompt>,
}

impl Host {
    fn new() -> Self {
        Self {
            loader: Arc::new(RecordingLoader::ready()),
            tokens: Arc::new(ScriptedTokenClient::granting("host-token")),
            picker: Arc::new(ScriptedPicker::new()),
            session: Arc::new(ScriptedSession::new()),
            prompt: Arc::new(ScriptedPrompt::answering(ManualDecision::ProceedManually)),
        }
    }

    fn bindings(&self) -> HostBindings {
        HostBindings::new()
            .with_loader(self.loader.clone())
            .with_token_client(self.tokens.clone())
            .with_picker(self.picker.clone())
            .with_session(self.session.clone())
            .with_prompt(self.prompt.clone())
    }
}

/// Helper to build a handle for a strategy with a full set of host doubles.
fn create_handle(strategy: ProviderStrategy, host: &Host) -> ProviderHandle {
    let config = Arc::new(
        DriveIntakeConfig::builder()
            .backend_base_url("https://api.example.com")
            .google_api_key("api-key")
            .google_client_id("client-id")
            .strategy(strategy)
            .mock_delay(Duration::from_millis(1))
            .build()
            .unwrap(),
    );

    ProviderFactory::new(config)
        .with_host(host.bindings())
        .with_transport(Arc::new(MockHttpTransport::new()))
        .build()
        .unwrap()
}

fn doc(id: &str, name: &str) -> PickerDocument {
    PickerDocument {
        id: id.to_string(),
        name: name.to_string(),
        mime_type: "text/plain".to_string(),
        size_bytes: Some(3),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_picker_results_are_named_or_empty_for_every_strategy() {
    for strategy in [
        ProviderStrategy::Real,
        ProviderStrategy::Legacy,
        ProviderStrategy::Mock,
        ProviderStrategy::Manual,
    ] {
        // Arrange
        let host = Host::new();
        host.picker
            .queue(PickerScript::pick(vec![doc("a", "a.txt"), doc("", "orphan.txt")]));
        let handle = create_handle(strategy, &host);

        // Act
        let files = handle.open_file_picker().await.unwrap();

        // Assert
        assert!(
            files.iter().all(|f| !f.id.is_empty() && !f.name.is_empty()),
            "{} returned an unnamed descriptor",
            strategy
        );
        match strategy {
            ProviderStrategy::Real | ProviderStrategy::Legacy => assert_eq!(files.len(), 1),
            ProviderStrategy::Mock => assert!((1..=3).contains(&files.len())),
            ProviderStrategy::Manual => assert!(files.is_empty()),
        }
    }
}

#[tokio::test]
async fn test_init_twice_has_single_effect() {
    for strategy in [ProviderStrategy::Real, ProviderStrategy::Legacy] {
        // Arrange
        let host = Host::new();
        let handle = create_handle(strategy, &host);

        // Act
        handle.init().await.unwrap();
        handle.init().await.unwrap();

        // Assert
        assert_eq!(host.loader.insert_count(SdkLibrary::GoogleApi), 1);
        assert_eq!(host.loader.insert_count(SdkLibrary::Picker), 1);
        assert!(host.tokens.configure_count() + host.session.init_count() == 1);
    }
}

#[tokio::test]
async fn test_concurrent_init_inserts_once() {
    let host = Host::new();
    let handle = create_handle(ProviderStrategy::Real, &host);

    let (a, b, c) = tokio::join!(handle.init(), handle.init(), handle.init());

    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(host.loader.insert_count(SdkLibrary::GoogleIdentity), 1);
    assert_eq!(host.tokens.configure_count(), 1);
}

#[tokio::test]
async fn test_concurrent_authenticate_shares_one_prompt() {
    let host = Host::new();
    let handle = create_handle(ProviderStrategy::Real, &host);

    let results = futures::future::join_all((0..4).map(|_| handle.authenticate())).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(host.tokens.request_count(), 1);
}

#[tokio::test]
async fn test_concurrent_authenticate_shares_one_refusal() {
    // Arrange
    let host = Host::new();
    host.tokens
        .queue(TokenScript::Respond(TokenResponse::failed("access_denied")));
    let handle = create_handle(ProviderStrategy::Real, &host);

    // Act
    let (a, b) = tokio::join!(handle.authenticate(), handle.authenticate());

    // Assert
    assert!(matches!(a, Err(DriveIntakeError::Auth(_))));
    assert!(matches!(b, Err(DriveIntakeError::Auth(_))));
    assert_eq!(host.tokens.request_count(), 1);

    // A fresh attempt after the refusal prompts again.
    handle.authenticate().await.unwrap();
    assert_eq!(host.tokens.request_count(), 2);
}

#[tokio::test]
async fn test_closed_consent_popup_is_not_reopened_for_waiting_picker() {
    // Arrange
    let host = Host::new();
    host.tokens
        .queue(TokenScript::Respond(TokenResponse::failed("popup_closed")));
    host.picker.queue(PickerScript::pick(vec![doc("a", "a.txt")]));
    let handle = create_handle(ProviderStrategy::Real, &host);

    // Act
    let (a, b) = tokio::join!(handle.open_file_picker(), handle.open_file_picker());

    // Assert
    assert!(a.unwrap().is_empty());
    assert!(b.unwrap().is_empty());
    assert_eq!(host.tokens.request_count(), 1);
    assert_eq!(host.picker.show_count(), 0);
}

#[tokio::test]
async fn test_mock_picker_bounds() {
    let host = Host::new();
    let handle = create_handle(ProviderStrategy::Mock, &host);
    let sample_ids: HashSet<_> = SAMPLE_FILES.iter().map(|s| s.id).collect();

    for _ in 0..25 {
        let files = handle.open_file_picker().await.unwrap();

        assert!((1..=3).contains(&files.len()));
        let ids: HashSet<_> = files.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids.len(), files.len());
        assert!(ids.is_subset(&sample_ids));
    }
}

#[tokio::test]
async fn test_mock_download_round_trip() {
    let host = Host::new();
    let handle = create_handle(ProviderStrategy::Mock, &host);

    for file in handle.open_file_picker().await.unwrap() {
        let downloaded = handle.download_file(&file.id, &file.name).await.unwrap();
        assert!(downloaded.size() > 0);
        assert_eq!(downloaded.name, file.name);
    }
}

#[tokio::test]
async fn test_real_picker_waits_for_consent_then_reuses_token() {
    // Arrange
    let host = Host::new();
    host.picker.queue(PickerScript::pick(vec![doc("x", "x.txt")]));
    host.picker.queue(PickerScript::pick(vec![doc("y", "y.txt")]));
    let handle = create_handle(ProviderStrategy::Real, &host);

    // Act
    let first = handle.open_file_picker().await.unwrap();
    let second = handle.open_file_picker().await.unwrap();

    // Assert
    assert_eq!(first[0].id, "x");
    assert_eq!(second[0].id, "y");
    assert_eq!(host.tokens.request_count(), 1);
    assert_eq!(
        host.picker.last_spec().unwrap().oauth_token.expose_secret(),
        "host-token"
    );
}

#[tokio::test]
async fn test_abandoned_consent_resolves_empty() {
    let host = Host::new();
    host.tokens.queue(TokenScript::Abandon);
    let handle = create_handle(ProviderStrategy::Real, &host);

    let files = handle.open_file_picker().await.unwrap();

    assert!(files.is_empty());
    assert_eq!(host.picker.show_count(), 0);
    assert!(!handle.is_authenticated().await);
}

#[tokio::test]
async fn test_provider_error_is_recoverable() {
    let host = Host::new();
    host.tokens
        .queue(TokenScript::Respond(TokenResponse::failed("server_error")));
    let handle = create_handle(ProviderStrategy::Real, &host);

    let err = handle.authenticate().await.unwrap_err();
    assert!(err.is_recoverable());

    // A second attempt runs a new consent flow and succeeds.
    handle.authenticate().await.unwrap();
    assert_eq!(host.tokens.request_count(), 2);
}

#[tokio::test]
async fn test_lapsed_credential_is_not_refreshed_by_download() {
    let host = Host::new();
    host.tokens.queue(TokenScript::Respond(TokenResponse::granted("short", 30)));
    let handle = create_handle(ProviderStrategy::Real, &host);

    // Lifetime is inside the expiry buffer, so the credential counts as lapsed.
    handle.authenticate().await.unwrap();
    let err = handle.download_file("a", "a.txt").await.unwrap_err();

    assert!(err.is_auth_expired());
    assert_eq!(host.tokens.request_count(), 1);
}

#[tokio::test]
async fn test_manual_download_is_unsupported() {
    let host = Host::new();
    let handle = create_handle(ProviderStrategy::Manual, &host);

    let err = handle.download_file("id", "notes.txt").await.unwrap_err();

    assert!(matches!(err, DriveIntakeError::Unsupported(_)));
    assert!(err.user_message().contains("notes.txt"));
}
