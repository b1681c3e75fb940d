//! Scripted host surfaces.

use crate::callback::OnceCallback;
use crate::host::{
    ChoicePrompt, ConsentPrompt, HostAuthFailure, ManualDecision, PickerAction, PickerCallback,
    PickerDocument, PickerResponse, PickerSpec, PickerSurface, SdkLibrary, SdkLoader,
    SessionAuth, SessionConfig, SessionGrant, TokenClient, TokenClientConfig, TokenRequest,
    TokenResponse, UserPrompt,
};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use secrecy::SecretString;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

enum LoaderMode {
    Preloaded,
    ReadyAfter(u32),
    NeverReady,
    Failing(String),
}

/// Script loader that records insertions and readiness checks.
pub struct RecordingLoader {
    mode: LoaderMode,
    inserts: Mutex<HashMap<SdkLibrary, usize>>,
    checks: Mutex<HashMap<SdkLibrary, u32>>,
    checks_after_insert: Mutex<HashMap<SdkLibrary, u32>>,
}

impl RecordingLoader {
    fn with_mode(mode: LoaderMode) -> Self {
        Self {
            mode,
            inserts: Mutex::new(HashMap::new()),
            checks: Mutex::new(HashMap::new()),
            checks_after_insert: Mutex::new(HashMap::new()),
        }
    }

    /// Libraries become ready as soon as they are inserted.
    pub fn ready() -> Self {
        Self::ready_after(0)
    }

    /// Libraries are already present; nothing gets inserted.
    pub fn preloaded() -> Self {
        Self::with_mode(LoaderMode::Preloaded)
    }

    /// Libraries report ready on the `checks`-th readiness check after insertion.
    pub fn ready_after(checks: u32) -> Self {
        Self::with_mode(LoaderMode::ReadyAfter(checks))
    }

    /// Libraries never become ready.
    pub fn never_ready() -> Self {
        Self::with_mode(LoaderMode::NeverReady)
    }

    /// Every insertion fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self::with_mode(LoaderMode::Failing(message.to_string()))
    }

    /// Insertions of one library.
    pub fn insert_count(&self, library: SdkLibrary) -> usize {
        self.inserts.lock().unwrap().get(&library).copied().unwrap_or(0)
    }

    /// Insertions across all libraries.
    pub fn total_inserts(&self) -> usize {
        self.inserts.lock().unwrap().values().sum()
    }

    /// Readiness checks of one library.
    pub fn ready_checks(&self, library: SdkLibrary) -> u32 {
        self.checks.lock().unwrap().get(&library).copied().unwrap_or(0)
    }
}

impl SdkLoader for RecordingLoader {
    fn is_ready(&self, library: SdkLibrary) -> bool {
        *self.checks.lock().unwrap().entry(library).or_insert(0) += 1;

        match self.mode {
            LoaderMode::Preloaded => true,
            LoaderMode::NeverReady | LoaderMode::Failing(_) => false,
            LoaderMode::ReadyAfter(required) => {
                if self.insert_count(library) == 0 {
                    return false;
                }
                let mut after = self.checks_after_insert.lock().unwrap();
                let seen = after.entry(library).or_insert(0);
                *seen += 1;
                *seen >= required
            }
        }
    }

    fn insert(&self, library: SdkLibrary) -> Result<(), String> {
        *self.inserts.lock().unwrap().entry(library).or_insert(0) += 1;
        match &self.mode {
            LoaderMode::Failing(message) => Err(message.clone()),
            _ => Ok(()),
        }
    }
}

/// Scripted outcome of one token request.
#[derive(Debug, Clone)]
pub enum TokenScript {
    /// Deliver one response.
    Respond(TokenResponse),
    /// Deliver two responses through the same callback.
    RespondTwice(TokenResponse, TokenResponse),
    /// Drop the callback without calling it.
    Abandon,
    /// Refuse to start the request.
    Refuse(String),
}

/// Token client that answers requests from a script.
pub struct ScriptedTokenClient {
    scripts: Mutex<VecDeque<TokenScript>>,
    fallback: TokenScript,
    delay: Duration,
    configure_error: Option<String>,
    configured: Mutex<Vec<TokenClientConfig>>,
    prompts: Mutex<Vec<ConsentPrompt>>,
    revoked: AtomicUsize,
}

impl ScriptedTokenClient {
    /// Grants `token` to every request that has no queued script.
    pub fn granting(token: &str) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            fallback: TokenScript::Respond(TokenResponse::granted(token, 3600)),
            delay: Duration::from_millis(5),
            configure_error: None,
            configured: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
            revoked: AtomicUsize::new(0),
        }
    }

    /// Delay before the callback fires.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Makes `configure` fail.
    pub fn failing_configure(mut self, message: &str) -> Self {
        self.configure_error = Some(message.to_string());
        self
    }

    /// Queues the outcome of the next request.
    pub fn queue(&self, script: TokenScript) {
        self.scripts.lock().unwrap().push_back(script);
    }

    /// Times `configure` was called.
    pub fn configure_count(&self) -> usize {
        self.configured.lock().unwrap().len()
    }

    /// Last configuration received.
    pub fn last_config(&self) -> Option<TokenClientConfig> {
        self.configured.lock().unwrap().last().cloned()
    }

    /// Times a token was requested.
    pub fn request_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    /// Prompt modes of all requests, in order.
    pub fn prompts(&self) -> Vec<ConsentPrompt> {
        self.prompts.lock().unwrap().clone()
    }

    /// Times a token was revoked.
    pub fn revoke_count(&self) -> usize {
        self.revoked.load(Ordering::SeqCst)
    }
}

impl TokenClient for ScriptedTokenClient {
    fn configure(&self, config: TokenClientConfig) -> Result<(), String> {
        self.configured.lock().unwrap().push(config);
        match &self.configure_error {
            Some(message) => Err(message.clone()),
            None => Ok(()),
        }
    }

    fn request_access_token(
        &self,
        request: TokenRequest,
        callback: OnceCallback<TokenResponse>,
    ) -> Result<(), String> {
        self.prompts.lock().unwrap().push(request.prompt);

        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        let delay = self.delay;
        match script {
            TokenScript::Refuse(message) => Err(message),
            TokenScript::Abandon => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    drop(callback);
                });
                Ok(())
            }
            TokenScript::Respond(response) => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    callback.call(response);
                });
                Ok(())
            }
            TokenScript::RespondTwice(first, second) => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    callback.call(first);
                    callback.call(second);
                });
                Ok(())
            }
        }
    }

    fn revoke(&self, _token: &SecretString) {
        self.revoked.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scripted behaviour of one picker presentation.
#[derive(Debug, Clone)]
pub enum PickerScript {
    /// Deliver these events in order.
    Events(Vec<PickerResponse>),
    /// Close without reporting anything.
    Vanish,
    /// Fail to construct the dialog.
    Fail(String),
}

impl PickerScript {
    /// `Loaded` followed by `Picked` with `documents`.
    pub fn pick(documents: Vec<PickerDocument>) -> Self {
        PickerScript::Events(vec![
            PickerResponse {
                action: PickerAction::Loaded,
                documents: Vec::new(),
            },
            PickerResponse {
                action: PickerAction::Picked,
                documents,
            },
        ])
    }

    /// `Loaded` followed by `Cancel`.
    pub fn cancel() -> Self {
        PickerScript::Events(vec![
            PickerResponse {
                action: PickerAction::Loaded,
                documents: Vec::new(),
            },
            PickerResponse {
                action: PickerAction::Cancel,
                documents: Vec::new(),
            },
        ])
    }
}

/// Picker surface that plays back scripts.
pub struct ScriptedPicker {
    scripts: Mutex<VecDeque<PickerScript>>,
    shown: Mutex<Vec<PickerSpec>>,
}

impl ScriptedPicker {
    /// Creates a picker; unscripted presentations cancel.
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            shown: Mutex::new(Vec::new()),
        }
    }

    /// Creates a picker whose first presentation picks `documents`.
    pub fn picking(documents: Vec<PickerDocument>) -> Self {
        let picker = Self::new();
        picker.queue(PickerScript::pick(documents));
        picker
    }

    /// Queues the next presentation.
    pub fn queue(&self, script: PickerScript) {
        self.scripts.lock().unwrap().push_back(script);
    }

    /// Times the picker was shown.
    pub fn show_count(&self) -> usize {
        self.shown.lock().unwrap().len()
    }

    /// Spec of the last presentation.
    pub fn last_spec(&self) -> Option<PickerSpec> {
        self.shown.lock().unwrap().last().cloned()
    }
}

impl Default for ScriptedPicker {
    fn default() -> Self {
        Self::new()
    }
}

impl PickerSurface for ScriptedPicker {
    fn show(&self, spec: PickerSpec, callback: PickerCallback) -> Result<(), String> {
        self.shown.lock().unwrap().push(spec);

        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(PickerScript::cancel);

        match script {
            PickerScript::Fail(message) => Err(message),
            PickerScript::Vanish => {
                drop(callback);
                Ok(())
            }
            PickerScript::Events(events) => {
                tokio::spawn(async move {
                    for event in events {
                        tokio::time::sleep(Duration::from_millis(1)).await;
                        callback.call(event);
                    }
                });
                Ok(())
            }
        }
    }
}

/// Builds a session grant valid for one hour.
pub fn session_grant(token: &str) -> SessionGrant {
    SessionGrant {
        access_token: SecretString::new(token.to_string()),
        expires_at: Utc::now() + ChronoDuration::hours(1),
        scope: None,
    }
}

/// Legacy session object with scripted sign-in results.
pub struct ScriptedSession {
    grant: Mutex<Option<SessionGrant>>,
    sign_ins: Mutex<VecDeque<Result<SessionGrant, HostAuthFailure>>>,
    init_error: Option<HostAuthFailure>,
    configs: Mutex<Vec<SessionConfig>>,
    sign_in_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
}

impl ScriptedSession {
    /// Signed-out session; unscripted sign-ins grant `session-token`.
    pub fn new() -> Self {
        Self {
            grant: Mutex::new(None),
            sign_ins: Mutex::new(VecDeque::new()),
            init_error: None,
            configs: Mutex::new(Vec::new()),
            sign_in_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
        }
    }

    /// Session that already holds a grant for `token`.
    pub fn signed_in(token: &str) -> Self {
        let session = Self::new();
        *session.grant.lock().unwrap() = Some(session_grant(token));
        session
    }

    /// Makes `init` fail.
    pub fn failing_init(mut self, failure: HostAuthFailure) -> Self {
        self.init_error = Some(failure);
        self
    }

    /// Queues the result of the next interactive sign-in.
    pub fn queue_sign_in(&self, result: Result<SessionGrant, HostAuthFailure>) {
        self.sign_ins.lock().unwrap().push_back(result);
    }

    /// Times `init` was called.
    pub fn init_count(&self) -> usize {
        self.configs.lock().unwrap().len()
    }

    /// Last configuration received.
    pub fn last_config(&self) -> Option<SessionConfig> {
        self.configs.lock().unwrap().last().cloned()
    }

    /// Interactive sign-ins attempted.
    pub fn sign_in_count(&self) -> usize {
        self.sign_in_calls.load(Ordering::SeqCst)
    }

    /// Sign-outs performed.
    pub fn sign_out_count(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionAuth for ScriptedSession {
    async fn init(&self, config: SessionConfig) -> Result<(), HostAuthFailure> {
        self.configs.lock().unwrap().push(config);
        match &self.init_error {
            Some(failure) => Err(failure.clone()),
            None => Ok(()),
        }
    }

    fn is_signed_in(&self) -> bool {
        self.grant.lock().unwrap().is_some()
    }

    fn current_grant(&self) -> Option<SessionGrant> {
        self.grant.lock().unwrap().clone()
    }

    async fn sign_in(&self) -> Result<SessionGrant, HostAuthFailure> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(2)).await;

        let result = self
            .sign_ins
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(session_grant("session-token")));

        if let Ok(grant) = &result {
            *self.grant.lock().unwrap() = Some(grant.clone());
        }
        result
    }

    async fn sign_out(&self) {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        self.grant.lock().unwrap().take();
    }
}

/// User prompt that always answers with a fixed decision.
pub struct ScriptedPrompt {
    decision: ManualDecision,
    asked: Mutex<Vec<ChoicePrompt>>,
    notices: Mutex<Vec<String>>,
    opened: Mutex<Vec<Url>>,
}

impl ScriptedPrompt {
    /// Creates a prompt answering `decision`.
    pub fn answering(decision: ManualDecision) -> Self {
        Self {
            decision,
            asked: Mutex::new(Vec::new()),
            notices: Mutex::new(Vec::new()),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Choices presented so far.
    pub fn asked(&self) -> Vec<ChoicePrompt> {
        self.asked.lock().unwrap().clone()
    }

    /// Notifications shown so far.
    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().unwrap().clone()
    }

    /// URLs opened so far.
    pub fn opened(&self) -> Vec<Url> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl UserPrompt for ScriptedPrompt {
    async fn choose(&self, prompt: &ChoicePrompt) -> ManualDecision {
        self.asked.lock().unwrap().push(prompt.clone());
        self.decision
    }

    fn notify(&self, message: &str) {
        self.notices.lock().unwrap().push(message.to_string());
    }

    fn open_external(&self, url: &Url) {
        self.opened.lock().unwrap().push(url.clone());
    }
}
