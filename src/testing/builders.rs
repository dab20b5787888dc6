//! Fluent builder for a fully wired login flow
//!
//! Every collaborator is a fake or in-memory implementation, so a harness runs complete
//! begin/complete round trips without network access.

use std::path::PathBuf;
use std::sync::Arc;

use super::fixtures::{state_from_url, TestFixtures};
use super::mock::{FakeProviderClient, RecordingLoginListener, RecordingPictureFetcher};
use crate::accounts::{
    AccountGate, GatePolicy, IdentityResolver, LocalAccount, MemoryUserDirectory,
    ProfilePictureImporter, RegistrationPolicy,
};
use crate::login::{BeginOutcome, BeginRequest, LoginFlowController, Outcome, PostLoginRedirect};
use crate::oauth::OAuthCallback;
use crate::session::StateStore;
use crate::settings::{FacebookSettings, PictureSettings};

use super::constants::TEST_RETURN_URL;

/// Builder for [`LoginHarness`]
pub struct LoginHarnessBuilder {
    provider: FakeProviderClient,
    fetcher: RecordingPictureFetcher,
    facebook: FacebookSettings,
    registration: RegistrationPolicy,
    gate: GatePolicy,
    pictures: Option<PictureSettings>,
    post_login_path: String,
    redirect_user_form: bool,
    accounts: Vec<LocalAccount>,
}

impl Default for LoginHarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoginHarnessBuilder {
    /// Configured Facebook app, open registration, default gate, pictures disabled
    #[must_use]
    pub fn new() -> Self {
        Self {
            provider: FakeProviderClient::new(),
            fetcher: RecordingPictureFetcher::default(),
            facebook: TestFixtures::facebook_settings(),
            registration: RegistrationPolicy::Visitors,
            gate: GatePolicy::default(),
            pictures: None,
            post_login_path: "/user".to_string(),
            redirect_user_form: false,
            accounts: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_provider(mut self, provider: FakeProviderClient) -> Self {
        self.provider = provider;
        self
    }

    #[must_use]
    pub fn with_fetcher(mut self, fetcher: RecordingPictureFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    #[must_use]
    pub fn with_facebook(mut self, facebook: FacebookSettings) -> Self {
        self.facebook = facebook;
        self
    }

    #[must_use]
    pub fn with_registration(mut self, registration: RegistrationPolicy) -> Self {
        self.registration = registration;
        self
    }

    #[must_use]
    pub fn with_gate(mut self, gate: GatePolicy) -> Self {
        self.gate = gate;
        self
    }

    /// Enable picture import below `root`
    #[must_use]
    pub fn with_picture_root(mut self, root: PathBuf) -> Self {
        self.pictures = Some(TestFixtures::picture_settings(root));
        self
    }

    #[must_use]
    pub fn with_post_login_path(mut self, path: &str) -> Self {
        self.post_login_path = path.to_string();
        self
    }

    #[must_use]
    pub fn with_redirect_user_form(mut self, enabled: bool) -> Self {
        self.redirect_user_form = enabled;
        self
    }

    /// Seed the directory with an existing account
    #[must_use]
    pub fn with_account(mut self, account: LocalAccount) -> Self {
        self.accounts.push(account);
        self
    }

    /// # Panics
    ///
    /// Panics if two seeded accounts share an id, email or username
    #[must_use]
    pub fn build(self) -> LoginHarness {
        let directory = Arc::new(MemoryUserDirectory::new());
        for account in self.accounts {
            directory
                .insert(account)
                .expect("seeded accounts must be unique");
        }

        let provider = Arc::new(self.provider);
        let fetcher = Arc::new(self.fetcher);
        let mut resolver = IdentityResolver::new(
            directory.clone(),
            AccountGate::new(self.gate),
            self.registration,
        );
        let picture_settings = self.pictures.unwrap_or_else(|| PictureSettings {
            enabled: false,
            ..PictureSettings::default()
        });
        let importer = Arc::new(ProfilePictureImporter::new(
            fetcher.clone(),
            directory.clone(),
            picture_settings,
        ));
        let listener = Arc::new(RecordingLoginListener::new());
        resolver = resolver
            .with_picture_importer(importer)
            .with_listener(listener.clone());

        let controller = LoginFlowController::new(
            provider.clone(),
            resolver,
            self.facebook,
            TEST_RETURN_URL,
            PostLoginRedirect::new(&self.post_login_path, self.redirect_user_form),
        );

        LoginHarness {
            controller,
            provider,
            directory,
            fetcher,
            listener,
        }
    }
}

/// A controller plus handles on its fakes
pub struct LoginHarness {
    pub controller: LoginFlowController,
    pub provider: Arc<FakeProviderClient>,
    pub directory: Arc<MemoryUserDirectory>,
    pub fetcher: Arc<RecordingPictureFetcher>,
    pub listener: Arc<RecordingLoginListener>,
}

impl LoginHarness {
    /// Run `begin_login` and return the state embedded in the redirect
    ///
    /// # Panics
    ///
    /// Panics if the controller did not redirect to Facebook
    pub fn begin(&self, store: &mut dyn StateStore) -> String {
        self.begin_with(&BeginRequest::default(), store)
    }

    /// # Panics
    ///
    /// Panics if the controller did not redirect to Facebook
    pub fn begin_with(&self, request: &BeginRequest, store: &mut dyn StateStore) -> String {
        match self.controller.begin_login(request, store) {
            BeginOutcome::Redirect { url } => {
                state_from_url(&url).expect("authorization URL carries a state")
            }
            BeginOutcome::Failure(failure) => panic!("begin_login failed: {failure}"),
        }
    }

    #[must_use]
    pub fn callback(code: &str, state: &str) -> OAuthCallback {
        OAuthCallback {
            code: Some(code.to_string()),
            state: Some(state.to_string()),
            ..OAuthCallback::default()
        }
    }

    /// A full begin/complete round trip with a valid state
    pub async fn login(&self, store: &mut dyn StateStore) -> Outcome {
        let state = self.begin(store);
        self.controller
            .complete_login(&Self::callback("test-code", &state), store)
            .await
    }
}
