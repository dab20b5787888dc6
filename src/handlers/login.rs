// Login and callback handlers: translate controller outcomes into redirects
use actix_web::{web, HttpRequest, HttpResponse, Result};
use log::{debug, error, warn};
use serde::Deserialize;

use crate::login::{BeginOutcome, BeginRequest, LoginFlowController};
use crate::oauth::OAuthCallback;
use crate::session::{CookieStateStore, SessionCookieFactory};
use crate::utils::ResponseBuilder;

#[derive(Deserialize, Debug, Default)]
pub struct LoginQuery {
    pub destination: Option<String>,
}

/// Start a Facebook login
///
/// # Errors
/// Never fails; failures become redirects to the login page
pub async fn facebook_login(
    req: HttpRequest,
    query: Result<web::Query<LoginQuery>, actix_web::Error>,
    controller: web::Data<LoginFlowController>,
    cookies: web::Data<SessionCookieFactory>,
) -> Result<HttpResponse> {
    let mut store = cookies.load_store(&req);
    // An unreadable destination is dropped; the login itself can still start
    let destination = match query {
        Ok(query) => query.into_inner().destination,
        Err(e) => {
            warn!("Ignoring unreadable login query: {e}");
            None
        }
    };
    let request = BeginRequest { destination };

    let outcome = controller.begin_login(&request, &mut store);
    if let BeginOutcome::Failure(failure) = &outcome {
        debug!(
            "Facebook login start ended at {:?} with {}",
            outcome.stage(),
            failure.code()
        );
    }
    Ok(redirect_with_store(
        &outcome.redirect_location(),
        &store,
        &cookies,
    ))
}

/// Handle the redirect back from Facebook
///
/// # Errors
/// Never fails; failures become redirects to the login page
pub async fn facebook_callback(
    req: HttpRequest,
    query: Result<web::Query<OAuthCallback>, actix_web::Error>,
    controller: web::Data<LoginFlowController>,
    cookies: web::Data<SessionCookieFactory>,
) -> Result<HttpResponse> {
    let mut store = cookies.load_store(&req);
    // A callback without a readable state fails the state check like any forgery
    let callback = match query {
        Ok(query) => query.into_inner(),
        Err(e) => {
            warn!("Unreadable Facebook callback query: {e}");
            OAuthCallback::default()
        }
    };

    let outcome = controller.complete_login(&callback, &mut store).await;
    if let Some(failure) = outcome.failure() {
        debug!(
            "Facebook callback ended at {:?} with {}",
            outcome.stage(),
            failure.code()
        );
    }
    Ok(redirect_with_store(
        &outcome.redirect_location(),
        &store,
        &cookies,
    ))
}

// The session cookie is written only when the store changed
fn redirect_with_store(
    location: &str,
    store: &CookieStateStore,
    cookies: &SessionCookieFactory,
) -> HttpResponse {
    let cookie = match cookies.store_cookie(store) {
        Ok(cookie) => cookie,
        Err(e) => {
            error!("Failed to encrypt session cookie: {e}");
            Some(cookies.create_expired_cookie())
        }
    };
    ResponseBuilder::redirect(location, cookie.into_iter().collect())
}
