#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use actix_web::{middleware::Logger, web, App, HttpServer};
use std::sync::Arc;

use fblogin::{
    accounts::{
        AccountGate, HttpPictureFetcher, IdentityResolver, MemoryUserDirectory,
        ProfilePictureImporter,
    },
    handlers::{facebook_callback, facebook_login, health, CALLBACK_PATH, HEALTH_PATH, LOGIN_PATH},
    login::LoginFlowController,
    oauth::FacebookGraphClient,
    session::SessionCookieFactory,
    settings::FbLoginSettings,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load configuration from Settings.toml and environment variables
    // This also loads .env file and initializes the logger
    let settings = FbLoginSettings::load()
        .map_err(|e| std::io::Error::other(format!("Failed to load settings: {e}")))?;

    if let Err(e) = settings.facebook.validate() {
        // Logins will be refused with a configuration error until this is fixed
        log::warn!("Facebook login is not usable yet: {e}");
    }

    start_server(settings).await
}

/// Wire the login flow and start the server
///
/// # Errors
///
/// Returns an error if:
/// - Server binding fails
/// - Server fails to start
async fn start_server(settings: FbLoginSettings) -> std::io::Result<()> {
    let bind_address = settings.get_bind_address();
    print_startup_info(&bind_address, &settings);

    let directory = Arc::new(MemoryUserDirectory::new());
    let importer = Arc::new(ProfilePictureImporter::new(
        Arc::new(HttpPictureFetcher::new()),
        directory.clone(),
        settings.pictures.clone(),
    ));
    let resolver = IdentityResolver::new(
        directory,
        AccountGate::new(settings.login.gate_policy()),
        settings.login.registration,
    )
    .with_picture_importer(importer);
    let provider = Arc::new(FacebookGraphClient::from_settings(&settings.facebook));

    let controller = web::Data::new(LoginFlowController::from_settings(
        provider, resolver, &settings,
    ));
    let cookies = web::Data::new(SessionCookieFactory::new(
        settings.session.session_secret.as_bytes(),
        settings.cookies.secure,
    ));

    HttpServer::new(move || {
        App::new()
            .app_data(controller.clone())
            .app_data(cookies.clone())
            .wrap(Logger::default())
            .configure(configure_services)
    })
    .bind(&bind_address)?
    .run()
    .await
}

fn configure_services(cfg: &mut web::ServiceConfig) {
    cfg.route(LOGIN_PATH, web::get().to(facebook_login))
        .route(CALLBACK_PATH, web::get().to(facebook_callback))
        .route(HEALTH_PATH, web::get().to(health));
}

fn print_startup_info(bind_address: &str, settings: &FbLoginSettings) {
    println!("Starting fblogin on http://{bind_address}");
    println!();
    println!("Login endpoints:");
    println!("  GET  {LOGIN_PATH}          - Redirect to Facebook (optional ?destination=)");
    println!("  GET  {CALLBACK_PATH} - OAuth callback");
    println!();
    println!("Redirect URI to register with the Facebook app:");
    println!("  {}", settings.callback_url());
    println!();
    println!("System endpoints:");
    println!("  GET  {HEALTH_PATH}            - Health check");
    println!(
        "  Profile pictures: {}",
        if settings.pictures.enabled {
            settings.pictures.root.display().to_string()
        } else {
            "disabled".to_string()
        }
    );
}
