use std::{env, process, sync::Arc};

use anyhow::Context;
use log::{error, info, warn};
use sso_warp_example::{
    assets::ENTRY_DOCUMENT, config::Config, entity::Sessions, provider::ScalekitClient, Auth,
};

#[tokio::main]
async fn main() {
    if env::var_os("RUST_LOG").is_none() {
        // Set `RUST_LOG=sso_warp_example=debug` to see debug logs,
        // this only shows access logs.
        env::set_var("RUST_LOG", "sso_warp_example=info");
    }
    pretty_env_logger::init();

    if let Err(err) = dotenv::dotenv() {
        error!("Error loading .env file: {}", err);
        process::exit(1);
    }

    if let Err(err) = run().await {
        error!("{:?}", err);
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_env().context("reading configuration")?;

    info!("environment: {}", config.environment_url);
    info!("redirect: {}", config.redirect_uri);

    let client = ScalekitClient::new(
        &config.environment_url,
        config.client_id.clone(),
        config.client_secret.clone(),
    )
    .context("creating identity provider client")?;

    let entry = config.web_build_dir.join(ENTRY_DOCUMENT);
    if !entry.is_file() {
        warn!("frontend entry document {} not found", entry.display());
    }

    let auth = Arc::new(Auth::new(
        Arc::new(client),
        config.host.clone(),
        config.redirect_uri.clone(),
        Sessions::new(config.session_policy),
    ));

    let routes = sso_warp_example::routes(auth, config.web_build_dir.clone());

    info!("listening on {}", config.listen_addr);
    warp::serve(routes).run(config.listen_addr).await;

    Ok(())
}
