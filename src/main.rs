use std::sync::Arc;

use yourls_relay::config::Config;
use yourls_relay::gateway::http::ApiGateway;
use yourls_relay::host;
use yourls_relay::messages::{DetachedPage, Router};
use yourls_relay::settings::FileSettingsStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the native messaging protocol, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    // The browser starts the host with an arbitrary CWD; prefer the .env
    // next to the binary and fall back to dotenvy's CWD search.
    let beside_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(".env")))
        .filter(|path| path.exists());
    match beside_exe {
        Some(path) => {
            dotenvy::from_path(&path).ok();
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    tracing::info!("yourls-relay starting");

    let config = Config::from_env();
    let store = FileSettingsStore::new(config.settings_path).with_defaults(config.default_settings);
    tracing::info!(path = %store.path().display(), "settings store");

    let gateway = ApiGateway::new()?;
    let router = Arc::new(Router::new(gateway, Arc::new(store), Arc::new(DetachedPage)));
    for item in router.menus().items() {
        tracing::info!(id = %item.id, title = %item.title, "context menu entry");
    }

    host::serve(router, tokio::io::stdin(), tokio::io::stdout())
        .await
        .inspect_err(|e| tracing::error!("native messaging error: {e:?}"))?;

    tracing::info!("yourls-relay shutting down");
    Ok(())
}
