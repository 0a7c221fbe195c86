use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::gateway::http::ApiGateway;
use crate::gateway::{ApiOutcome, Failure};
use crate::menu::{MenuItem, MenuRegistry};
use crate::settings::{Settings, SettingsStore};

/// Browser tab a request originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct TabRef {
    pub id: i64,
}

/// Messages the extension sends, tagged by `method`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum Request {
    ShortenLink {
        url: String,
        #[serde(default)]
        keyword: Option<String>,
    },
    /// Older extension builds send `getSelection`.
    #[serde(alias = "getSelection")]
    GetSelectionInTab {
        #[serde(default)]
        tab: Option<TabRef>,
    },
    GetLinkTarget {
        #[serde(default)]
        tab: Option<TabRef>,
    },
    /// Check the given settings against the server and keep them if they work.
    Version { settings: Settings },
    #[serde(other)]
    Unknown,
}

impl Request {
    pub fn method(&self) -> &'static str {
        match self {
            Self::ShortenLink { .. } => "shortenLink",
            Self::GetSelectionInTab { .. } => "getSelectionInTab",
            Self::GetLinkTarget { .. } => "getLinkTarget",
            Self::Version { .. } => "version",
            Self::Unknown => "unknown",
        }
    }
}

/// Exactly one reply is produced per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Api(ApiOutcome),
    Selection {
        selection: String,
    },
    LinkTarget {
        #[serde(rename = "linkTarget")]
        link_target: String,
    },
    /// The method is not one this host knows. Carries the method name when
    /// the request had one.
    Unhandled {
        unhandled: Option<String>,
    },
    /// Known method with an unusable payload.
    Rejected {
        error: String,
    },
}

/// Read-only queries against the page in a tab.
#[async_trait]
pub trait PageContext: Send + Sync {
    /// Current text selection, empty when nothing is selected.
    async fn selection(&self, tab: Option<TabRef>) -> String;

    /// `href` of the focused anchor element, empty when focus is not on a link.
    async fn link_target(&self, tab: Option<TabRef>) -> String;
}

/// Page context for a process without access to the browser's pages.
/// Every query answers with an empty string.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedPage;

#[async_trait]
impl PageContext for DetachedPage {
    async fn selection(&self, tab: Option<TabRef>) -> String {
        tracing::debug!(?tab, "no page access, empty selection");
        String::new()
    }

    async fn link_target(&self, tab: Option<TabRef>) -> String {
        tracing::debug!(?tab, "no page access, empty link target");
        String::new()
    }
}

/// Dispatches extension messages to the gateway, the settings store and the
/// page context.
pub struct Router {
    gateway: ApiGateway,
    store: Arc<dyn SettingsStore>,
    page: Arc<dyn PageContext>,
    menus: MenuRegistry,
}

impl Router {
    /// Builds the router and registers the context-menu entry.
    pub fn new(
        gateway: ApiGateway,
        store: Arc<dyn SettingsStore>,
        page: Arc<dyn PageContext>,
    ) -> Self {
        let menus = MenuRegistry::new();
        menus.register(MenuItem::shorten());
        Self {
            gateway,
            store,
            page,
            menus,
        }
    }

    pub fn menus(&self) -> &MenuRegistry {
        &self.menus
    }

    /// Decode a raw JSON message and handle it.
    pub async fn handle_value(&self, value: Value) -> Reply {
        let method = value
            .get("method")
            .and_then(Value::as_str)
            .map(str::to_string);

        match serde_json::from_value::<Request>(value) {
            Ok(Request::Unknown) => {
                tracing::warn!(method = ?method, "unhandled request");
                Reply::Unhandled { unhandled: method }
            }
            Ok(request) => self.handle(request).await,
            Err(e) => match method {
                Some(method) => {
                    tracing::warn!(method = %method, "malformed request: {e}");
                    Reply::Rejected {
                        error: format!("malformed request: {e}"),
                    }
                }
                None => {
                    tracing::warn!("request without method");
                    Reply::Unhandled { unhandled: None }
                }
            },
        }
    }

    pub async fn handle(&self, request: Request) -> Reply {
        tracing::debug!(method = request.method(), "handling request");

        match request {
            Request::ShortenLink { url, keyword } => {
                let settings = match self.store.load().await {
                    Ok(settings) => settings,
                    Err(e) => {
                        tracing::error!("failed to load settings: {e}");
                        return Reply::Api(ApiOutcome::Failure(Failure::bare(format!(
                            "Could not load settings: {e}"
                        ))));
                    }
                };
                Reply::Api(self.gateway.shorten(&settings, &url, keyword.as_deref()).await)
            }
            Request::GetSelectionInTab { tab } => Reply::Selection {
                selection: self.page.selection(tab).await,
            },
            Request::GetLinkTarget { tab } => Reply::LinkTarget {
                link_target: self.page.link_target(tab).await,
            },
            Request::Version { settings } => {
                let outcome = self.gateway.check_version(&settings).await;
                if let Some(success) = outcome.success() {
                    tracing::info!(version = %success.extracted_value, "server reachable");
                    if let Err(e) = self.store.save(&settings).await {
                        tracing::warn!("failed to persist verified settings: {e}");
                    }
                }
                Reply::Api(outcome)
            }
            Request::Unknown => Reply::Unhandled { unhandled: None },
        }
    }
}
