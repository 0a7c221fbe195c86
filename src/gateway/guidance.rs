//! User-facing guidance attached to failed API calls.

use scraper::Html;

use crate::gateway::{Endpoint, Supplement};

pub const ISSUE_TRACKER: &str = "https://github.com/binfalse/YOURLS-FirefoxExtension/issues";

/// Pseudo-link pointing the user at the extension's options page.
pub const SETTINGS_LINK: &str = "extension's settings";

pub const OUTDATED_SERVER: &str = "Are you using an outdated YOURLS version?";

/// Guidance for a non-success status. 0 stands for connection-level failures.
pub fn for_status(status: u16, endpoint: &Endpoint) -> Supplement {
    match status {
        403 => Supplement {
            text: format!(
                "Seems like you are not allowed to access the API. Did you provide a correct \
                 signature? Please verify at {} and double check the signature token in the \
                 {SETTINGS_LINK}.",
                endpoint.tools_url()
            ),
            links: vec![endpoint.tools_url(), SETTINGS_LINK.to_string()],
        },
        404 => Supplement {
            text: format!(
                "Seems like there is no YOURLS API at {}. Did you provide the correct Server URL? \
                 The admin interface should be reachable at {}. Do not append \
                 '{}' to the Server URL, it is added automatically. Double check the Server URL \
                 in the {SETTINGS_LINK}.",
                endpoint.api_url(),
                endpoint.admin_url(),
                super::API_ENTRY_POINT,
            ),
            links: vec![
                endpoint.admin_url(),
                endpoint.api_url(),
                SETTINGS_LINK.to_string(),
            ],
        },
        400 => Supplement {
            text: format!(
                "Is that a proper URL? YOURLS won't shorten URLs such as 'about:addons'. If you \
                 think this is an error please report it at {ISSUE_TRACKER} and explain what \
                 you did."
            ),
            links: vec![ISSUE_TRACKER.to_string()],
        },
        0 => Supplement {
            text: format!(
                "Experienced a general connection issue. Maybe your SSL certificate is not valid, \
                 your server is down, or the Server URL is illegal? Please verify the \
                 {SETTINGS_LINK} and make sure that you can access the admin interface at {}. \
                 If you need further help open a ticket at {ISSUE_TRACKER} and explain what you \
                 did.",
                endpoint.admin_url()
            ),
            links: vec![
                endpoint.admin_url(),
                ISSUE_TRACKER.to_string(),
                SETTINGS_LINK.to_string(),
            ],
        },
        _ => Supplement::default(),
    }
}

/// Text content of `markup` with every tag dropped.
pub fn strip_html(markup: &str) -> String {
    Html::parse_fragment(markup)
        .root_element()
        .text()
        .collect()
}
