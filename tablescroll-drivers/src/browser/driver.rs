use crate::browser::{
    fingerprint::UserAgentManager,
    page::TablePage,
    stealth::{build_stealth_arguments, StealthScripts},
};
use fantoccini::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tablescroll_common::{Result, ScrollError, StealthLevel};
use url::Url;
use webdriver::capabilities::Capabilities;

/// How to reach and launch the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverOptions {
    pub webdriver_url: String,
    pub headless: bool,
    pub stealth: StealthLevel,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            headless: false,
            stealth: StealthLevel::Balanced,
        }
    }
}

/// WebDriver session with stealth launch arguments and a fixed fingerprint.
pub struct TableDriver {
    client: Client,
    user_agent_manager: UserAgentManager,
    stealth: StealthLevel,
}

impl TableDriver {
    /// Connect to a running WebDriver service (Chromedriver by default).
    pub async fn connect(opts: &DriverOptions) -> Result<Self> {
        let user_agent_manager = UserAgentManager::new();
        let args = build_stealth_arguments(
            opts.stealth,
            user_agent_manager.session_profile(),
            opts.headless,
        );

        let mut caps = Capabilities::new();
        caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));

        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(&opts.webdriver_url)
            .await
            .map_err(|e| {
                ScrollError::device(format!("webdriver connect to {} failed: {e}", opts.webdriver_url))
            })?;
        tracing::info!(
            webdriver = %opts.webdriver_url,
            headless = opts.headless,
            stealth = ?opts.stealth,
            "browser.session.started"
        );

        Ok(Self {
            client,
            user_agent_manager,
            stealth: opts.stealth,
        })
    }

    /// Navigate to `url` (when given) and wrap the active tab as a surface.
    ///
    /// Without a URL the session's current page is used as-is, which is how a
    /// caller that already navigated and logged in hands over the table view.
    pub async fn open(&self, url: Option<&str>) -> Result<TablePage> {
        if let Some(url) = url {
            let url = Url::parse(url)
                .map_err(|e| ScrollError::Config(format!("invalid start url `{url}`: {e}")))?;
            self.client
                .goto(url.as_str())
                .await
                .map_err(|e| ScrollError::device(format!("navigation to {url} failed: {e}")))?;
            for script in
                StealthScripts::for_level(self.stealth, self.user_agent_manager.session_profile())
            {
                self.client
                    .execute(&script, vec![])
                    .await
                    .map_err(|e| ScrollError::device(format!("stealth script failed: {e}")))?;
            }
        }
        Ok(TablePage::new(
            self.client.clone(),
            self.user_agent_manager.viewport_centre(),
        ))
    }

    /// Close the underlying browser session.
    pub async fn close(self) -> Result<()> {
        self.client
            .close()
            .await
            .map_err(|e| ScrollError::device(format!("closing session failed: {e}")))
    }
}
