//! Headless Chromium backend over the DevTools protocol.

use crate::domain::ports::{BrowserLauncher, BrowserSession};
use crate::utils::error::{PortalError, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;

const CLOSE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ChromiumSettings {
    pub headless: bool,
    pub executable: Option<PathBuf>,
    pub user_agent: Option<String>,
}

impl Default for ChromiumSettings {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher {
    settings: ChromiumSettings,
}

impl ChromiumLauncher {
    pub fn new(settings: ChromiumSettings) -> Self {
        Self { settings }
    }
}

fn cdp(e: CdpError) -> PortalError {
    PortalError::Browser {
        message: e.to_string(),
    }
}

fn selector(id: &str) -> String {
    format!("[id=\"{}\"]", id)
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    type Session = ChromiumSession;

    async fn launch(&self) -> Result<ChromiumSession> {
        let mut builder = BrowserConfig::builder();
        if !self.settings.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &self.settings.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder
            .build()
            .map_err(|message| PortalError::Browser { message })?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(cdp)?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let mut session = ChromiumSession {
                    browser: Some(browser),
                    handler_task: Some(handler_task),
                    page: None,
                };
                session.abort();
                return Err(cdp(e));
            }
        };
        if let Some(user_agent) = &self.settings.user_agent {
            page.set_user_agent(SetUserAgentOverrideParams::new(user_agent.clone()))
                .await
                .map_err(cdp)?;
        }

        tracing::debug!("Chromium session started");
        Ok(ChromiumSession {
            browser: Some(browser),
            handler_task: Some(handler_task),
            page: Some(page),
        })
    }
}

pub struct ChromiumSession {
    browser: Option<Browser>,
    handler_task: Option<JoinHandle<()>>,
    page: Option<Page>,
}

impl ChromiumSession {
    fn page(&self) -> Result<&Page> {
        self.page.as_ref().ok_or_else(|| PortalError::Browser {
            message: "session is closed".to_string(),
        })
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn goto(&mut self, url: &str) -> Result<()> {
        let page = self.page()?;
        page.goto(url).await.map_err(cdp)?;
        page.wait_for_navigation().await.map_err(cdp)?;
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String> {
        Ok(self
            .page()?
            .url()
            .await
            .map_err(cdp)?
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn content(&mut self) -> Result<String> {
        self.page()?.content().await.map_err(cdp)
    }

    async fn has_element(&mut self, id: &str) -> Result<bool> {
        Ok(self.page()?.find_element(selector(id)).await.is_ok())
    }

    async fn fill(&mut self, id: &str, value: &str) -> Result<()> {
        let element = self.page()?.find_element(selector(id)).await.map_err(cdp)?;
        element
            .call_js_fn("function() { this.value = ''; }", false)
            .await
            .map_err(cdp)?;
        element.click().await.map_err(cdp)?;
        element.type_str(value).await.map_err(cdp)?;
        Ok(())
    }

    async fn click(&mut self, id: &str) -> Result<()> {
        let element = self.page()?.find_element(selector(id)).await.map_err(cdp)?;
        element.click().await.map_err(cdp)?;
        Ok(())
    }

    async fn press_enter(&mut self, id: &str) -> Result<()> {
        let element = self.page()?.find_element(selector(id)).await.map_err(cdp)?;
        element.press_key("Enter").await.map_err(cdp)?;
        Ok(())
    }

    async fn wait_for_navigation(&mut self) -> Result<()> {
        self.page()?.wait_for_navigation().await.map_err(cdp)?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.page = None;
        if let Some(mut browser) = self.browser.take() {
            let closed = tokio::time::timeout(CLOSE_GRACE, browser.close()).await;
            let exited = matches!(closed, Ok(Ok(_)))
                && matches!(
                    tokio::time::timeout(CLOSE_GRACE, browser.wait()).await,
                    Ok(Ok(_))
                );
            if !exited {
                tracing::warn!("Chromium did not exit after close, killing it");
                let _ = browser.kill().await;
                let _ = tokio::time::timeout(CLOSE_GRACE, browser.wait()).await;
            }
        }
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
        tracing::debug!("Chromium session closed");
        Ok(())
    }

    fn abort(&mut self) {
        self.page = None;
        let browser = self.browser.take();
        let handler_task = self.handler_task.take();

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Some(mut browser) = browser {
                        let _ = browser.kill().await;
                        let _ = browser.wait().await;
                    }
                    if let Some(task) = handler_task {
                        task.abort();
                    }
                });
            }
            Err(_) => {
                // No runtime left to drive the kill; dropping the handles is all that remains.
                if let Some(task) = handler_task {
                    task.abort();
                }
                drop(browser);
            }
        }
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        if self.browser.is_some() {
            self.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFILLED: &str =
        "data:text/html,<form><input id=\"LogOnDetails_UserName\" value=\"remembered\"/></form>";

    #[tokio::test]
    #[ignore = "needs a local Chromium"]
    async fn test_fill_replaces_existing_value() {
        let mut session = ChromiumLauncher::default().launch().await.unwrap();
        session.goto(PREFILLED).await.unwrap();

        session.fill("LogOnDetails_UserName", "student").await.unwrap();

        let value: String = session
            .page()
            .unwrap()
            .evaluate("document.getElementById('LogOnDetails_UserName').value")
            .await
            .unwrap()
            .into_value()
            .unwrap();
        assert_eq!(value, "student");

        tokio::time::timeout(CLOSE_GRACE * 3, session.close())
            .await
            .expect("close is bounded")
            .unwrap();
    }
}
