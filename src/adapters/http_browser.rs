//! Script-free browser backend over `reqwest`.
//!
//! Pages are fetched as server-rendered HTML, forms are submitted the way a browser would
//! serialize them (hidden inputs, selects, checked boxes, the clicked button) and redirects are
//! followed. Each session owns its own client and cookie jar.

use crate::domain::ports::{BrowserLauncher, BrowserSession};
use crate::utils::error::{PortalError, Result};
use crate::utils::html::{Document, Element};
use async_trait::async_trait;
use reqwest::{redirect, Client, Response};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;
use zeroize::Zeroizing;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct HttpBrowserSettings {
    pub request_timeout: Duration,
    pub user_agent: String,
    pub max_redirects: usize,
}

impl Default for HttpBrowserSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_redirects: 10,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpBrowser {
    settings: HttpBrowserSettings,
}

impl HttpBrowser {
    pub fn new(settings: HttpBrowserSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl BrowserLauncher for HttpBrowser {
    type Session = HttpSession;

    async fn launch(&self) -> Result<HttpSession> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(self.settings.request_timeout)
            .user_agent(self.settings.user_agent.clone())
            .redirect(redirect::Policy::limited(self.settings.max_redirects))
            .build()
            .map_err(http_error)?;
        tracing::debug!("HTTP browser session started");
        Ok(HttpSession {
            client: Some(client),
            url: None,
            html: String::new(),
            values: HashMap::new(),
            navigated: false,
        })
    }
}

pub struct HttpSession {
    client: Option<Client>,
    url: Option<Url>,
    html: String,
    /// Filled form values keyed by input name.
    values: HashMap<String, Zeroizing<String>>,
    navigated: bool,
}

impl HttpSession {
    fn client(&self) -> Result<Client> {
        self.client.clone().ok_or_else(|| PortalError::Browser {
            message: "session is closed".to_string(),
        })
    }

    async fn load(&mut self, response: Response) -> Result<()> {
        let response = response.error_for_status().map_err(http_error)?;
        let url = response.url().clone();
        tracing::debug!(status = %response.status(), "Loaded page");
        self.html = response.text().await.map_err(http_error)?;
        self.url = Some(url);
        self.values.clear();
        Ok(())
    }

    async fn submit_form(&mut self, trigger_id: &str, submitter: Option<(String, String)>) -> Result<()> {
        let client = self.client()?;
        let base = self.url.clone().ok_or_else(|| PortalError::Browser {
            message: "no page loaded".to_string(),
        })?;

        let (target, method, fields) = {
            let doc = Document::parse(&self.html);
            let form = doc
                .find_all(|e| e.name() == "form")
                .into_iter()
                .find(|form| {
                    doc.descendants(form)
                        .iter()
                        .any(|e| e.id().as_deref() == Some(trigger_id))
                })
                .ok_or_else(|| PortalError::Markup {
                    message: format!("element '{}' is not inside a form", trigger_id),
                })?;

            let target = match form.attr("action").filter(|a| !a.trim().is_empty()) {
                Some(action) => base.join(action.trim()).map_err(|e| PortalError::Markup {
                    message: format!("form action is not a valid URL: {}", e),
                })?,
                None => base,
            };
            let method = form
                .attr("method")
                .unwrap_or_else(|| "get".to_string())
                .to_ascii_lowercase();
            let mut fields = form_fields(&doc, &form, &self.values);
            if let Some(pair) = submitter {
                fields.push(pair);
            }
            (target, method, fields)
        };

        tracing::debug!(%method, fields = fields.len(), "Submitting form");
        let request = if method == "post" {
            client.post(target).form(&fields)
        } else {
            client.get(target).query(&fields)
        };
        let response = request.send().await.map_err(http_error)?;
        self.load(response).await?;
        self.navigated = true;
        Ok(())
    }
}

/// Request URLs can carry filled form values (GET forms put them in the query string), so they
/// never travel inside an error.
fn http_error(e: reqwest::Error) -> PortalError {
    PortalError::Http(e.without_url())
}

/// Successful controls of a form, in document order.
fn form_fields(
    doc: &Document<'_>,
    form: &Element<'_>,
    filled: &HashMap<String, Zeroizing<String>>,
) -> Vec<(String, String)> {
    let mut fields = Vec::new();

    for control in doc.descendants(form) {
        let Some(name) = control.attr("name") else {
            continue;
        };
        if control.attr("disabled").is_some() {
            continue;
        }
        let filled_value = filled.get(&name).map(|v| v.to_string());

        match control.name() {
            "input" => {
                let kind = control
                    .attr("type")
                    .unwrap_or_else(|| "text".to_string())
                    .to_ascii_lowercase();
                match kind.as_str() {
                    "submit" | "button" | "image" | "reset" | "file" => {}
                    "checkbox" | "radio" => {
                        if control.attr("checked").is_some() {
                            let value = control.attr("value").unwrap_or_else(|| "on".to_string());
                            fields.push((name, value));
                        }
                    }
                    _ => {
                        let value = filled_value
                            .or_else(|| control.attr("value"))
                            .unwrap_or_default();
                        fields.push((name, value));
                    }
                }
            }
            "textarea" => {
                let value = filled_value.unwrap_or_else(|| control.inner_html().to_string());
                fields.push((name, value));
            }
            "select" => {
                let value = filled_value.or_else(|| selected_option(doc, &control));
                if let Some(value) = value {
                    fields.push((name, value));
                }
            }
            _ => {}
        }
    }

    fields
}

fn selected_option(doc: &Document<'_>, select: &Element<'_>) -> Option<String> {
    let options: Vec<_> = doc
        .descendants(select)
        .into_iter()
        .filter(|e| e.name() == "option")
        .collect();
    options
        .iter()
        .find(|o| o.attr("selected").is_some())
        .or_else(|| options.first())
        .map(|o| o.attr("value").unwrap_or_else(|| o.text()))
}

fn is_submit_control(element: &Element<'_>) -> bool {
    let kind = element.attr("type").map(|t| t.to_ascii_lowercase());
    match element.name() {
        "button" => !matches!(kind.as_deref(), Some("button") | Some("reset")),
        "input" => matches!(kind.as_deref(), Some("submit") | Some("image")),
        _ => false,
    }
}

#[async_trait]
impl BrowserSession for HttpSession {
    async fn goto(&mut self, url: &str) -> Result<()> {
        let client = self.client()?;
        let response = client.get(url).send().await.map_err(http_error)?;
        self.load(response).await?;
        self.navigated = false;
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String> {
        Ok(self
            .url
            .as_ref()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn content(&mut self) -> Result<String> {
        Ok(self.html.clone())
    }

    async fn has_element(&mut self, id: &str) -> Result<bool> {
        Ok(Document::parse(&self.html).by_id(id).is_some())
    }

    async fn fill(&mut self, id: &str, value: &str) -> Result<()> {
        let name = {
            let doc = Document::parse(&self.html);
            let element = doc.by_id(id).ok_or_else(|| PortalError::Markup {
                message: format!("input '{}' not found", id),
            })?;
            if !matches!(element.name(), "input" | "textarea" | "select") {
                return Err(PortalError::Markup {
                    message: format!("element '{}' is not a form control", id),
                });
            }
            element.attr("name").unwrap_or_else(|| id.to_string())
        };
        self.values.insert(name, Zeroizing::new(value.to_string()));
        Ok(())
    }

    async fn click(&mut self, id: &str) -> Result<()> {
        enum Action {
            Submit(Option<(String, String)>),
            Follow(String),
        }

        let action = {
            let doc = Document::parse(&self.html);
            let element = doc.by_id(id).ok_or_else(|| PortalError::Markup {
                message: format!("element '{}' not found", id),
            })?;
            if is_submit_control(&element) {
                let submitter = element
                    .attr("name")
                    .map(|name| (name, element.attr("value").unwrap_or_default()));
                Action::Submit(submitter)
            } else if let Some(href) = element.attr("href").filter(|_| element.name() == "a") {
                Action::Follow(href)
            } else {
                return Err(PortalError::Markup {
                    message: format!("element '{}' does nothing without scripts", id),
                });
            }
        };

        match action {
            Action::Submit(submitter) => self.submit_form(id, submitter).await,
            Action::Follow(href) => {
                let base = self.url.clone().ok_or_else(|| PortalError::Browser {
                    message: "no page loaded".to_string(),
                })?;
                let target = base.join(&href).map_err(|e| PortalError::Markup {
                    message: format!("link target is not a valid URL: {}", e),
                })?;
                self.goto(target.as_str()).await?;
                self.navigated = true;
                Ok(())
            }
        }
    }

    async fn press_enter(&mut self, id: &str) -> Result<()> {
        self.submit_form(id, None).await
    }

    async fn wait_for_navigation(&mut self) -> Result<()> {
        if !std::mem::take(&mut self.navigated) {
            // Nothing is in flight; only the caller's timeout ends this.
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.abort();
        tracing::debug!("HTTP browser session closed");
        Ok(())
    }

    fn abort(&mut self) {
        self.client = None;
        self.url = None;
        self.html.clear();
        self.values.clear();
    }
}
