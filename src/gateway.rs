use crate::config::GatewayConfig;
use crate::error::{AppError, Result};
use crate::extract;
use crate::schema::Page;
use reqwest::StatusCode;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Hard-coded document title the ISG serves in every firmware language.
const EXPECTED_TITLE: &str = "STIEBEL ELTRON Reglersteuerung";

/// HTTP access to the ISG's embedded web server. Stateless between requests
/// apart from the cached session cookie, which is re-established once when
/// the gateway rejects it. Retry policy across cycles belongs to the poller.
#[derive(Debug)]
pub struct IsgClient {
    http: reqwest::Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    verify_title: bool,
    session: Mutex<Option<String>>,
}

/// Identity details scraped from the ISG, used for tagging and startup
/// logging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceInfo {
    pub mac_address: Option<String>,
    pub sw_version: Option<String>,
}

impl IsgClient {
    pub fn new(cfg: &GatewayConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent(concat!("isg-input/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {}", e)))?;

        let base_url = if cfg.host.starts_with("http://") || cfg.host.starts_with("https://") {
            cfg.host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", cfg.host)
        };

        Ok(Self {
            http,
            base_url,
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            verify_title: cfg.verify_title,
            session: Mutex::new(None),
        })
    }

    /// Fetch the raw HTML of one status page.
    ///
    /// On a credential rejection the cached session is refreshed once with a
    /// fresh login and the request retried; a second rejection surfaces.
    pub async fn fetch(&self, page: Page) -> Result<String> {
        match self.fetch_once(page).await {
            Err(AppError::Auth(_)) if self.username.is_some() => {
                warn!(page = page.name(), "session rejected, re-authenticating");
                self.login().await?;
                self.fetch_once(page).await
            }
            other => other,
        }
    }

    async fn fetch_once(&self, page: Page) -> Result<String> {
        let url = format!("{}{}", self.base_url, page.path());
        let mut request = self.http.get(&url);
        if let (Some(user), Some(pass)) = (&self.username, &self.password) {
            request = request.basic_auth(user, Some(pass));
        }
        if let Some(cookie) = self.session.lock().await.clone() {
            request = request.header(reqwest::header::COOKIE, cookie);
        }

        let response = request.send().await.map_err(request_error)?;
        match response.status() {
            status if status.is_success() => response
                .text()
                .await
                .map_err(|e| AppError::Upstream(format!("unreadable response body: {}", e))),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AppError::Auth(format!(
                "gateway rejected credentials ({})",
                response.status()
            ))),
            status => Err(AppError::Upstream(format!("HTTP {} from {}", status, url))),
        }
    }

    /// Establish a fresh gateway session, caching the cookie it hands out.
    async fn login(&self) -> Result<()> {
        let url = format!("{}/", self.base_url);
        let mut request = self.http.get(&url);
        if let (Some(user), Some(pass)) = (&self.username, &self.password) {
            request = request.basic_auth(user, Some(pass));
        }

        let response = request.send().await.map_err(request_error)?;
        match response.status() {
            status if status.is_success() => {
                let cookie = response
                    .headers()
                    .get(reqwest::header::SET_COOKIE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.split(';').next())
                    .map(|v| v.to_string());
                *self.session.lock().await = cookie;
                Ok(())
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(AppError::Auth("login rejected".to_string()))
            }
            status => Err(AppError::Upstream(format!("HTTP {} during login", status))),
        }
    }

    /// Verify the host actually is an ISG by checking the document title,
    /// and log the UI language the device is configured for.
    pub async fn connect(&self) -> Result<()> {
        let html = self.fetch(Page::InfoSystem).await?;

        if self.verify_title {
            match extract::page_title(&html) {
                Some(title) if title.contains(EXPECTED_TITLE) => {}
                other => {
                    return Err(AppError::Upstream(format!(
                        "unexpected page title {:?}, host does not look like an ISG",
                        other
                    )))
                }
            }
        }

        let language = extract::page_language(&html);
        info!(language = ?language, "connected to ISG gateway");
        Ok(())
    }

    /// Scrape the MAC address and firmware version. Both are best-effort:
    /// a missing page degrades to None rather than failing startup.
    pub async fn device_info(&self) -> DeviceInfo {
        let mut device = DeviceInfo::default();

        match self.fetch(Page::ProfileNetwork).await {
            Ok(html) => device.mac_address = extract::mac_address(&html),
            Err(e) => warn!(error = %e, "could not fetch network profile page"),
        }
        match self.fetch(Page::DiagnosisSystem).await {
            Ok(html) => device.sw_version = extract::isg_version(&html),
            Err(e) => warn!(error = %e, "could not fetch diagnosis system page"),
        }

        device
    }
}

fn request_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() || e.is_connect() {
        AppError::Unreachable(e.to_string())
    } else {
        AppError::Upstream(e.to_string())
    }
}
