use crate::utils::error::{PortalError, Result};
use url::Url;

/// Path segment that names the Portal application root.
pub const APP_SEGMENT: &str = "HomeAccess";

const LOGIN_PATH: &str = "Account/LogOn";
const AVERAGES_PATH: &str = "Content/Student/Assignments.aspx";
const TRANSCRIPT_PATH: &str = "Content/Student/Transcript.aspx";

/// How the stored base URL relates to the application root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlConvention {
    /// The URL already contains the application segment (root or a deep link into it).
    Rooted,
    /// The URL is the district host or a path above the application; the segment is appended.
    Prefixed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalRoutes {
    pub convention: UrlConvention,
    pub root: Url,
    pub login: Url,
    pub averages: Url,
    pub transcript: Url,
}

impl PortalRoutes {
    pub fn resolve(base: &str) -> Result<Self> {
        let parsed = Url::parse(base.trim()).map_err(|e| PortalError::InvalidPortalUrl {
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(PortalError::InvalidPortalUrl {
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }
        if parsed.host_str().map(str::is_empty).unwrap_or(true) {
            return Err(PortalError::InvalidPortalUrl {
                reason: "missing host".to_string(),
            });
        }

        let (convention, root_path) = app_root_path(parsed.path());
        let mut root = parsed;
        root.set_query(None);
        root.set_fragment(None);
        root.set_path(&format!("{}/", root_path));

        let join = |path: &str| {
            root.join(path).map_err(|e| PortalError::InvalidPortalUrl {
                reason: e.to_string(),
            })
        };

        Ok(Self {
            convention,
            login: join(LOGIN_PATH)?,
            averages: join(AVERAGES_PATH)?,
            transcript: join(TRANSCRIPT_PATH)?,
            root,
        })
    }

    /// True while the browser sits on the sign-in page, with or without a query string.
    pub fn is_login_route(&self, current: &str) -> bool {
        is_login_url(current)
    }
}

pub fn detect_convention(base_path: &str) -> UrlConvention {
    app_root_path(base_path).0
}

/// Application root path without a trailing slash.
fn app_root_path(path: &str) -> (UrlConvention, String) {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match segments
        .iter()
        .position(|s| s.eq_ignore_ascii_case(APP_SEGMENT))
    {
        Some(index) => (
            UrlConvention::Rooted,
            format!("/{}", segments[..=index].join("/")),
        ),
        None => {
            let mut root = String::new();
            for segment in &segments {
                root.push('/');
                root.push_str(segment);
            }
            root.push('/');
            root.push_str(APP_SEGMENT);
            (UrlConvention::Prefixed, root)
        }
    }
}

pub fn is_login_url(current: &str) -> bool {
    let path = match Url::parse(current) {
        Ok(url) => url.path().to_string(),
        Err(_) => current.split(['?', '#']).next().unwrap_or("").to_string(),
    };
    path.trim_end_matches('/')
        .to_ascii_lowercase()
        .ends_with(&LOGIN_PATH.to_ascii_lowercase())
}
