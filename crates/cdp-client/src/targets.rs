//! Target directory service client.
//!
//! The directory is the browser's HTTP endpoint enumerating debuggable
//! targets. It is consumed, not implemented, here: list, create, close, and
//! selector matching. Selection never opens a channel; a failed match raises
//! [`ClientError::TargetNotFound`] before any connection work happens.

use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::config::ClientConfig;
use crate::error::ClientError;

/// One directory entry.
#[derive(Clone, Debug, Deserialize)]
pub struct TargetDescriptor {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "type", default)]
    pub category: String,
    /// Debugger channel endpoint; absent when another client is attached.
    #[serde(rename = "webSocketDebuggerUrl", default)]
    pub channel_endpoint: Option<String>,
}

/// HTTP client for the directory service.
pub struct TargetDirectory {
    http: reqwest::Client,
    endpoint: String,
}

impl TargetDirectory {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Directory at the configured endpoint.
    pub fn from_config(cfg: &ClientConfig) -> Self {
        Self::new(cfg.http_endpoint.clone())
    }

    /// Enumerate current targets.
    pub async fn list(&self) -> Result<Vec<TargetDescriptor>, ClientError> {
        let url = format!("{}/json/list", self.endpoint);
        let targets = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(directory_error)?
            .error_for_status()
            .map_err(directory_error)?
            .json::<Vec<TargetDescriptor>>()
            .await
            .map_err(directory_error)?;
        debug!(target: "cdp-directory", count = targets.len(), "listed targets");
        Ok(targets)
    }

    /// Create a new target, optionally at a starting url.
    pub async fn create(&self, url: Option<&str>) -> Result<TargetDescriptor, ClientError> {
        let mut endpoint = Url::parse(&format!("{}/json/new", self.endpoint))
            .map_err(|err| ClientError::transport(format!("bad directory endpoint: {err}")))?;
        if let Some(url) = url {
            endpoint.set_query(Some(&format!("url={url}")));
        }

        self.http
            .put(endpoint)
            .send()
            .await
            .map_err(directory_error)?
            .error_for_status()
            .map_err(directory_error)?
            .json::<TargetDescriptor>()
            .await
            .map_err(directory_error)
    }

    /// Close the target with the given id.
    pub async fn close(&self, id: &str) -> Result<(), ClientError> {
        let url = format!("{}/json/close/{id}", self.endpoint);
        self.http
            .get(&url)
            .send()
            .await
            .map_err(directory_error)?
            .error_for_status()
            .map_err(directory_error)?;
        Ok(())
    }

    /// Resolve a selector to a single target: exact id match first, then
    /// substring match against titles.
    pub async fn select(&self, selector: &str) -> Result<TargetDescriptor, ClientError> {
        let targets = self.list().await?;
        match_target(&targets, selector)
            .cloned()
            .ok_or_else(|| ClientError::TargetNotFound {
                selector: selector.to_string(),
            })
    }
}

/// Selector matching over an already-fetched target list.
pub fn match_target<'a>(
    targets: &'a [TargetDescriptor],
    selector: &str,
) -> Option<&'a TargetDescriptor> {
    targets
        .iter()
        .find(|target| target.id == selector)
        .or_else(|| targets.iter().find(|target| target.title.contains(selector)))
}

fn directory_error(err: reqwest::Error) -> ClientError {
    ClientError::transport(format!("directory request failed: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor(id: &str, title: &str) -> TargetDescriptor {
        TargetDescriptor {
            id: id.to_string(),
            title: title.to_string(),
            url: String::new(),
            category: "page".to_string(),
            channel_endpoint: None,
        }
    }

    #[test]
    fn exact_id_match_wins_over_title_substring() {
        let targets = vec![
            descriptor("tab-1", "tab-2 lookalike"),
            descriptor("tab-2", "Docs"),
        ];
        let found = match_target(&targets, "tab-2").expect("match");
        assert_eq!(found.title, "Docs");
    }

    #[test]
    fn title_substring_matches_when_no_id_does() {
        let targets = vec![
            descriptor("a", "Issue tracker"),
            descriptor("b", "Mail client"),
        ];
        let found = match_target(&targets, "tracker").expect("match");
        assert_eq!(found.id, "a");
    }

    #[test]
    fn no_match_yields_none() {
        let targets = vec![descriptor("a", "Issue tracker")];
        assert!(match_target(&targets, "missing").is_none());
    }

    #[test]
    fn descriptor_decodes_from_directory_shape() {
        let target: TargetDescriptor = serde_json::from_value(json!({
            "id": "DAB7FB6187B554E10B0BD18821265734",
            "title": "Example Domain",
            "type": "page",
            "url": "https://example.com/",
            "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/page/DAB7"
        }))
        .expect("decode");

        assert_eq!(target.category, "page");
        assert_eq!(
            target.channel_endpoint.as_deref(),
            Some("ws://127.0.0.1:9222/devtools/page/DAB7")
        );
    }
}
