//! Listing across pages
//!
//! Every list endpoint wraps its records in an object keyed by the collection
//! name, next to a `links.pages` object describing the neighbouring pages.

use doform_core::provider::{ProviderError, ProviderResult};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::client::ApiClient;

pub const FIRST_PAGE: u32 = 1;
pub const PER_PAGE: u32 = 200;

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Links {
    #[serde(default)]
    pub pages: Option<Pages>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Pages {
    #[serde(default)]
    pub first: String,
    #[serde(default)]
    pub prev: String,
    #[serde(default)]
    pub next: String,
    #[serde(default)]
    pub last: String,
}

impl Links {
    /// Whether the response holding these links was the final page
    pub fn is_last_page(&self) -> bool {
        match &self.pages {
            None => true,
            Some(pages) => pages.last.is_empty(),
        }
    }

    /// Page number of the response holding these links
    pub fn current_page(&self) -> ProviderResult<u32> {
        let Some(pages) = &self.pages else {
            return Ok(FIRST_PAGE);
        };
        if pages.prev.is_empty() {
            return Ok(FIRST_PAGE);
        }
        Ok(page_for_url(&pages.prev)? + 1)
    }
}

fn page_for_url(raw: &str) -> ProviderResult<u32> {
    let url = Url::parse(raw)
        .map_err(|e| ProviderError::new(format!("invalid pagination link '{raw}': {e}")))?;
    url.query_pairs()
        .find(|(k, _)| k == "page")
        .and_then(|(_, v)| v.parse().ok())
        .ok_or_else(|| ProviderError::new(format!("pagination link '{raw}' has no page number")))
}

/// One page of a list response
#[derive(Debug)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub links: Option<Links>,
}

/// Collect every page produced by `lister`, starting at page 1.
///
/// Stops at the first error; records are not deduplicated.
pub async fn list_all<T, F, Fut>(mut lister: F) -> ProviderResult<Vec<T>>
where
    F: FnMut(u32, u32) -> Fut,
    Fut: std::future::Future<Output = ProviderResult<Page<T>>>,
{
    let mut all = Vec::new();
    let mut page = FIRST_PAGE;
    loop {
        let Page { records, links } = lister(page, PER_PAGE).await?;
        all.extend(records);
        match links {
            Some(links) if !links.is_last_page() => page = links.current_page()? + 1,
            _ => return Ok(all),
        }
    }
}

impl ApiClient {
    /// Fetch one page of `path`, decoding the array stored under `key`
    pub async fn list_page<T: DeserializeOwned>(
        &self,
        path: &str,
        key: &str,
        params: &[(&str, String)],
        page: u32,
        per_page: u32,
    ) -> ProviderResult<Page<T>> {
        let mut query: Vec<(&str, String)> = params.to_vec();
        query.push(("page", page.to_string()));
        query.push(("per_page", per_page.to_string()));

        let mut body: serde_json::Value = self.get_with_params(path, &query).await?;
        let records = match body.get_mut(key).map(serde_json::Value::take) {
            Some(serde_json::Value::Null) | None => Vec::new(),
            Some(items) => serde_json::from_value(items).map_err(|e| {
                ProviderError::new(format!("failed to decode '{key}' from {path}: {e}"))
            })?,
        };
        let links = match body.get_mut("links").map(serde_json::Value::take) {
            Some(serde_json::Value::Null) | None => None,
            Some(links) => Some(serde_json::from_value(links).map_err(|e| {
                ProviderError::new(format!("failed to decode pagination links: {e}"))
            })?),
        };
        Ok(Page { records, links })
    }

    /// List every record of `path` across all pages
    pub async fn list<T: DeserializeOwned>(&self, path: &str, key: &str) -> ProviderResult<Vec<T>> {
        self.list_with_params(path, key, &[]).await
    }

    pub async fn list_with_params<T: DeserializeOwned>(
        &self,
        path: &str,
        key: &str,
        params: &[(&str, String)],
    ) -> ProviderResult<Vec<T>> {
        list_all(|page, per_page| self.list_page(path, key, params, page, per_page)).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn links(prev: &str, next: &str, last: &str) -> Links {
        Links {
            pages: Some(Pages {
                first: String::new(),
                prev: prev.to_string(),
                next: next.to_string(),
                last: last.to_string(),
            }),
        }
    }

    #[test]
    fn last_page_detection() {
        assert!(Links::default().is_last_page());
        assert!(links("https://api/v2/droplets?page=1", "", "").is_last_page());
        assert!(!links("", "https://api/v2/droplets?page=2", "https://api/v2/droplets?page=3").is_last_page());
    }

    #[test]
    fn current_page_from_prev_link() {
        assert_eq!(Links::default().current_page().unwrap(), 1);
        assert_eq!(
            links("", "https://api/v2/droplets?page=2", "https://api/v2/droplets?page=4")
                .current_page()
                .unwrap(),
            1
        );
        assert_eq!(
            links(
                "https://api/v2/droplets?page=2&per_page=200",
                "https://api/v2/droplets?page=4",
                "https://api/v2/droplets?page=4"
            )
            .current_page()
            .unwrap(),
            3
        );
        assert!(links("not a url", "", "x").current_page().is_err());
    }

    #[tokio::test]
    async fn list_all_walks_pages_in_order() {
        let requested = Mutex::new(Vec::new());
        let all = list_all(|page, per_page| {
            requested.lock().unwrap().push((page, per_page));
            async move {
                let (records, links) = match page {
                    1 => (vec![1, 2], Some(links("", "u?page=2", "https://x/y?page=3"))),
                    2 => (
                        vec![3, 4],
                        Some(links("https://x/y?page=1", "u?page=3", "https://x/y?page=3")),
                    ),
                    _ => (vec![5], Some(links("https://x/y?page=2", "", ""))),
                };
                Ok(Page { records, links })
            }
        })
        .await
        .unwrap();
        assert_eq!(all, vec![1, 2, 3, 4, 5]);
        assert_eq!(*requested.lock().unwrap(), vec![(1, 200), (2, 200), (3, 200)]);
    }

    #[tokio::test]
    async fn list_all_fails_fast() {
        let calls = Mutex::new(0);
        let result: ProviderResult<Vec<i32>> = list_all(|page, _| {
            *calls.lock().unwrap() += 1;
            async move {
                if page == 1 {
                    Ok(Page {
                        records: vec![1],
                        links: Some(links("", "u?page=2", "https://x/y?page=2")),
                    })
                } else {
                    Err(ProviderError::from_status(500, "boom"))
                }
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(*calls.lock().unwrap(), 2);
    }
}
