use std::collections::HashSet;

use url::Url;

use crate::config::NormalizeConfig;
use crate::Result;

/// Canonicalizes article URLs so the same article always yields the same
/// dedup key.
///
/// - scheme and host are lowercased and default ports dropped (done by `url`)
/// - the fragment is removed
/// - tracking query parameters are removed; remaining parameters keep their order
/// - trailing slashes are stripped from the path (the root path stays `/`)
#[derive(Debug, Clone)]
pub struct UrlNormalizer {
    exact: HashSet<String>,
    prefixes: Vec<String>,
}

impl Default for UrlNormalizer {
    fn default() -> Self {
        Self::new(&NormalizeConfig::default())
    }
}

impl UrlNormalizer {
    pub fn new(config: &NormalizeConfig) -> Self {
        Self {
            exact: config
                .tracking_params
                .iter()
                .map(|p| p.to_ascii_lowercase())
                .collect(),
            prefixes: config
                .tracking_param_prefixes
                .iter()
                .map(|p| p.to_ascii_lowercase())
                .collect(),
        }
    }

    fn is_tracking(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        self.exact.contains(&name) || self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }

    pub fn normalize(&self, url: &Url) -> String {
        let mut url = url.clone();
        url.set_fragment(None);

        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(name, _)| !self.is_tracking(name))
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();
        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }

        let path = url.path();
        if path.len() > 1 && path.ends_with('/') {
            let trimmed = path.trim_end_matches('/');
            let trimmed = if trimmed.is_empty() { "/" } else { trimmed }.to_string();
            url.set_path(&trimmed);
        }

        url.to_string()
    }

    pub fn normalize_str(&self, url: &str) -> Result<String> {
        Ok(self.normalize(&Url::parse(url)?))
    }
}
