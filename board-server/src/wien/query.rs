//! Monitor endpoint queries.

use reqwest::Url;

use crate::bus::safe_topic_fragment;

use super::client::WienConfig;
use super::error::WienError;

/// One request against the monitor endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WienQuery {
    /// Topic-safe identity of the queried source: the stop id, or
    /// `diva_<id>` for a DIVA query.
    pub source_id: String,
    pub url: Url,
}

/// One query per configured stop id, then one per DIVA id.
///
/// Every query carries the configured `activateTrafficInfo` values and the
/// `sender`.
pub fn build_queries(config: &WienConfig) -> Result<Vec<WienQuery>, WienError> {
    let stops = config
        .stop_ids
        .iter()
        .map(|id| ("stopId", id.as_str(), safe_topic_fragment(id)));
    let divas = config
        .diva_ids
        .iter()
        .map(|id| ("diva", id.as_str(), safe_topic_fragment(&format!("diva_{id}"))));

    stops
        .chain(divas)
        .map(|(key, id, source_id)| -> Result<WienQuery, WienError> {
            let mut params: Vec<(&str, &str)> = vec![(key, id)];
            params.extend(
                config
                    .activate_info
                    .iter()
                    .map(|info| ("activateTrafficInfo", info.as_str())),
            );
            params.push(("sender", config.sender.as_str()));

            let url = Url::parse_with_params(&config.base_url, &params).map_err(|e| {
                WienError::InvalidUrl {
                    url: config.base_url.clone(),
                    message: e.to_string(),
                }
            })?;

            Ok(WienQuery { source_id, url })
        })
        .collect()
}
