use serde::Deserialize;
use url::Url;

/// `<ENVOY_CONFIGS_PATH>/envoy_client.yaml` (`spec.md` §6). Only
/// consulted when `casper.route_through_envoy` is set.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct EnvoyClientConfig {
    pub url: Url,
}
