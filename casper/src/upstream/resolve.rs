use displaydoc::Display;
use thiserror::Error;

use crate::config::{envoy::EnvoyClientConfig, global::GlobalConfig, smartstack::SmartstackRegistry};

#[derive(Debug, Error, Display)]
pub enum ResolveError {
    /// no SmartStack instance registered for destination `{0}`
    NoSmartstackInstance(String),
    /// casper.route-through-envoy is set but no Envoy client config is loaded
    EnvoyConfigMissing,
}

/// Where a request should actually be sent, and any header the chosen
/// route requires (`spec.md` §6 "Outbound HTTP").
pub struct ResolvedUpstream {
    pub absolute_uri: String,
    pub svc_header: Option<String>,
}

pub fn resolve(
    destination: &str,
    request_uri: &str,
    global: &GlobalConfig,
    smartstack: &SmartstackRegistry,
    envoy: Option<&EnvoyClientConfig>,
) -> Result<ResolvedUpstream, ResolveError> {
    if global.casper.route_through_envoy {
        let envoy = envoy.ok_or(ResolveError::EnvoyConfigMissing)?;
        let base = envoy.url.as_str().trim_end_matches('/');
        return Ok(ResolvedUpstream {
            absolute_uri: format!("{base}{request_uri}"),
            svc_header: Some(destination.to_string()),
        });
    }

    let instance = smartstack
        .lookup(destination)
        .ok_or_else(|| ResolveError::NoSmartstackInstance(destination.to_string()))?;
    Ok(ResolvedUpstream {
        absolute_uri: format!("http://{}:{}{}", instance.host, instance.port, request_uri),
        svc_header: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::smartstack::SmartstackInstance;
    use std::collections::HashMap;

    #[test]
    fn resolves_via_smartstack_by_default() {
        let mut map = HashMap::new();
        map.insert(
            "biz.main".to_string(),
            vec![SmartstackInstance {
                host: "10.0.0.1".to_string(),
                port: 20001,
            }],
        );
        let smartstack = SmartstackRegistry::from(map);
        let resolved = resolve(
            "biz.main",
            "/biz/yelp-sf",
            &GlobalConfig::default(),
            &smartstack,
            None,
        )
        .unwrap();
        assert_eq!(resolved.absolute_uri, "http://10.0.0.1:20001/biz/yelp-sf");
        assert!(resolved.svc_header.is_none());
    }

    #[test]
    fn missing_instance_errors() {
        let smartstack = SmartstackRegistry::from(HashMap::new());
        let result = resolve(
            "biz.main",
            "/biz/yelp-sf",
            &GlobalConfig::default(),
            &smartstack,
            None,
        );
        assert!(result.is_err());
    }
}
