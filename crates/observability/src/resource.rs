use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::resource::{HOST_NAME, SERVICE_VERSION};

use crate::config::SignalConfig;

pub const VCS_REVISION: &str = "vcs.revision";
pub const VCS_DIRTY: &str = "vcs.dirty";

/// Resource shared by every provider of this process.
pub fn build_resource(config: &SignalConfig) -> Resource {
    let mut attributes = vec![KeyValue::new(
        SERVICE_VERSION,
        config.service_version.clone(),
    )];
    if !config.git_sha.is_empty() {
        attributes.push(KeyValue::new(VCS_REVISION, config.git_sha.clone()));
    }
    if !config.git_dirty.is_empty() {
        attributes.push(KeyValue::new(VCS_DIRTY, config.git_dirty.clone()));
    }
    if let Some(host) = hostname::get().ok().and_then(|h| h.into_string().ok()) {
        attributes.push(KeyValue::new(HOST_NAME, host));
    }

    Resource::builder()
        .with_service_name(config.service_name.clone())
        .with_attributes(attributes)
        .build()
}
