use aws_config::{BehaviorVersion, SdkConfig};

/// Resolve AWS region and credentials from the standard provider chain
/// (environment, profile, container or instance metadata).
pub async fn load_aws_config() -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest()).load().await
}
