use common::api::DeployRequest;

use crate::error::{ConductorError, ConductorResult};

pub const MAX_NAME_LEN: usize = 63;
pub const NAME_PATTERN: &str = "[a-z]([-a-z0-9]*[a-z0-9])?";

/// Instance names must be DNS labels: `^[a-z]([-a-z0-9]*[a-z0-9])?$`, at most
/// 63 characters.
pub fn is_valid_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
        return false;
    };
    bytes.len() <= MAX_NAME_LEN
        && first.is_ascii_lowercase()
        && (last.is_ascii_lowercase() || last.is_ascii_digit())
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
}

pub fn validate_deploy_request(network_id: &str, request: &DeployRequest) -> ConductorResult<()> {
    if network_id.trim().is_empty() {
        return Err(ConductorError::validation("missing network id"));
    }
    if request.descriptor_id.trim().is_empty() || request.name.is_empty() {
        return Err(ConductorError::validation("missing application required fields")
            .with_param(network_id));
    }
    if request.name.len() > MAX_NAME_LEN {
        return Err(ConductorError::validation(format!(
            "application name must be at most {MAX_NAME_LEN} characters"
        ))
        .with_param(request.name.clone()));
    }
    if !is_valid_name(&request.name) {
        return Err(ConductorError::validation(format!(
            "application name must conform to {NAME_PATTERN}"
        ))
        .with_param(request.name.clone()));
    }
    Ok(())
}
