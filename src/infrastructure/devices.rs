//! GPU device resolution.
//!
//! Sheep configs list devices either as bare indices (`"1"`) or as device
//! paths (`"/dev/nvidia1"`). The parent process may already restrict the
//! visible devices; the effective set is then the intersection.

use crate::domain::errors::{ShepherdError, ShepherdResult};

pub const CUDA_VISIBLE_DEVICES: &str = "CUDA_VISIBLE_DEVICES";
pub const NVIDIA_VISIBLE_DEVICES: &str = "NVIDIA_VISIBLE_DEVICES";

const NVIDIA_DEVICE_PREFIX: &str = "/dev/nvidia";

/// Parse a configured device into its GPU index.
pub fn parse_device_index(device: &str) -> ShepherdResult<u32> {
    let trimmed = device.trim();
    let digits = trimmed.strip_prefix(NVIDIA_DEVICE_PREFIX).unwrap_or(trimmed);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ShepherdError::configuration(format!(
            "Cannot resolve device '{device}' to a GPU index"
        )));
    }
    digits
        .parse()
        .map_err(|_| ShepherdError::configuration(format!("GPU index out of range: '{device}'")))
}

/// The externally imposed device restriction, if any.
///
/// `CUDA_VISIBLE_DEVICES` takes precedence over `NVIDIA_VISIBLE_DEVICES`;
/// `NVIDIA_VISIBLE_DEVICES=all` is no restriction at all.
pub fn restricted_devices_from_env() -> Option<Vec<String>> {
    if let Ok(value) = std::env::var(CUDA_VISIBLE_DEVICES) {
        return Some(split_device_list(&value));
    }
    match std::env::var(NVIDIA_VISIBLE_DEVICES) {
        Ok(value) if value.trim() == "all" => None,
        Ok(value) => Some(split_device_list(&value)),
        Err(_) => None,
    }
}

fn split_device_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Resolve configured devices against an optional restriction.
///
/// Unparsable devices are a configuration error. An empty intersection is
/// not: the runner then simply gets no GPU.
pub fn resolve_devices(devices: &[String], restricted: Option<&[String]>) -> ShepherdResult<Vec<u32>> {
    let mut indices = Vec::with_capacity(devices.len());
    for device in devices {
        let index = parse_device_index(device)?;
        if !indices.contains(&index) {
            indices.push(index);
        }
    }

    if let Some(allowed) = restricted {
        indices.retain(|index| allowed.iter().any(|a| a == &index.to_string()));
    }

    Ok(indices)
}

/// Render indices as a visible-devices environment value.
pub fn visible_devices_value(indices: &[u32]) -> String {
    indices
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Number of GPUs usable by this process.
pub fn n_available_gpus() -> usize {
    if let Some(restricted) = restricted_devices_from_env() {
        return restricted.len();
    }
    std::fs::read_dir("/dev")
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|entry| {
                    let name = entry.file_name();
                    let name = name.to_string_lossy();
                    name.strip_prefix("nvidia")
                        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
                })
                .count()
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_parse_device_index() {
        assert_eq!(parse_device_index("0").unwrap(), 0);
        assert_eq!(parse_device_index("/dev/nvidia3").unwrap(), 3);
        assert!(parse_device_index("/dev/nvidiactl").is_err());
        assert!(parse_device_index("/dev/sda").is_err());
        assert!(parse_device_index("").is_err());
        assert!(parse_device_index("gpu0").unwrap_err().is_configuration());
    }

    #[test]
    fn test_resolve_without_restriction() {
        let devices = strings(&["/dev/nvidia0", "2", "/dev/nvidia2"]);
        assert_eq!(resolve_devices(&devices, None).unwrap(), vec![0, 2]);
    }

    #[test]
    fn test_resolve_with_restriction() {
        let devices = strings(&["0", "1", "3"]);
        let allowed = strings(&["1", "3"]);
        assert_eq!(resolve_devices(&devices, Some(&allowed)).unwrap(), vec![1, 3]);
    }

    #[test]
    fn test_resolve_empty_intersection_is_not_an_error() {
        let devices = strings(&["0"]);
        let allowed: Vec<String> = Vec::new();
        assert!(resolve_devices(&devices, Some(&allowed)).unwrap().is_empty());
    }

    #[test]
    fn test_resolve_invalid_device_fails() {
        let devices = strings(&["0", "/dev/bogus"]);
        assert!(resolve_devices(&devices, None).unwrap_err().is_configuration());
    }

    #[test]
    fn test_visible_devices_value() {
        assert_eq!(visible_devices_value(&[0, 3]), "0,3");
        assert_eq!(visible_devices_value(&[]), "");
    }

    #[test]
    fn test_n_available_gpus_respects_env() {
        temp_env::with_vars(
            [(NVIDIA_VISIBLE_DEVICES, Some("0,3")), (CUDA_VISIBLE_DEVICES, None)],
            || assert_eq!(n_available_gpus(), 2),
        );
        temp_env::with_vars(
            [(NVIDIA_VISIBLE_DEVICES, None::<&str>), (CUDA_VISIBLE_DEVICES, Some("1"))],
            || assert_eq!(n_available_gpus(), 1),
        );
        temp_env::with_vars(
            [(NVIDIA_VISIBLE_DEVICES, Some("0,3")), (CUDA_VISIBLE_DEVICES, Some(""))],
            || assert_eq!(n_available_gpus(), 0),
        );
    }

    #[test]
    fn test_restricted_devices_all_means_unrestricted() {
        temp_env::with_vars(
            [(NVIDIA_VISIBLE_DEVICES, Some("all")), (CUDA_VISIBLE_DEVICES, None)],
            || assert!(restricted_devices_from_env().is_none()),
        );
    }

    proptest! {
        #[test]
        fn resolved_devices_stay_within_restriction(
            configured in proptest::collection::vec(0u32..16, 0..8),
            allowed in proptest::collection::vec(0u32..16, 0..8),
        ) {
            let devices: Vec<String> = configured.iter().map(|i| format!("/dev/nvidia{i}")).collect();
            let allowed: Vec<String> = allowed.iter().map(ToString::to_string).collect();

            let resolved = resolve_devices(&devices, Some(&allowed)).unwrap();
            for index in &resolved {
                prop_assert!(configured.contains(index));
                prop_assert!(allowed.contains(&index.to_string()));
            }
        }
    }
}
