//! Host facts reported by the status endpoint.

/// Lower-case name of the running operating system (`linux`, `macos`, `windows`, ...).
pub fn platform_name() -> &'static str {
    std::env::consts::OS
}

/// Hostname of the machine the agent runs on.
///
/// Falls back to `"unknown"` when the name cannot be read or is not valid UTF-8.
pub fn hostname() -> String {
    #[cfg(unix)]
    {
        nix::unistd::gethostname()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string())
    }

    #[cfg(not(unix))]
    {
        std::env::var("COMPUTERNAME").unwrap_or_else(|_| "unknown".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_name_is_lowercase() {
        let name = platform_name();
        assert!(!name.is_empty());
        assert_eq!(name, name.to_lowercase());
    }

    #[test]
    fn hostname_is_not_empty() {
        assert!(!hostname().is_empty());
    }
}
