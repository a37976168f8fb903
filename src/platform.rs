//! Operating system and package manager detection.
use std::fmt;
use std::str::FromStr;

/// Detected operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    /// macOS.
    Mac,
    /// Any Linux distribution.
    Linux,
}

impl Os {
    /// Name used in `on:` clauses and as the status scope key.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Mac => "mac",
            Self::Linux => "linux",
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Os {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_os_name(s).as_str() {
            "mac" => Ok(Self::Mac),
            "linux" => Ok(Self::Linux),
            other => Err(format!("unsupported OS '{other}' (expected mac or linux)")),
        }
    }
}

/// Lower-case an OS name and fold common aliases onto the canonical names.
#[must_use]
pub fn normalize_os_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    match lower.as_str() {
        "macos" | "darwin" | "osx" => "mac".to_string(),
        _ => lower,
    }
}

/// System package manager used by the `install` kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    /// Homebrew.
    Brew,
    /// Debian and Ubuntu `apt-get`.
    Apt,
    /// Fedora `dnf`.
    Dnf,
    /// Arch `pacman`.
    Pacman,
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Brew => write!(f, "brew"),
            Self::Apt => write!(f, "apt-get"),
            Self::Dnf => write!(f, "dnf"),
            Self::Pacman => write!(f, "pacman"),
        }
    }
}

/// Platform information for the current system.
#[derive(Debug, Clone)]
pub struct Platform {
    /// Operating system family.
    pub os: Os,
    /// Package manager found on this system, if any.
    pub package_manager: Option<PackageManager>,
}

impl Platform {
    /// Detect the current platform.
    #[must_use]
    pub fn detect() -> Self {
        let os = Self::detect_os();
        Self {
            os,
            package_manager: Self::detect_package_manager(os),
        }
    }

    /// Create a platform with explicit values.
    #[must_use]
    pub const fn new(os: Os, package_manager: Option<PackageManager>) -> Self {
        Self {
            os,
            package_manager,
        }
    }

    /// Replace the detected OS, re-deriving the package manager for it.
    #[must_use]
    pub fn with_os(self, os: Os) -> Self {
        if os == self.os {
            return self;
        }
        Self {
            os,
            package_manager: Self::detect_package_manager(os),
        }
    }

    /// Running on macOS.
    #[must_use]
    pub fn is_mac(&self) -> bool {
        self.os == Os::Mac
    }

    /// Running on Linux.
    #[must_use]
    pub fn is_linux(&self) -> bool {
        self.os == Os::Linux
    }

    /// Whether a rule restricted to `os_list` applies here. An empty list
    /// means every OS.
    #[must_use]
    pub fn applies_to(&self, os_list: &[String]) -> bool {
        os_list.is_empty() || os_list.iter().any(|o| normalize_os_name(o) == self.os.name())
    }

    fn detect_os() -> Os {
        if cfg!(target_os = "macos") {
            Os::Mac
        } else {
            // Other Unix-like systems are provisioned like Linux
            Os::Linux
        }
    }

    fn detect_package_manager(os: Os) -> Option<PackageManager> {
        match os {
            Os::Mac => Some(PackageManager::Brew),
            Os::Linux => [
                ("/usr/bin/apt-get", PackageManager::Apt),
                ("/usr/bin/dnf", PackageManager::Dnf),
                ("/usr/bin/pacman", PackageManager::Pacman),
            ]
            .into_iter()
            .find(|(bin, _)| std::path::Path::new(bin).exists())
            .map(|(_, pm)| pm),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_display() {
        assert_eq!(Os::Mac.to_string(), "mac");
        assert_eq!(Os::Linux.to_string(), "linux");
    }

    #[test]
    fn os_parses_aliases() {
        assert_eq!("macOS".parse::<Os>(), Ok(Os::Mac));
        assert_eq!("darwin".parse::<Os>(), Ok(Os::Mac));
        assert_eq!("Linux".parse::<Os>(), Ok(Os::Linux));
        assert!("windows".parse::<Os>().is_err());
    }

    #[test]
    fn applies_to_empty_list_means_all() {
        let p = Platform::new(Os::Linux, Some(PackageManager::Apt));
        assert!(p.applies_to(&[]));
    }

    #[test]
    fn applies_to_matches_normalized_names() {
        let p = Platform::new(Os::Mac, Some(PackageManager::Brew));
        assert!(p.applies_to(&["linux".to_string(), "macos".to_string()]));
        assert!(!p.applies_to(&["linux".to_string()]));
    }

    #[test]
    fn mac_always_uses_brew() {
        let p = Platform::new(Os::Linux, None).with_os(Os::Mac);
        assert!(p.is_mac());
        assert_eq!(p.package_manager, Some(PackageManager::Brew));
    }

    #[test]
    fn with_same_os_keeps_package_manager() {
        let p = Platform::new(Os::Linux, Some(PackageManager::Dnf)).with_os(Os::Linux);
        assert_eq!(p.package_manager, Some(PackageManager::Dnf));
    }

    #[test]
    fn package_manager_display() {
        assert_eq!(PackageManager::Apt.to_string(), "apt-get");
        assert_eq!(PackageManager::Brew.to_string(), "brew");
    }
}
