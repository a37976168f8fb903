//! Command: print version information.

/// Version string: `BLUEPRINT_VERSION` at build time, else the crate version.
#[must_use]
pub fn version() -> &'static str {
    option_env!("BLUEPRINT_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"))
}

/// Print the version to stdout.
#[allow(clippy::print_stdout)]
pub fn run() {
    println!("blueprint {}", version());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
