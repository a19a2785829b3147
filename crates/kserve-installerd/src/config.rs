//! Daemon settings, from flags or `KSERVE_INSTALLER_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use kserve_installer_core::{
    BackoffPolicy, BundleCatalog, ControllerConfig, EngineConfig, DEFAULT_FIELD_MANAGER,
};

#[derive(Debug, Clone, Args)]
pub struct InstallerArgs {
    /// Watch descriptors in this namespace only (default: all namespaces)
    #[arg(long, global = true, env = "KSERVE_INSTALLER_NAMESPACE")]
    pub namespace: Option<String>,

    /// Field manager that owns every applied field
    #[arg(long, global = true, env = "KSERVE_INSTALLER_FIELD_MANAGER", default_value = DEFAULT_FIELD_MANAGER)]
    pub field_manager: String,

    /// Read bundles from this directory instead of the embedded copies
    #[arg(long, global = true, env = "KSERVE_INSTALLER_MANIFEST_DIR")]
    pub manifest_dir: Option<PathBuf>,

    /// Re-run a pass for every descriptor after this many seconds
    #[arg(
        long,
        global = true,
        env = "KSERVE_INSTALLER_RESYNC_INTERVAL_SECS",
        default_value_t = 36_000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub resync_interval_secs: u64,

    /// Abandon a pass that runs longer than this many seconds
    #[arg(
        long,
        global = true,
        env = "KSERVE_INSTALLER_PASS_TIMEOUT_SECS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub pass_timeout_secs: Option<u64>,

    /// First retry delay after a failed pass, in milliseconds
    #[arg(
        long,
        global = true,
        env = "KSERVE_INSTALLER_BACKOFF_BASE_MS",
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub backoff_base_ms: u64,

    /// Longest retry delay, in seconds
    #[arg(
        long,
        global = true,
        env = "KSERVE_INSTALLER_BACKOFF_MAX_SECS",
        default_value_t = 1000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub backoff_max_secs: u64,
}

impl InstallerArgs {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            field_manager: self.field_manager.clone(),
            pass_timeout: self.pass_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            resync_interval: Duration::from_secs(self.resync_interval_secs),
            backoff: BackoffPolicy {
                base: Duration::from_millis(self.backoff_base_ms),
                max: Duration::from_secs(self.backoff_max_secs),
            },
        }
    }

    pub fn catalog(&self) -> BundleCatalog {
        match &self.manifest_dir {
            Some(dir) => BundleCatalog::from_dir(dir),
            None => BundleCatalog::embedded(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use kserve_installer_core::DEFAULT_BUNDLE_ORDER;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: InstallerArgs,
    }

    fn parse(argv: &[&str]) -> InstallerArgs {
        let mut full = vec!["kserve-installerd"];
        full.extend_from_slice(argv);
        TestCli::try_parse_from(full).expect("parse").args
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        let engine = args.engine_config();
        assert_eq!(engine.field_manager, "kserve-installer");
        assert_eq!(engine.pass_timeout, None);

        let controller = args.controller_config();
        assert_eq!(controller, ControllerConfig::default());
    }

    #[test]
    fn test_overrides() {
        let args = parse(&[
            "--namespace",
            "kserve",
            "--field-manager",
            "ops",
            "--pass-timeout-secs",
            "30",
            "--backoff-base-ms",
            "100",
            "--backoff-max-secs",
            "60",
        ]);
        assert_eq!(args.namespace.as_deref(), Some("kserve"));
        assert_eq!(args.engine_config().field_manager, "ops");
        assert_eq!(
            args.engine_config().pass_timeout,
            Some(Duration::from_secs(30))
        );
        let backoff = args.controller_config().backoff;
        assert_eq!(backoff.base, Duration::from_millis(100));
        assert_eq!(backoff.max, Duration::from_secs(60));
    }

    #[test]
    fn test_catalog_embedded_by_default() {
        let args = parse(&[]);
        assert_eq!(args.catalog().names(), DEFAULT_BUNDLE_ORDER.to_vec());
    }

    #[test]
    fn test_catalog_from_manifest_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let args = parse(&["--manifest-dir", dir.path().to_str().expect("utf8 path")]);
        let catalog = args.catalog();
        assert_eq!(catalog.len(), DEFAULT_BUNDLE_ORDER.len());
    }

    #[test]
    fn test_rejects_zero_durations() {
        for flag in [
            "--resync-interval-secs",
            "--pass-timeout-secs",
            "--backoff-base-ms",
            "--backoff-max-secs",
        ] {
            let result = TestCli::try_parse_from(["kserve-installerd", flag, "0"]);
            assert!(result.is_err(), "{flag} 0 should be rejected");
        }
    }

    #[test]
    fn test_rejects_non_numeric_timeout() {
        let result = TestCli::try_parse_from(["kserve-installerd", "--pass-timeout-secs", "soon"]);
        assert!(result.is_err());
    }
}
