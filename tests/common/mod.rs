//! Shared fixtures for CLI integration tests.
//!
//! Every test runs the real binary against throwaway cache/data roots,
//! with the release host pointed at an unroutable address and core
//! updates disabled so no test ever touches the network or spawns a
//! background updater.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;

pub struct TestEnv {
    root: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            root: TempDir::new().expect("failed to create test dir"),
        }
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.path().join("cache")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.path().join("data")
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.data_dir().join("plugins")
    }

    /// The spoke binary wired to this environment.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::cargo_bin("spoke").expect("binary builds");
        cmd.env("SPOKE_CACHE_DIR", self.cache_dir())
            .env("SPOKE_DATA_DIR", self.data_dir())
            .env("SPOKE_HOST", "http://127.0.0.1:9")
            .env("SPOKE_SKIP_CORE_UPDATES", "1")
            .env("SPOKE_NO_PROGRESS", "1")
            .env("CLI_ENGINE_HIDE_UPDATED_MESSAGE", "1");
        cmd
    }

    /// Install a plugin into the user plugins directory without a package
    /// manager: writes the dependency entry, the module's package.json,
    /// and an executable entrypoint that echoes its invocation.
    pub fn install_fake_plugin(&self, name: &str, version: &str) {
        let plugins = self.plugins_dir();
        std::fs::create_dir_all(&plugins).unwrap();
        std::fs::write(
            plugins.join("package.json"),
            serde_json::to_string_pretty(&serde_json::json!({
                "private": true,
                "dependencies": { name: version }
            }))
            .unwrap(),
        )
        .unwrap();

        let root = plugins.join("node_modules").join(name);
        write_plugin_package(&root, name, version);
    }

    pub fn remove_fake_plugin(&self, name: &str) {
        let plugins = self.plugins_dir();
        std::fs::write(
            plugins.join("package.json"),
            "{\n  \"private\": true\n}\n",
        )
        .unwrap();
        let _ = std::fs::remove_dir_all(plugins.join("node_modules").join(name));
        let _ = std::fs::remove_file(plugins.join("plugins.json"));
    }
}

/// Write a plugin package: metadata plus a shell entrypoint printing
/// "<name> ran <argv...>".
pub fn write_plugin_package(root: &Path, name: &str, version: &str) {
    std::fs::create_dir_all(root.join("bin")).unwrap();
    let package = serde_json::json!({
        "name": name,
        "version": version,
        "spoke": {
            "topics": [{ "name": name, "description": format!("{name} commands") }],
            "commands": [{
                "id": format!("{name}:hello"),
                "description": "say hello",
                "usage": format!("{name}:hello [ARGS]")
            }]
        }
    });
    std::fs::write(
        root.join("package.json"),
        serde_json::to_string_pretty(&package).unwrap(),
    )
    .unwrap();

    let entrypoint = root.join("bin/run");
    std::fs::write(&entrypoint, "#!/bin/sh\necho \"$(basename \"$0\") ran $*\"\n").unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(&entrypoint).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&entrypoint, perms).unwrap();
    }
}
