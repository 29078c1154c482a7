//! Integration tests for the plugin catalog: an installed plugin's topic
//! and commands appear in help, dispatch runs its entrypoint, and
//! uninstalling removes it from the catalog on the next init.

mod common;

use common::TestEnv;
use predicates::prelude::*;

#[cfg(unix)]
#[test]
fn installed_plugin_appears_in_help_and_dispatches() {
    let env = TestEnv::new();
    env.install_fake_plugin("my-plugin", "1.0.0");

    // The plugin's topic shows up in the root overview.
    env.command()
        .arg("help")
        .assert()
        .success()
        .stdout(predicate::str::contains("my-plugin"));

    // Topic help lists the plugin's command.
    env.command()
        .args(["help", "my-plugin"])
        .assert()
        .success()
        .stdout(predicate::str::contains("my-plugin:hello"))
        .stdout(predicate::str::contains("say hello"));

    // Dispatch resolves the command and runs the entrypoint with the
    // command ID and remaining argv.
    env.command()
        .args(["my-plugin:hello", "world"])
        .assert()
        .success()
        .stdout(predicate::str::contains("run ran my-plugin:hello world"));
}

#[cfg(unix)]
#[test]
fn plugin_metadata_is_cached_for_dispatch() {
    let env = TestEnv::new();
    env.install_fake_plugin("my-plugin", "1.0.0");

    // First invocation derives and persists the manifest cache.
    env.command().arg("help").assert().success();
    let cache_raw =
        std::fs::read_to_string(env.plugins_dir().join("plugins.json")).unwrap();
    assert!(cache_raw.contains("my-plugin:hello"));

    // The listing shows name and version from the cache.
    env.command()
        .arg("plugins")
        .assert()
        .success()
        .stdout(predicate::str::contains("my-plugin 1.0.0"));
}

#[cfg(unix)]
#[test]
fn uninstalled_plugin_leaves_the_catalog_on_next_init() {
    let env = TestEnv::new();
    env.install_fake_plugin("my-plugin", "1.0.0");
    env.command().arg("help").assert().success();

    env.remove_fake_plugin("my-plugin");

    env.command()
        .args(["help", "my-plugin"])
        .assert()
        .code(127)
        .stderr(predicate::str::contains("is not a spoke command"));

    env.command()
        .arg("my-plugin:hello")
        .assert()
        .code(127);
}

#[cfg(unix)]
#[test]
fn broken_plugin_is_skipped_without_breaking_the_cli() {
    let env = TestEnv::new();
    env.install_fake_plugin("my-plugin", "1.0.0");

    // Corrupt the module's package.json; init must warn and continue.
    std::fs::write(
        env.plugins_dir()
            .join("node_modules/my-plugin/package.json"),
        "not json at all",
    )
    .unwrap();

    env.command()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("spoke/"));
}
