use std::fs;
use std::process::Command;

use anyhow::Result;
use camino::Utf8PathBuf;
use clap::Parser;
use vhostctl::ProjectContext;
use vhostctl::cli::{Cli, Commands, LogLevel};

#[test]
fn test_parse_create_defaults() -> Result<()> {
    let args = Cli::parse_from(["vhostctl", "create"]);

    match args.command {
        Commands::Create(opts) => {
            assert_eq!(opts.common.file, None);
            assert_eq!(opts.common.project_dir, None);
            assert_eq!(opts.common.log_level, LogLevel::Info);
            assert!(!opts.dry_run);
            assert!(!opts.yes);
            assert_eq!(opts.staging_path, "/tmp/vhost.conf");
            assert_eq!(opts.root, "/");
            assert_eq!(opts.lock_dir, "/run/lock");
            assert_eq!(opts.reload_timeout, 60);
        }
        _ => panic!("Expected Create command"),
    }

    Ok(())
}

#[test]
fn test_parse_create_with_flags() -> Result<()> {
    let args = Cli::parse_from([
        "vhostctl",
        "create",
        "-C",
        "/srv/shop",
        "--file",
        "vhost.yaml",
        "--dry-run",
        "-y",
        "--staging-path",
        "/run/user/1000/vhost.conf",
        "--lock-dir",
        "/run/user/1000",
        "--reload-timeout",
        "15",
        "--log-level",
        "debug",
    ]);

    match args.command {
        Commands::Create(opts) => {
            assert_eq!(opts.common.project_dir, Some(Utf8PathBuf::from("/srv/shop")));
            assert_eq!(opts.common.file, Some(Utf8PathBuf::from("vhost.yaml")));
            assert_eq!(opts.common.log_level, LogLevel::Debug);
            assert!(opts.dry_run);
            assert!(opts.yes);
            assert_eq!(opts.staging_path, "/run/user/1000/vhost.conf");
            assert_eq!(opts.lock_dir, "/run/user/1000");
            assert_eq!(opts.reload_timeout, 15);
        }
        _ => panic!("Expected Create command"),
    }

    Ok(())
}

#[test]
fn test_parse_render_and_validate() -> Result<()> {
    let args = Cli::parse_from(["vhostctl", "render", "--root", "/mnt/target"]);
    match args.command {
        Commands::Render(opts) => assert_eq!(opts.root, "/mnt/target"),
        _ => panic!("Expected Render command"),
    }

    let args = Cli::parse_from(["vhostctl", "validate", "-l", "warn"]);
    assert_eq!(args.command.log_level(), Some(LogLevel::Warn));

    let args = Cli::parse_from(["vhostctl", "completions", "bash"]);
    assert_eq!(args.command.log_level(), None);

    Ok(())
}

#[test]
fn test_invalid_log_level_rejected() {
    let result = Cli::try_parse_from(["vhostctl", "create", "--log-level", "loud"]);
    assert!(result.is_err());
}

#[test]
fn test_project_context_resolution() {
    let cwd = Utf8PathBuf::from("/home/dev");

    let args = Cli::parse_from(["vhostctl", "validate"]);
    let Commands::Validate(opts) = args.command else {
        panic!("Expected Validate command");
    };
    let project = ProjectContext::resolve_from(&opts.common, &cwd);
    assert_eq!(project.dir, "/home/dev");
    assert_eq!(project.settings_path, "/home/dev/config/packages/castor.yaml");
    assert_eq!(project.basename(), "dev");

    let args = Cli::parse_from(["vhostctl", "validate", "-C", "shop", "-f", "/etc/vhost.yaml"]);
    let Commands::Validate(opts) = args.command else {
        panic!("Expected Validate command");
    };
    let project = ProjectContext::resolve_from(&opts.common, &cwd);
    assert_eq!(project.dir, "/home/dev/shop");
    assert_eq!(project.settings_path, "/etc/vhost.yaml");
    assert_eq!(project.basename(), "shop");
}

fn project_with_settings(yaml: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let config_dir = dir.path().join("shop/config/packages");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("castor.yaml"), yaml).unwrap();
    dir
}

#[test]
fn test_render_prints_document() -> Result<()> {
    let dir = project_with_settings("castor.vhost:\n  server: nginx\n");

    let output = Command::new(env!("CARGO_BIN_EXE_vhostctl"))
        .args(["render", "--log-level", "error", "-C"])
        .arg(dir.path().join("shop"))
        .output()?;

    assert!(output.status.success(), "render failed: {:?}", output);
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.starts_with("server {"));
    assert!(stdout.contains("server_name shop.test;"));

    Ok(())
}

#[test]
fn test_validate_reports_unsupported_server() -> Result<()> {
    let dir = project_with_settings("castor.vhost:\n  server: caddy\n");

    let output = Command::new(env!("CARGO_BIN_EXE_vhostctl"))
        .args(["validate", "-C"])
        .arg(dir.path().join("shop"))
        .output()?;

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("unsupported web server"), "stderr: {}", stderr);

    Ok(())
}

/// Lays out a host root with an existing nginx vhost and a `sudo` stand-in
/// that runs its command without asking for a password.
fn host_with_existing_vhost(dir: &std::path::Path) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let conf_dir = dir.join("sysroot/etc/nginx/conf.d");
    fs::create_dir_all(&conf_dir).unwrap();
    fs::write(conf_dir.join("demo.local.conf"), "# keep me\n").unwrap();
    fs::create_dir_all(dir.join("tmp")).unwrap();
    fs::create_dir_all(dir.join("lock")).unwrap();

    let bin = dir.join("bin");
    fs::create_dir_all(&bin).unwrap();
    let sudo = bin.join("sudo");
    fs::write(&sudo, "#!/bin/sh\n[ \"$1\" = \"-n\" ] && shift\nexec \"$@\"\n").unwrap();
    fs::set_permissions(&sudo, fs::Permissions::from_mode(0o755)).unwrap();
    bin
}

#[test]
fn test_create_declined_overwrite_exits_with_cancel_status() -> Result<()> {
    let dir = project_with_settings("castor.vhost:\n  url: local\n  nom: demo\n  server: nginx\n");
    let bin = host_with_existing_vhost(dir.path());
    let path = format!("{}:{}", bin.display(), std::env::var("PATH").unwrap_or_default());

    // stderr is piped, so the run is unattended and the overwrite is declined.
    let output = Command::new(env!("CARGO_BIN_EXE_vhostctl"))
        .env("PATH", path)
        .args(["create", "--log-level", "error", "-C"])
        .arg(dir.path().join("shop"))
        .arg("--root")
        .arg(dir.path().join("sysroot"))
        .arg("--staging-path")
        .arg(dir.path().join("tmp/vhost.conf"))
        .arg("--lock-dir")
        .arg(dir.path().join("lock"))
        .output()?;

    assert_eq!(output.status.code(), Some(2), "output: {:?}", output);
    assert_eq!(
        fs::read_to_string(dir.path().join("sysroot/etc/nginx/conf.d/demo.local.conf"))?,
        "# keep me\n"
    );
    assert!(!dir.path().join("tmp/vhost.conf").exists());

    Ok(())
}

#[test]
fn test_create_without_settings_exits_with_failure() -> Result<()> {
    let dir = tempfile::tempdir()?;

    let output = Command::new(env!("CARGO_BIN_EXE_vhostctl"))
        .args(["create", "-C"])
        .arg(dir.path())
        .output()?;

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("configuration file not found"), "stderr: {}", stderr);

    Ok(())
}
