use std::path::Path;
use std::process::Command;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use crate::changelog::ChangelogParser;
use crate::cli::ManifestArgs;
use crate::model::VersionManifest;
use crate::util::{now_utc_string, write_json_pretty};

pub fn run(args: ManifestArgs) -> Result<()> {
    let manifest = build_manifest(&args)?;

    info!(
        version = %manifest.version,
        build_time = %manifest.build_time,
        backend_version = manifest.backend_version.as_deref().unwrap_or("-"),
        "built version manifest"
    );

    if args.dry_run {
        info!("manifest dry-run complete");
        return Ok(());
    }

    write_json_pretty(&args.output, &manifest)?;
    info!(path = %args.output.display(), "wrote version manifest");

    Ok(())
}

pub fn build_manifest(args: &ManifestArgs) -> Result<VersionManifest> {
    let suffix = match git_short_hash(&args.repo_dir) {
        Some(hash) => hash,
        None => {
            warn!(repo = %args.repo_dir.display(), "git commit unavailable, using timestamp suffix");
            Utc::now().timestamp().to_string()
        }
    };

    let backend_version = match args.changelog.as_deref() {
        Some(path) => {
            let changelog = ChangelogParser::with_link_host(&args.link_host)?.parse_file(path)?;
            changelog
                .latest_release()
                .map(|release| release.version.clone())
        }
        None => None,
    };

    Ok(VersionManifest {
        version: compose_version(&args.base_version, &suffix),
        build_time: now_utc_string(),
        backend_version,
    })
}

fn compose_version(base_version: &str, suffix: &str) -> String {
    let base = base_version.trim();
    if suffix.is_empty() {
        return base.to_string();
    }
    format!("{base}-{suffix}")
}

fn git_short_hash(repo_dir: &Path) -> Option<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo_dir)
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToOwned::to_owned)
}
