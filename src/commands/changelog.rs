use anyhow::Result;
use tracing::info;

use crate::changelog::ChangelogParser;
use crate::cli::ChangelogArgs;
use crate::util::write_json_pretty;

pub fn run(args: ChangelogArgs) -> Result<()> {
    let parser = ChangelogParser::with_link_host(&args.link_host)?;
    let changelog = parser.parse_file(&args.source)?;

    let entry_count: usize = changelog.releases.iter().map(|r| r.entry_count()).sum();
    info!(
        source = %args.source.display(),
        releases = changelog.releases.len(),
        entries = entry_count,
        latest = changelog.latest_version(),
        "parsed changelog"
    );

    if args.dry_run {
        info!("changelog dry-run complete");
        return Ok(());
    }

    write_json_pretty(&args.output, &changelog)?;
    info!(path = %args.output.display(), "wrote changelog artifact");

    Ok(())
}
