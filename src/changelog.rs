use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, warn};

use crate::model::{Changelog, Release};
use crate::util::read_optional_text;


pub const DEFAULT_LINK_HOST: &str = "github.com";

const FENCE_MARKER: &str = "```";
const RELEASE_HEADER_PREFIX: &str = "## [";

#[derive(Debug, PartialEq, Eq)]
enum LineShape<'a> {
    Fence,
    ReleaseHeader {
        version: &'a str,
        date: Option<&'a str>,
    },
    SectionHeader(&'a str),
    ListItem(&'a str),
    Other,
}

#[derive(Debug, Default)]
struct ParseCursor {
    releases: Vec<Release>,
    release: Option<Release>,
    section: Option<String>,
    in_code_block: bool,
}

impl ParseCursor {
    fn open_release(&mut self, release: Release) {
        self.close_release();
        self.release = Some(release);
        self.section = None;
    }

    fn close_release(&mut self) {
        if let Some(release) = self.release.take() {
            self.releases.push(release);
        }
    }

    fn open_section(&mut self, label: &str) {
        let Some(release) = self.release.as_mut() else {
            return;
        };
        release.sections.insert(label.to_string(), Vec::new());
        self.section = Some(label.to_string());
    }

    fn push_entry(&mut self, entry: String) {
        let (Some(release), Some(section)) = (self.release.as_mut(), self.section.as_ref()) else {
            return;
        };
        release
            .sections
            .entry(section.clone())
            .or_default()
            .push(entry);
    }

    fn accepts_entries(&self) -> bool {
        self.release.is_some() && self.section.is_some()
    }

    fn finish(mut self) -> Changelog {
        self.close_release();
        Changelog {
            releases: self.releases,
        }
    }
}

pub struct ChangelogParser {
    release_header: Regex,
    section_header: Regex,
    list_item: Regex,
    trailing_noise: Vec<Regex>,
    inline_noise: Vec<Regex>,
}

impl ChangelogParser {
    pub fn with_link_host(link_host: &str) -> Result<Self> {
        let release_header = Regex::new(
            r"^## \[([^\]]+)\](?:\([^)]*\))?(?:\s*-\s*(\S.*?)|\s*\(([^)]+)\))?\s*$",
        )
        .context("failed to compile release header regex")?;
        let section_header =
            Regex::new(r"^### (.*\S)\s*$").context("failed to compile section header regex")?;
        let list_item = Regex::new(r"^[-*] (.+)$").context("failed to compile list item regex")?;

        let trailing_noise = [
            r"\s*\(#\d+\)\s*\(\[[0-9a-fA-F]{7,40}\]\([^)\s]*\)\)\s*$",
            r"\s*\(\[[0-9a-fA-F]{7,40}\]\([^)\s]*\)\)\s*$",
            r"\s*\([0-9a-fA-F]{7,40}\)\s*$",
        ]
        .into_iter()
        .map(|pattern| {
            Regex::new(pattern)
                .with_context(|| format!("failed to compile reference regex: {pattern}"))
        })
        .collect::<Result<Vec<_>>>()?;

        let host_link = format!(
            r"\s*\[[^\]]*\]\(https?://(?:www\.)?{}(?:[/?#][^)\s]*)?\)",
            regex::escape(link_host)
        );
        let inline_noise = [r"\s*\(#\d+\)", r"\s*\(\[#\d+\]\([^)\s]*\)\)", host_link.as_str()]
            .into_iter()
            .map(|pattern| {
                Regex::new(pattern)
                    .with_context(|| format!("failed to compile reference regex: {pattern}"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            release_header,
            section_header,
            list_item,
            trailing_noise,
            inline_noise,
        })
    }

    pub fn parse(&self, document: &str) -> Changelog {
        let mut cursor = ParseCursor::default();

        for line in document.lines() {
            let shape = self.classify(line);

            if shape == LineShape::Fence {
                cursor.in_code_block = !cursor.in_code_block;
                continue;
            }
            if cursor.in_code_block {
                continue;
            }

            match shape {
                LineShape::ReleaseHeader { version, date } => {
                    cursor.open_release(Release::new(version, date));
                }
                LineShape::SectionHeader(label) => cursor.open_section(label),
                LineShape::ListItem(text) if cursor.accepts_entries() => {
                    let entry = self.strip_reference_noise(text);
                    if !entry.is_empty() {
                        cursor.push_entry(entry);
                    }
                }
                LineShape::ListItem(text) => {
                    debug!(item = text, "dropping list item outside a release section");
                }
                LineShape::Fence | LineShape::Other => {}
            }
        }

        cursor.finish()
    }

    pub fn parse_file(&self, path: &Path) -> Result<Changelog> {
        match read_optional_text(path)? {
            Some(document) => Ok(self.parse(&document)),
            None => {
                warn!(path = %path.display(), "changelog document not found, using empty changelog");
                Ok(Changelog::default())
            }
        }
    }

    fn classify<'a>(&self, line: &'a str) -> LineShape<'a> {
        if line.starts_with(FENCE_MARKER) {
            return LineShape::Fence;
        }

        if let Some(captures) = self.release_header.captures(line) {
            if let Some(version) = captures.get(1) {
                let date = captures
                    .get(2)
                    .or_else(|| captures.get(3))
                    .map(|m| m.as_str().trim())
                    .filter(|date| !date.is_empty());
                return LineShape::ReleaseHeader {
                    version: version.as_str().trim(),
                    date,
                };
            }
        }

        if line.starts_with(RELEASE_HEADER_PREFIX) {
            debug!(line, "line looks like a release header but does not match, treating as text");
        }

        if let Some(label) = self.section_header.captures(line).and_then(|c| c.get(1)) {
            return LineShape::SectionHeader(label.as_str().trim());
        }

        if let Some(text) = self.list_item.captures(line).and_then(|c| c.get(1)) {
            return LineShape::ListItem(text.as_str());
        }

        LineShape::Other
    }

    fn strip_reference_noise(&self, text: &str) -> String {
        let mut cleaned = text.to_string();

        for pattern in self.trailing_noise.iter().chain(self.inline_noise.iter()) {
            cleaned = pattern.replace_all(&cleaned, "").into_owned();
        }

        cleaned.trim().to_string()
    }
}
