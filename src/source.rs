use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use serde::de::DeserializeOwned;
use url::Url;

use crate::model::{Changelog, VersionManifest};
use crate::util::cache_bust_token;

pub const MANIFEST_FILE: &str = "version.json";
pub const CHANGELOG_FILE: &str = "changelog.json";

const MANIFEST_BUST_PARAM: &str = "_";
const CHANGELOG_BUST_PARAM: &str = "t";

pub trait ArtifactSource {
    fn fetch_manifest(&self) -> impl Future<Output = Result<VersionManifest>> + Send;

    fn fetch_changelog(&self) -> impl Future<Output = Result<Changelog>> + Send;
}

pub struct HttpArtifactSource {
    client: reqwest::Client,
    manifest_url: Url,
    changelog_url: Url,
}

impl HttpArtifactSource {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base =
            Url::parse(base_url).with_context(|| format!("invalid base url: {base_url}"))?;
        if !matches!(base.scheme(), "http" | "https") {
            bail!("unsupported base url scheme: {}", base.scheme());
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build http client")?;

        Ok(Self {
            client,
            manifest_url: base
                .join(MANIFEST_FILE)
                .context("failed to build manifest url")?,
            changelog_url: base
                .join(CHANGELOG_FILE)
                .context("failed to build changelog url")?,
        })
    }

    pub fn manifest_url(&self) -> &Url {
        &self.manifest_url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &Url, bust_param: &str) -> Result<T> {
        let url = cache_busted(url, bust_param);

        let response = self
            .client
            .get(url.clone())
            .header(CACHE_CONTROL, "no-store")
            .header(PRAGMA, "no-cache")
            .send()
            .await
            .with_context(|| format!("failed to fetch {url}"))?
            .error_for_status()
            .with_context(|| format!("unexpected status from {url}"))?;

        response
            .json::<T>()
            .await
            .with_context(|| format!("failed to decode json from {url}"))
    }
}

impl ArtifactSource for HttpArtifactSource {
    async fn fetch_manifest(&self) -> Result<VersionManifest> {
        self.get_json(&self.manifest_url, MANIFEST_BUST_PARAM).await
    }

    async fn fetch_changelog(&self) -> Result<Changelog> {
        self.get_json(&self.changelog_url, CHANGELOG_BUST_PARAM).await
    }
}

fn cache_busted(url: &Url, param: &str) -> Url {
    let mut url = url.clone();
    url.query_pairs_mut()
        .append_pair(param, &cache_bust_token());
    url
}

pub struct DirectoryArtifactSource {
    root: PathBuf,
}

impl DirectoryArtifactSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn read_json<T: DeserializeOwned>(&self, file_name: &str) -> Result<T> {
        let path = self.root.join(file_name);
        let raw = tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_slice(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }
}

impl ArtifactSource for DirectoryArtifactSource {
    async fn fetch_manifest(&self) -> Result<VersionManifest> {
        self.read_json(MANIFEST_FILE).await
    }

    async fn fetch_changelog(&self) -> Result<Changelog> {
        self.read_json(CHANGELOG_FILE).await
    }
}

pub enum ArtifactEndpoint {
    Http(HttpArtifactSource),
    Directory(DirectoryArtifactSource),
}

impl ArtifactEndpoint {
    pub fn resolve(base_url: Option<&str>, public_dir: Option<&Path>) -> Result<Self> {
        match (base_url, public_dir) {
            (Some(base_url), None) => Ok(Self::Http(HttpArtifactSource::new(base_url)?)),
            (None, Some(public_dir)) => Ok(Self::Directory(DirectoryArtifactSource::new(
                public_dir,
            ))),
            (Some(_), Some(_)) => bail!("pass either --base-url or --public-dir, not both"),
            (None, None) => bail!("one of --base-url or --public-dir is required"),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Http(source) => source.manifest_url().to_string(),
            Self::Directory(source) => source.root.join(MANIFEST_FILE).display().to_string(),
        }
    }
}

impl ArtifactSource for ArtifactEndpoint {
    async fn fetch_manifest(&self) -> Result<VersionManifest> {
        match self {
            Self::Http(source) => source.fetch_manifest().await,
            Self::Directory(source) => source.fetch_manifest().await,
        }
    }

    async fn fetch_changelog(&self) -> Result<Changelog> {
        match self {
            Self::Http(source) => source.fetch_changelog().await,
            Self::Directory(source) => source.fetch_changelog().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    use super::*;
    use crate::poller::UpdatePoller;
    use crate::util::write_json_pretty;

    fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let base_url = format!("http://{}/app", listener.local_addr().expect("local addr"));

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut request = Vec::new();
            let mut buf = [0_u8; 1024];
            while !request.windows(4).any(|window| window == b"\r\n\r\n") {
                let read = stream.read(&mut buf).expect("read request");
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..read]);
            }

            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).expect("write response");
            String::from_utf8_lossy(&request).into_owned()
        });

        (base_url, server)
    }

    #[test]
    fn base_url_gains_trailing_slash_before_joining() {
        let source = HttpArtifactSource::new("https://ringing.example.org/app").expect("source");

        assert_eq!(
            source.manifest_url().as_str(),
            "https://ringing.example.org/app/version.json"
        );
        assert_eq!(
            source.changelog_url.as_str(),
            "https://ringing.example.org/app/changelog.json"
        );
    }

    #[test]
    fn rejects_non_http_base_url() {
        assert!(HttpArtifactSource::new("ftp://ringing.example.org/").is_err());
        assert!(HttpArtifactSource::new("not a url").is_err());
    }

    #[test]
    fn cache_busting_appends_query_parameter() {
        let url = Url::parse("https://ringing.example.org/version.json").expect("url");

        let busted = cache_busted(&url, "_");

        let pairs: Vec<(String, String)> = busted.query_pairs().into_owned().collect();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, "_");
        assert!(pairs[0].1.parse::<i64>().is_ok());
    }

    #[test]
    fn endpoint_requires_exactly_one_location() {
        assert!(ArtifactEndpoint::resolve(None, None).is_err());
        assert!(
            ArtifactEndpoint::resolve(Some("https://a.example/"), Some(Path::new("public")))
                .is_err()
        );
        assert!(matches!(
            ArtifactEndpoint::resolve(None, Some(Path::new("public"))),
            Ok(ArtifactEndpoint::Directory(_))
        ));
    }

    #[tokio::test]
    async fn directory_source_reads_artifacts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manifest = VersionManifest {
            version: "1.4.0-abc1234".to_string(),
            build_time: "2024-06-01T10:00:00.000Z".to_string(),
            backend_version: None,
        };
        write_json_pretty(&dir.path().join(MANIFEST_FILE), &manifest).expect("write manifest");
        std::fs::write(
            dir.path().join(CHANGELOG_FILE),
            r#"{"releases":[{"version":"1.4.0","date":"2024-06-01","sections":{"Features":["Map view"]}}]}"#,
        )
        .expect("write changelog");

        let source = DirectoryArtifactSource::new(dir.path());

        assert_eq!(source.fetch_manifest().await.expect("manifest"), manifest);
        let changelog = source.fetch_changelog().await.expect("changelog");
        assert_eq!(changelog.latest_version(), "1.4.0");
    }

    #[tokio::test]
    async fn directory_source_reports_missing_artifacts() {
        let dir = tempfile::tempdir().expect("tempdir");

        let source = DirectoryArtifactSource::new(dir.path());

        assert!(source.fetch_manifest().await.is_err());
        assert!(source.fetch_changelog().await.is_err());
    }

    #[tokio::test]
    async fn http_fetch_bypasses_caches() {
        let (base_url, server) = serve_once(
            "200 OK",
            r#"{"version":"2.1.0-abc1234","buildTime":"2024-06-02T08:30:00.000Z"}"#,
        );
        let source = HttpArtifactSource::new(&base_url).expect("source");

        let manifest = source.fetch_manifest().await.expect("manifest");
        let request = server.join().expect("server thread");

        assert_eq!(manifest.version, "2.1.0-abc1234");
        assert_eq!(manifest.build_time, "2024-06-02T08:30:00.000Z");
        let request_line = request.lines().next().unwrap_or_default();
        assert!(
            request_line.starts_with("GET /app/version.json?_="),
            "request line: {request_line}"
        );
        assert!(request_line.ends_with(" HTTP/1.1"));
        let headers = request.to_ascii_lowercase();
        assert!(headers.contains("\r\ncache-control: no-store\r\n"), "{request}");
        assert!(headers.contains("\r\npragma: no-cache\r\n"), "{request}");
    }

    #[tokio::test]
    async fn changelog_fetch_uses_its_own_cache_bust_parameter() {
        let (base_url, server) = serve_once("200 OK", r#"{"releases":[]}"#);
        let source = HttpArtifactSource::new(&base_url).expect("source");

        let changelog = source.fetch_changelog().await.expect("changelog");
        let request = server.join().expect("server thread");

        assert!(changelog.is_empty());
        assert!(request.starts_with("GET /app/changelog.json?t="), "{request}");
    }

    #[tokio::test]
    async fn error_status_is_a_fetch_failure() {
        let (base_url, server) = serve_once("503 Service Unavailable", "{}");
        let source = HttpArtifactSource::new(&base_url).expect("source");

        let result = source.fetch_manifest().await;
        server.join().expect("server thread");

        let err = result.expect_err("503 must not decode");
        assert!(format!("{err:#}").contains("503"), "{err:#}");
    }

    #[tokio::test]
    async fn poller_swallows_error_status() {
        let (base_url, server) = serve_once("503 Service Unavailable", "{}");
        let mut poller = UpdatePoller::new(HttpArtifactSource::new(&base_url).expect("source"));
        let mut updates = poller.subscribe();

        assert_eq!(poller.check_for_updates().await, None);
        server.join().expect("server thread");

        assert_eq!(poller.last_known_version(), None);
        assert!(updates.try_recv().is_err());
    }
}
