//! GitHub repository fetching
//!
//! Lists a repository directory through the contents API and downloads the
//! files in it. Only the top level of the requested directory is read, and
//! files keep their bare names so the result is a flat workspace.

use futures_util::future::join_all;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

use super::{RepoError, ResolvedRepository};
use crate::config::types::RepoConfig;
use crate::core_types::FileEntry;

/// A repository reference parsed from a URL or `owner/repo` shorthand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubRepoRef {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Directory inside the repository, empty for the root.
    pub path: String,
}

fn github_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"github\.com/([^/]+)/([^/]+)(?:/tree/([^/]+)(?:/(.+))?)?")
            .expect("GitHub URL pattern is valid")
    })
}

impl GitHubRepoRef {
    /// Parses `owner/repo`, `https://github.com/owner/repo`,
    /// `.../tree/<branch>` and `.../tree/<branch>/<path>`. The branch
    /// defaults to `main`.
    pub fn parse(input: &str) -> Result<Self, RepoError> {
        let url = input.trim().trim_end_matches('/');
        let invalid = || RepoError::InvalidUrl(input.to_string());

        if !url.starts_with("http") && !url.contains("github.com") {
            let mut parts = url.split('/');
            let (owner, repo) = match (parts.next(), parts.next()) {
                (Some(owner), Some(repo)) if !owner.is_empty() && !repo.is_empty() => {
                    (owner, repo)
                }
                _ => return Err(invalid()),
            };
            return Ok(Self {
                owner: owner.to_string(),
                repo: repo.trim_end_matches(".git").to_string(),
                branch: "main".to_string(),
                path: String::new(),
            });
        }

        let captures = github_url_pattern().captures(url).ok_or_else(invalid)?;
        let group = |i: usize| captures.get(i).map(|m| m.as_str().to_string());
        Ok(Self {
            owner: group(1).ok_or_else(invalid)?,
            repo: group(2)
                .ok_or_else(invalid)?
                .trim_end_matches(".git")
                .to_string(),
            branch: group(3).unwrap_or_else(|| "main".to_string()),
            path: group(4).unwrap_or_default(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ContentItem {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: u64,
    download_url: Option<String>,
}

/// The contents API returns an array for directories and an object for a
/// single file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentListing {
    Many(Vec<ContentItem>),
    One(ContentItem),
}

impl ContentListing {
    fn into_items(self) -> Vec<ContentItem> {
        match self {
            ContentListing::Many(items) => items,
            ContentListing::One(item) => vec![item],
        }
    }
}

pub struct GitHubRepoFetcher {
    client: reqwest::Client,
    settings: RepoConfig,
}

impl GitHubRepoFetcher {
    pub fn new(settings: RepoConfig) -> Result<Self, RepoError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("docle-sandbox/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, settings })
    }

    pub fn contents_url(&self, repo: &GitHubRepoRef) -> String {
        let base = self.settings.api_base.trim_end_matches('/');
        if repo.path.is_empty() {
            format!(
                "{}/repos/{}/{}/contents?ref={}",
                base, repo.owner, repo.repo, repo.branch
            )
        } else {
            format!(
                "{}/repos/{}/{}/contents/{}?ref={}",
                base, repo.owner, repo.repo, repo.path, repo.branch
            )
        }
    }

    fn is_allowed(&self, name: &str) -> bool {
        if self.settings.allowed_extensions.is_empty() {
            return true;
        }
        let ext = format!(".{}", name.rsplit('.').next().unwrap_or(name));
        self.settings.allowed_extensions.iter().any(|e| *e == ext)
    }

    /// Downloads the usable files of the referenced directory.
    pub async fn fetch(&self, repo: &GitHubRepoRef) -> Result<Vec<FileEntry>, RepoError> {
        let url = self.contents_url(repo);
        log::info!("Fetching repository listing {}", url);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RepoError::NotFound {
                owner: repo.owner.clone(),
                repo: repo.repo.clone(),
            });
        }
        if !status.is_success() {
            return Err(RepoError::Api {
                status: status.as_u16(),
            });
        }

        let files: Vec<ContentItem> = response
            .json::<ContentListing>()
            .await?
            .into_items()
            .into_iter()
            .filter(|item| item.kind == "file" && self.is_allowed(&item.name))
            .collect();

        if files.len() > self.settings.max_files {
            return Err(RepoError::TooManyFiles {
                count: files.len(),
                max: self.settings.max_files,
            });
        }

        let downloads = files.iter().map(|item| self.download(item));
        let entries: Vec<FileEntry> = join_all(downloads).await.into_iter().flatten().collect();

        if entries.is_empty() {
            return Err(RepoError::NoUsableFiles);
        }
        log::info!(
            "Fetched {} file(s) from {}/{}@{}",
            entries.len(),
            repo.owner,
            repo.repo,
            repo.branch
        );
        Ok(entries)
    }

    async fn download(&self, item: &ContentItem) -> Option<FileEntry> {
        if item.size > self.settings.max_file_size {
            log::warn!("Skipping {}: file too large ({} bytes)", item.name, item.size);
            return None;
        }
        let url = item.download_url.as_deref()?;

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Failed to fetch {}: {}", item.name, e);
                return None;
            }
        };
        if !response.status().is_success() {
            log::warn!("Failed to fetch {}: {}", item.name, response.status());
            return None;
        }

        match response.text().await {
            Ok(content) => Some(FileEntry::new(item.name.clone(), content)),
            Err(e) => {
                log::warn!("Failed to read {}: {}", item.name, e);
                None
            }
        }
    }

    /// Parses `url`, fetches the files and detects how to run them.
    pub async fn resolve(&self, url: &str) -> Result<ResolvedRepository, RepoError> {
        let repo = GitHubRepoRef::parse(url)?;
        let files = self.fetch(&repo).await?;
        let resolved = ResolvedRepository::from_files(files);
        log::debug!(
            "Resolved {} as {} with entrypoint {}",
            url,
            resolved.runtime,
            resolved.entrypoint
        );
        Ok(resolved)
    }
}
