use crate::crawler::{FetchClient, FetchSettings, PolitenessGate, PolitenessPolicy};
use crate::sitemap::parser::{decompress_if_gzipped, parse_sitemap, SitemapDocument, SitemapEntry};
use crate::sitemap::SitemapError;
use crate::state::TaskStatus;
use crate::url::{extract_domain, normalize_url, resolve_loc};
use crate::HarvestError;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::watch;
use url::Url;

/// Paths probed, in order, when a site declares no sitemap in robots.txt
pub const WELL_KNOWN_SITEMAPS: [&str; 3] = ["/sitemap.xml", "/sitemap_index.xml", "/sitemap.xml.gz"];

/// A sitemap that failed to load; its siblings were still expanded
#[derive(Debug, Clone)]
pub struct BranchError {
    pub url: String,
    pub depth: u32,
    pub error: SitemapError,
}

/// Outcome of a resolution run
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Page entries, deduplicated, in discovery order
    pub entries: Vec<SitemapEntry>,
    pub branch_errors: Vec<BranchError>,
    /// Sitemap documents fetched and parsed
    pub sitemaps_fetched: usize,
    /// Nested sitemaps not fetched because of the depth limit
    pub skipped_by_depth: usize,
    /// Nested sitemaps not fetched because nested sitemaps are not followed
    pub skipped_nested: usize,
    /// True when work was abandoned because the URL limit was reached
    pub truncated: bool,
    /// True when the run was stopped through its control channel
    pub interrupted: bool,
}

impl Resolution {
    pub fn urls(&self) -> impl Iterator<Item = &Url> {
        self.entries.iter().map(|entry| &entry.loc)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Expands sitemaps and sitemap indexes into page URLs
///
/// Expansion is iterative: a FIFO queue of `(url, depth)` plus a visited
/// set of normalized sitemap URLs. Entries are kept first-discovered-first
/// when the URL limit cuts the run short.
pub struct SitemapResolver {
    client: FetchClient,
    settings: FetchSettings,
    follow_nested: bool,
    politeness: Option<(Arc<PolitenessGate>, PolitenessPolicy)>,
    control: Option<watch::Receiver<TaskStatus>>,
}

impl SitemapResolver {
    pub fn new(client: FetchClient, settings: FetchSettings) -> Self {
        Self {
            client,
            settings,
            follow_nested: true,
            politeness: None,
            control: None,
        }
    }

    /// Sends every sitemap request through `gate`, retries included
    pub fn with_politeness(mut self, gate: Arc<PolitenessGate>, policy: PolitenessPolicy) -> Self {
        self.politeness = Some((gate, policy));
        self
    }

    /// Checks `control` before every sitemap fetch
    ///
    /// `paused` (or `scheduled`) holds the run until the status changes;
    /// any terminal status ends it with `Resolution::interrupted` set.
    pub fn with_control(mut self, control: watch::Receiver<TaskStatus>) -> Self {
        self.control = Some(control);
        self
    }

    /// Whether `sitemapindex` children are fetched (default) or only counted
    pub fn follow_nested(mut self, follow: bool) -> Self {
        self.follow_nested = follow;
        self
    }

    /// Resolves one root sitemap
    ///
    /// # Arguments
    ///
    /// * `root` - The root sitemap or sitemap index, at depth 0
    /// * `max_depth` - Deepest nesting level that is still fetched
    /// * `max_urls` - Maximum number of page entries returned
    ///
    /// # Returns
    ///
    /// * `Ok(Resolution)` - Entries plus any per-branch failures
    /// * `Err(HarvestError::RootResolution)` - The root could not be loaded
    pub async fn resolve(
        &self,
        root: &Url,
        max_depth: u32,
        max_urls: usize,
    ) -> Result<Resolution, HarvestError> {
        self.resolve_roots(std::slice::from_ref(root), max_depth, max_urls)
            .await
    }

    /// Resolves several roots in one run, sharing the visited set and limit
    ///
    /// A failing root is a branch error as long as another root loads; the
    /// run fails only when none does.
    pub async fn resolve_roots(
        &self,
        roots: &[Url],
        max_depth: u32,
        max_urls: usize,
    ) -> Result<Resolution, HarvestError> {
        let mut queue: VecDeque<(Url, u32)> = roots.iter().map(|url| (url.clone(), 0)).collect();
        let mut visited: HashSet<String> = HashSet::new();
        let mut seen_pages: HashSet<String> = HashSet::new();
        let mut resolution = Resolution::default();
        let mut roots_loaded = 0usize;
        let mut root_failure: Option<(Url, SitemapError)> = None;
        let mut control = self.control.clone();

        while let Some((url, depth)) = queue.pop_front() {
            if resolution.entries.len() >= max_urls {
                resolution.truncated = true;
                break;
            }

            if !visited.insert(identity(&url)) {
                tracing::debug!("Sitemap {} already visited, skipping", url);
                continue;
            }

            if !may_proceed(&mut control).await {
                tracing::info!("Sitemap resolution interrupted before {}", url);
                resolution.interrupted = true;
                break;
            }

            let document = match self.load(&url).await {
                Ok(document) => document,
                Err(error) => {
                    tracing::warn!("Failed to load sitemap {}: {}", url, error);
                    if depth == 0 && root_failure.is_none() {
                        root_failure = Some((url.clone(), error.clone()));
                    }
                    resolution.branch_errors.push(BranchError {
                        url: url.to_string(),
                        depth,
                        error,
                    });
                    continue;
                }
            };

            resolution.sitemaps_fetched += 1;
            if depth == 0 {
                roots_loaded += 1;
            }

            match document {
                SitemapDocument::UrlSet(entries) => {
                    tracing::debug!("Sitemap {} lists {} pages", url, entries.len());
                    for entry in entries {
                        if resolution.entries.len() >= max_urls {
                            resolution.truncated = true;
                            break;
                        }
                        if seen_pages.insert(identity(&entry.loc)) {
                            resolution.entries.push(entry);
                        }
                    }
                }
                SitemapDocument::Index(children) => {
                    tracing::debug!("Sitemap index {} lists {} sitemaps", url, children.len());
                    for child in children {
                        if !self.follow_nested {
                            resolution.skipped_nested += 1;
                        } else if depth + 1 > max_depth {
                            tracing::debug!("Skipping {} beyond depth {}", child, max_depth);
                            resolution.skipped_by_depth += 1;
                        } else {
                            queue.push_back((child, depth + 1));
                        }
                    }
                }
            }

            if resolution.truncated {
                break;
            }
        }

        if roots_loaded == 0 {
            if let Some((url, source)) = root_failure {
                return Err(HarvestError::RootResolution {
                    url: url.to_string(),
                    source,
                });
            }
        }

        if resolution.truncated {
            tracing::info!("Reached the limit of {} URLs, truncating", max_urls);
        }

        Ok(resolution)
    }

    /// Resolves the sitemaps of a site
    ///
    /// Sitemaps declared in robots.txt are used when present. Otherwise the
    /// well-known locations are tried in order and the first one that
    /// resolves is used.
    pub async fn resolve_site(
        &self,
        site: &Url,
        gate: &PolitenessGate,
        max_depth: u32,
        max_urls: usize,
    ) -> Result<Resolution, HarvestError> {
        let declared = self.discover(site, gate).await;
        if !declared.is_empty() {
            tracing::info!("robots.txt declares {} sitemap(s) for {}", declared.len(), site);
            return self.resolve_roots(&declared, max_depth, max_urls).await;
        }

        for path in WELL_KNOWN_SITEMAPS {
            let candidate = site.join(path)?;
            match self.resolve(&candidate, max_depth, max_urls).await {
                Ok(resolution) => {
                    tracing::info!("Found sitemap at {}", candidate);
                    return Ok(resolution);
                }
                Err(e) => tracing::debug!("No usable sitemap at {}: {}", candidate, e),
            }
        }

        Err(HarvestError::NoSitemapFound {
            url: site.to_string(),
        })
    }

    /// Sitemap URLs declared in the site's robots.txt
    pub async fn discover(&self, site: &Url, gate: &PolitenessGate) -> Vec<Url> {
        let mut seen = HashSet::new();
        gate.robots_sitemaps(site)
            .await
            .iter()
            .filter_map(|loc| resolve_loc(site, loc))
            .filter(|url| seen.insert(identity(url)))
            .collect()
    }

    async fn load(&self, url: &Url) -> Result<SitemapDocument, SitemapError> {
        let response = match (&self.politeness, extract_domain(url)) {
            (Some((gate, policy)), Some(domain)) => {
                let gate: &PolitenessGate = gate;
                let domain = domain.as_str();
                let _permit = gate
                    .authorize(domain, policy)
                    .await
                    .map_err(|e| SitemapError::Gate {
                        url: url.to_string(),
                        message: e.to_string(),
                    })?;
                self.client
                    .fetch_paced(url, &self.settings, move |_| gate.pace(domain, policy))
                    .await?
            }
            _ => self.client.fetch(url, &self.settings).await?,
        };
        let body = decompress_if_gzipped(&response.body, url)?;
        parse_sitemap(&body, &response.final_url)
    }
}

/// Waits while the control channel says `paused`; false once it says stop
async fn may_proceed(control: &mut Option<watch::Receiver<TaskStatus>>) -> bool {
    let Some(control) = control else {
        return true;
    };

    loop {
        let status = *control.borrow_and_update();
        match status {
            TaskStatus::Running => return true,
            TaskStatus::Scheduled | TaskStatus::Paused => {
                if control.changed().await.is_err() {
                    return false;
                }
            }
            TaskStatus::Stopped | TaskStatus::Completed | TaskStatus::Error => return false,
        }
    }
}

/// Identity key of a URL for the visited sets
fn identity(url: &Url) -> String {
    normalize_url(url.as_str())
        .map(|normalized| normalized.to_string())
        .unwrap_or_else(|_| url.to_string())
}
