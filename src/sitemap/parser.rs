use crate::sitemap::SitemapError;
use crate::url::resolve_loc;
use flate2::read::GzDecoder;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::borrow::Cow;
use std::io::Read;
use url::Url;

/// Sitemap protocol limit on entries per file
pub const MAX_LOCS_PER_DOCUMENT: usize = 50_000;

/// Sitemap protocol limit on uncompressed file size
pub const MAX_DECOMPRESSED_SIZE: u64 = 50 * 1024 * 1024;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A `<url>` entry of a `urlset`
#[derive(Debug, Clone, PartialEq)]
pub struct SitemapEntry {
    pub loc: Url,
    /// Kept verbatim
    pub lastmod: Option<String>,
    pub changefreq: Option<String>,
    pub priority: Option<f32>,
}

impl SitemapEntry {
    pub fn new(loc: Url) -> Self {
        Self {
            loc,
            lastmod: None,
            changefreq: None,
            priority: None,
        }
    }
}

/// A parsed sitemap file
#[derive(Debug, Clone, PartialEq)]
pub enum SitemapDocument {
    /// Page entries
    UrlSet(Vec<SitemapEntry>),
    /// Nested sitemap URLs
    Index(Vec<Url>),
}

impl SitemapDocument {
    pub fn len(&self) -> usize {
        match self {
            Self::UrlSet(entries) => entries.len(),
            Self::Index(children) => children.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decompresses `bytes` if they start with the gzip signature
///
/// Output larger than `MAX_DECOMPRESSED_SIZE` is rejected.
pub fn decompress_if_gzipped<'a>(
    bytes: &'a [u8],
    url: &Url,
) -> Result<Cow<'a, [u8]>, SitemapError> {
    if !bytes.starts_with(&GZIP_MAGIC) {
        return Ok(Cow::Borrowed(bytes));
    }

    let mut decoder = GzDecoder::new(bytes).take(MAX_DECOMPRESSED_SIZE + 1);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| SitemapError::Decompress {
            url: url.to_string(),
            message: e.to_string(),
        })?;

    if out.len() as u64 > MAX_DECOMPRESSED_SIZE {
        return Err(SitemapError::TooLarge {
            url: url.to_string(),
        });
    }

    tracing::trace!("Decompressed {} ({} -> {} bytes)", url, bytes.len(), out.len());
    Ok(Cow::Owned(out))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Root {
    UrlSet,
    Index,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Loc,
    LastMod,
    ChangeFreq,
    Priority,
}

#[derive(Debug, Default)]
struct PartialEntry {
    loc: Option<String>,
    lastmod: Option<String>,
    changefreq: Option<String>,
    priority: Option<String>,
}

/// Parses a sitemap or sitemap index
///
/// Element names are matched by local name, so any namespace prefix is
/// accepted. Relative `<loc>` values are resolved against `url`; values
/// that do not resolve to http(s) URLs are skipped. At most
/// `MAX_LOCS_PER_DOCUMENT` entries are kept.
pub fn parse_sitemap(bytes: &[u8], url: &Url) -> Result<SitemapDocument, SitemapError> {
    let malformed = |message: String| SitemapError::Malformed {
        url: url.to_string(),
        message,
    };

    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut root: Option<Root> = None;
    let mut depth = 0usize;
    let mut entry: Option<PartialEntry> = None;
    let mut field: Option<Field> = None;
    let mut text = String::new();

    let mut entries = Vec::new();
    let mut children = Vec::new();
    let mut kept = 0usize;
    let mut dropped = 0usize;

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                depth += 1;
                let name = e.local_name();
                let name = name.as_ref();

                let Some(kind) = root else {
                    root = Some(root_kind(name).ok_or_else(|| {
                        malformed(format!(
                            "unexpected root element <{}>",
                            String::from_utf8_lossy(name)
                        ))
                    })?);
                    continue;
                };

                match (kind, name) {
                    (Root::UrlSet, b"url") | (Root::Index, b"sitemap") if depth == 2 => {
                        entry = Some(PartialEntry::default());
                    }
                    (_, b"loc") if in_entry(&entry, depth) => field = Some(Field::Loc),
                    (_, b"lastmod") if in_entry(&entry, depth) => field = Some(Field::LastMod),
                    (Root::UrlSet, b"changefreq") if in_entry(&entry, depth) => {
                        field = Some(Field::ChangeFreq)
                    }
                    (Root::UrlSet, b"priority") if in_entry(&entry, depth) => {
                        field = Some(Field::Priority)
                    }
                    _ => {}
                }
                text.clear();
            }
            Ok(Event::Empty(ref e)) => {
                if root.is_none() {
                    let name = e.local_name();
                    root = Some(root_kind(name.as_ref()).ok_or_else(|| {
                        malformed(format!(
                            "unexpected root element <{}/>",
                            String::from_utf8_lossy(name.as_ref())
                        ))
                    })?);
                }
            }
            Ok(Event::Text(ref t)) => {
                if field.is_some() {
                    let unescaped = t
                        .unescape()
                        .map_err(|e| malformed(format!("invalid text: {}", e)))?;
                    text.push_str(&unescaped);
                }
            }
            Ok(Event::CData(ref t)) => {
                if field.is_some() {
                    text.push_str(&String::from_utf8_lossy(t));
                }
            }
            Ok(Event::End(ref e)) => {
                depth = depth.saturating_sub(1);
                let name = e.local_name();

                match name.as_ref() {
                    b"loc" | b"lastmod" | b"changefreq" | b"priority" => {
                        if let (Some(current), Some(f)) = (entry.as_mut(), field.take()) {
                            let value = Some(text.trim().to_string()).filter(|v| !v.is_empty());
                            match f {
                                Field::Loc => current.loc = value,
                                Field::LastMod => current.lastmod = value,
                                Field::ChangeFreq => current.changefreq = value,
                                Field::Priority => current.priority = value,
                            }
                        }
                    }
                    b"url" | b"sitemap" if depth == 1 => {
                        let Some(finished) = entry.take() else {
                            continue;
                        };
                        let Some(loc) = finished.loc.as_deref() else {
                            tracing::warn!("Entry without <loc> in {}", url);
                            continue;
                        };
                        let Some(resolved) = resolve_loc(url, loc) else {
                            tracing::warn!("Skipping unusable <loc> '{}' in {}", loc, url);
                            continue;
                        };

                        if kept >= MAX_LOCS_PER_DOCUMENT {
                            dropped += 1;
                            continue;
                        }
                        kept += 1;

                        match root {
                            Some(Root::UrlSet) => entries.push(SitemapEntry {
                                loc: resolved,
                                lastmod: finished.lastmod,
                                changefreq: finished.changefreq,
                                priority: finished.priority.and_then(|p| p.parse().ok()),
                            }),
                            Some(Root::Index) => children.push(resolved),
                            None => {}
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(malformed(format!(
                    "XML error at byte {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
        }
    }

    if depth != 0 {
        return Err(malformed("unexpected end of document".to_string()));
    }

    if dropped > 0 {
        tracing::warn!(
            "{} has more than {} entries, ignored {}",
            url,
            MAX_LOCS_PER_DOCUMENT,
            dropped
        );
    }

    match root {
        Some(Root::UrlSet) => Ok(SitemapDocument::UrlSet(entries)),
        Some(Root::Index) => Ok(SitemapDocument::Index(children)),
        None => Err(malformed("no root element".to_string())),
    }
}

/// True for direct children of a `<url>` or `<sitemap>` entry
fn in_entry(entry: &Option<PartialEntry>, depth: usize) -> bool {
    entry.is_some() && depth == 3
}

fn root_kind(name: &[u8]) -> Option<Root> {
    match name {
        b"urlset" => Some(Root::UrlSet),
        b"sitemapindex" => Some(Root::Index),
        _ => None,
    }
}
