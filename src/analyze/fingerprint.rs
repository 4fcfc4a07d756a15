use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Node, Selector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use url::Url;

use crate::analyze::links::{self, LinkInventory, LinkScope};
use crate::probe::result::{HttpResponse, ProbeResult};
use crate::target::Target;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("email regex"));
static SENSITIVE_COMMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)version|v\d+\.\d+|debug|config|pass|user").expect("comment regex"));

static META_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("meta[name]").expect("meta selector"));
static SCRIPT_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("script[src]").expect("script selector"));
static LINK_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("link[href]").expect("link selector"));
static ANCHOR_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("anchor selector"));

const SERVER_VENDORS: &[&str] = &["apache", "nginx", "iis", "litespeed"];
const CMS_NAMES: &[&str] = &["wordpress", "joomla", "drupal"];
const SCRIPT_LIBRARIES: &[&str] = &["jquery", "angular", "react", "vue"];
const CSS_FRAMEWORKS: &[&str] = &["bootstrap", "foundation"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    ServerHeader,
    PoweredBy,
    MetaGenerator,
    CookiePattern,
    ScriptLibrary,
    StylesheetFramework,
    HtmlComment,
    EmailAddress,
    InterestingLink,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::ServerHeader => "server_header",
            SignalKind::PoweredBy => "powered_by",
            SignalKind::MetaGenerator => "meta_generator",
            SignalKind::CookiePattern => "cookie_pattern",
            SignalKind::ScriptLibrary => "script_library",
            SignalKind::StylesheetFramework => "stylesheet_framework",
            SignalKind::HtmlComment => "html_comment",
            SignalKind::EmailAddress => "email_address",
            SignalKind::InterestingLink => "interesting_link",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One fingerprint observation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub value: String,
    pub source: Target,
    /// Comments only: text looks like it leaks versions, debug state or credentials.
    #[serde(default)]
    pub flagged: bool,
    /// Interesting links only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<LinkScope>,
}

impl Signal {
    pub fn new(kind: SignalKind, value: impl Into<String>, source: &Target) -> Self {
        Self { kind, value: value.into(), source: source.clone(), flagged: false, scope: None }
    }
}

/// Accumulates signals for one response, dropping exact repeats.
struct Collector<'a> {
    source: &'a Target,
    signals: Vec<Signal>,
}

impl<'a> Collector<'a> {
    fn push(&mut self, signal: Signal) {
        if !self.signals.contains(&signal) {
            self.signals.push(signal);
        }
    }

    fn emit(&mut self, kind: SignalKind, value: impl Into<String>) {
        let signal = Signal::new(kind, value, self.source);
        self.push(signal);
    }
}

/// Pure extractor of technology signals. No network, no state.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fingerprinter;

impl Fingerprinter {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, probe: &ProbeResult) -> Vec<Signal> {
        let Some(resp) = probe.response.as_ref() else {
            return Vec::new();
        };
        let mut out = Collector { source: &probe.target, signals: Vec::new() };

        header_signals(resp, &mut out);
        cookie_signals(resp, &mut out);

        let body = resp.body_text();
        if is_markup(resp) && !body.is_empty() {
            let document = Html::parse_document(&body);
            meta_signals(&document, &mut out);
            script_signals(&document, &mut out);
            stylesheet_signals(&document, &mut out);
            comment_signals(&document, &mut out);
            if let Some(page) = page_url(probe) {
                link_signals(&document, &page, &mut out);
            }
        }

        for m in EMAIL_RE.find_iter(&body) {
            out.emit(SignalKind::EmailAddress, m.as_str());
        }

        out.signals
    }

    /// Every anchor on the page, resolved and split into internal/external.
    pub fn link_inventory(&self, probe: &ProbeResult) -> LinkInventory {
        let mut inventory = LinkInventory::default();
        let (Some(resp), Some(page)) = (probe.response.as_ref(), page_url(probe)) else {
            return inventory;
        };
        if !is_markup(resp) || resp.body.is_empty() {
            return inventory;
        }
        let document = Html::parse_document(&resp.body_text());
        for anchor in document.select(&ANCHOR_SEL) {
            let Some(href) = anchor.value().attr("href") else { continue };
            if let Some(url) = links::resolve_href(&page, href) {
                let scope = links::classify(&page, &url);
                inventory.insert(scope, url.to_string());
            }
        }
        inventory
    }
}

fn page_url(probe: &ProbeResult) -> Option<Url> {
    Url::parse(probe.final_url())
        .or_else(|_| Url::parse(probe.target.as_str()))
        .ok()
}

fn is_markup(resp: &HttpResponse) -> bool {
    match resp.header("content-type") {
        None => true,
        Some(ct) => {
            let ct = ct.to_ascii_lowercase();
            ct.contains("html") || ct.contains("xml")
        }
    }
}

fn header_signals(resp: &HttpResponse, out: &mut Collector<'_>) {
    if let Some(server) = resp.header("server") {
        out.emit(SignalKind::ServerHeader, server);
        let lower = server.to_ascii_lowercase();
        for vendor in SERVER_VENDORS {
            if lower.contains(vendor) {
                out.emit(SignalKind::ServerHeader, *vendor);
            }
        }
    }
    for name in ["x-powered-by", "x-aspnet-version"] {
        if let Some(value) = resp.header(name) {
            out.emit(SignalKind::PoweredBy, value);
        }
    }
}

fn cookie_signals(resp: &HttpResponse, out: &mut Collector<'_>) {
    for raw in resp.header_values("set-cookie") {
        let name = raw
            .split(';')
            .next()
            .and_then(|pair| pair.split('=').next())
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if name.is_empty() {
            continue;
        }
        if name.contains("sess") || name.contains("sid") {
            out.emit(SignalKind::CookiePattern, "session-management");
        }
        if name.contains("wp_") || name.contains("wordpress_") {
            out.emit(SignalKind::CookiePattern, "wordpress");
        }
    }
}

fn meta_signals(document: &Html, out: &mut Collector<'_>) {
    for meta in document.select(&META_SEL) {
        let el = meta.value();
        let is_generator = el.attr("name").map(|n| n.trim().eq_ignore_ascii_case("generator")).unwrap_or(false);
        let Some(content) = el.attr("content").filter(|_| is_generator) else { continue };
        let content = content.trim();
        if content.is_empty() {
            continue;
        }
        out.emit(SignalKind::MetaGenerator, content);
        let lower = content.to_ascii_lowercase();
        for cms in CMS_NAMES {
            if lower.contains(cms) {
                out.emit(SignalKind::MetaGenerator, *cms);
            }
        }
    }
}

fn script_signals(document: &Html, out: &mut Collector<'_>) {
    for script in document.select(&SCRIPT_SEL) {
        let Some(src) = script.value().attr("src") else { continue };
        let lower = src.to_ascii_lowercase();
        for lib in SCRIPT_LIBRARIES {
            if lower.contains(lib) {
                out.emit(SignalKind::ScriptLibrary, *lib);
            }
        }
    }
}

fn stylesheet_signals(document: &Html, out: &mut Collector<'_>) {
    for link in document.select(&LINK_SEL) {
        let el = link.value();
        let is_stylesheet = el
            .attr("rel")
            .map(|rel| rel.split_ascii_whitespace().any(|r| r.eq_ignore_ascii_case("stylesheet")))
            .unwrap_or(false);
        let Some(href) = el.attr("href").filter(|_| is_stylesheet) else { continue };
        let lower = href.to_ascii_lowercase();
        for framework in CSS_FRAMEWORKS {
            if lower.contains(framework) {
                out.emit(SignalKind::StylesheetFramework, *framework);
            }
        }
    }
}

fn comment_signals(document: &Html, out: &mut Collector<'_>) {
    for node in document.tree.values() {
        if let Node::Comment(comment) = node {
            let text: &str = &comment.comment;
            let mut signal = Signal::new(SignalKind::HtmlComment, text, out.source);
            signal.flagged = SENSITIVE_COMMENT_RE.is_match(text);
            out.push(signal);
        }
    }
}

fn link_signals(document: &Html, page: &Url, out: &mut Collector<'_>) {
    for anchor in document.select(&ANCHOR_SEL) {
        let Some(href) = anchor.value().attr("href") else { continue };
        if !links::is_interesting(href) {
            continue;
        }
        let Some(url) = links::resolve_href(page, href) else { continue };
        let mut signal = Signal::new(SignalKind::InterestingLink, url.to_string(), out.source);
        signal.scope = Some(links::classify(page, &url));
        out.push(signal);
    }
}

/// Product names worth an exploit-database search: the product token of
/// `Server` / `X-Powered-By` values and the first word of a generator tag.
pub fn service_names(signals: &[Signal]) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for signal in signals {
        let token = match signal.kind {
            SignalKind::ServerHeader | SignalKind::PoweredBy => {
                signal.value.split(['/', ' ']).next().unwrap_or_default()
            }
            SignalKind::MetaGenerator => signal.value.split_whitespace().next().unwrap_or_default(),
            _ => continue,
        };
        let token = token.trim().to_ascii_lowercase();
        if token.chars().any(|c| c.is_ascii_alphabetic()) {
            names.insert(token);
        }
    }
    names
}
