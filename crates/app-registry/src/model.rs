use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The eight placement slots a composed page exposes. A registration carries
/// at most one region entry per slot; callers address entries by first match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PageRegion {
    Head,
    Breadcrumb,
    BodyTop,
    Body,
    SidebarRight,
    SidebarLeft,
    Footer,
    HeroBanner,
}

impl PageRegion {
    pub const ALL: [Self; 8] = [
        Self::Head,
        Self::Breadcrumb,
        Self::BodyTop,
        Self::Body,
        Self::SidebarRight,
        Self::SidebarLeft,
        Self::Footer,
        Self::HeroBanner,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Head => "Head",
            Self::Breadcrumb => "Breadcrumb",
            Self::BodyTop => "BodyTop",
            Self::Body => "Body",
            Self::SidebarRight => "SidebarRight",
            Self::SidebarLeft => "SidebarLeft",
            Self::Footer => "Footer",
            Self::HeroBanner => "HeroBanner",
        }
    }
}

impl std::fmt::Display for PageRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One placement slot backed by an endpoint URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    pub page_region: PageRegion,
    #[serde(default)]
    pub region_endpoint: Option<String>,
    #[serde(default)]
    pub offline_html: Option<String>,
    #[serde(default)]
    pub hide_on_mobile: bool,
    #[serde(default = "default_true")]
    pub is_healthy: bool,
    #[serde(default)]
    pub date_of_registration: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified_date: Option<DateTime<Utc>>,
}

/// An ajax endpoint a sub-application registers under a case-insensitive name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AjaxRequest {
    pub name: String,
    #[serde(default)]
    pub ajax_endpoint: Option<String>,
    #[serde(default)]
    pub no_cache: bool,
    #[serde(default)]
    pub offline_html: Option<String>,
    #[serde(default)]
    pub date_of_registration: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified_date: Option<DateTime<Utc>>,
}

/// Externally-sourced locations for one content item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageLocation {
    #[serde(default)]
    pub locations: Vec<String>,
}

/// The canonical per-path registration document. `path` is both the business
/// key and the storage partition key; the store is keyed by it, so at most
/// one document exists per path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRegistration {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub path: String,
    #[serde(default)]
    pub layout: Option<String>,
    #[serde(default)]
    pub top_navigation_text: Option<String>,
    #[serde(default)]
    pub top_navigation_order: Option<i32>,
    #[serde(default)]
    pub cdn_location: Option<String>,
    #[serde(default)]
    pub offline_html: Option<String>,
    #[serde(default)]
    pub phase_banner_html: Option<String>,
    #[serde(default)]
    pub sitemap_url: Option<String>,
    #[serde(default)]
    pub external_url: Option<String>,
    #[serde(default)]
    pub robots_url: Option<String>,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub is_interactive_app: bool,
    #[serde(default)]
    pub regions: Vec<Region>,
    #[serde(default)]
    pub ajax_requests: Vec<AjaxRequest>,
    #[serde(default)]
    pub page_locations: Option<HashMap<Uuid, PageLocation>>,
    #[serde(default)]
    pub java_script_names: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub css_script_names: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub date_of_registration: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified_date: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl AppRegistration {
    /// An empty registration for `path`, as instantiated by the legacy
    /// reconciliation engine when a path event arrives for an unknown path.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            path: path.into(),
            layout: None,
            top_navigation_text: None,
            top_navigation_order: None,
            cdn_location: None,
            offline_html: None,
            phase_banner_html: None,
            sitemap_url: None,
            external_url: None,
            robots_url: None,
            is_online: false,
            is_interactive_app: false,
            regions: Vec::new(),
            ajax_requests: Vec::new(),
            page_locations: None,
            java_script_names: BTreeMap::new(),
            css_script_names: BTreeMap::new(),
            date_of_registration: None,
            last_modified_date: None,
        }
    }

    /// First region entry for `slot`, if any.
    pub fn region(&self, slot: PageRegion) -> Option<&Region> {
        self.regions.iter().find(|region| region.page_region == slot)
    }

    /// First ajax request whose name matches `name` case-insensitively.
    pub fn ajax_request(&self, name: &str) -> Option<&AjaxRequest> {
        self.ajax_requests
            .iter()
            .find(|request| request.name.eq_ignore_ascii_case(name))
    }

    /// Replace-or-insert the entry for `region.page_region`. Removing any
    /// existing entry first is what makes redelivery of the same region
    /// event idempotent: the list never grows a duplicate slot.
    pub fn upsert_region(&mut self, region: Region) {
        self.regions
            .retain(|existing| existing.page_region != region.page_region);
        self.regions.push(region);
    }

    /// Replace-or-insert the entry for `request.name` (case-insensitive key).
    pub fn upsert_ajax_request(&mut self, request: AjaxRequest) {
        self.ajax_requests
            .retain(|existing| !existing.name.eq_ignore_ascii_case(&request.name));
        self.ajax_requests.push(request);
    }

    /// Whether the asset-hash refresher should visit this registration.
    pub fn has_scripts(&self) -> bool {
        !self.java_script_names.is_empty()
    }
}
