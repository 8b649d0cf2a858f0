use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{AppRegistration, PageRegion, Region};

/// Flat per-path document from the legacy change feed. Carries its own
/// document id; scalar fields only, regions arrive on their own stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyPathRecord {
    pub document_id: Uuid,
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
}

/// Per-path+region document from the legacy change feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyRegionRecord {
    pub path: String,
    pub page_region: PageRegion,
    #[serde(default)]
    pub region_endpoint: Option<String>,
    #[serde(default)]
    pub offline_html: Option<String>,
    #[serde(default)]
    pub hide_on_mobile: bool,
    #[serde(default = "default_true")]
    pub is_healthy: bool,
}

fn default_true() -> bool {
    true
}

/// Copies the legacy scalar fields onto the registration. Never touches
/// `regions` or any other collection; the region stream owns those.
pub fn apply_path_record(record: &LegacyPathRecord, registration: &mut AppRegistration) {
    registration.path = record.path.clone();
    registration.layout = record.layout.clone();
    registration.top_navigation_text = record.top_navigation_text.clone();
    registration.top_navigation_order = record.top_navigation_order;
    registration.cdn_location = record.cdn_location.clone();
    registration.offline_html = record.offline_html.clone();
    registration.phase_banner_html = record.phase_banner_html.clone();
    registration.sitemap_url = record.sitemap_url.clone();
    registration.external_url = record.external_url.clone();
    registration.robots_url = record.robots_url.clone();
    registration.is_online = record.is_online;
    registration.is_interactive_app = record.is_interactive_app;
}

/// Builds the registration-side region entry for a legacy region record.
/// Timestamps are stamped by the reconciliation engine at write time.
pub fn region_from_record(record: &LegacyRegionRecord) -> Region {
    Region {
        page_region: record.page_region,
        region_endpoint: record.region_endpoint.clone(),
        offline_html: record.offline_html.clone(),
        hide_on_mobile: record.hide_on_mobile,
        is_healthy: record.is_healthy,
        date_of_registration: None,
        last_modified_date: None,
    }
}
