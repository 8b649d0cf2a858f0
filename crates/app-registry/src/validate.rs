use once_cell::sync::Lazy;
use regex::Regex;

use crate::markup;
use crate::model::{AjaxRequest, AppRegistration, Region};

/// Path segments: letters, digits, `.`, `,`, `/`, `-`, `_`, starting and
/// ending with an alphanumeric.
#[allow(clippy::expect_used)]
static PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9.,/_-]*[A-Za-z0-9])?$").expect("path pattern compiles")
});

/// Placeholder token callers may embed in endpoint URLs; substituted before
/// the absolute-URL check.
const ENDPOINT_PLACEHOLDER: &str = "{0}";

/// One field-level validation failure. `field` is a dotted path into the
/// aggregate (`regions[2].regionEndpoint`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub field: String,
    pub message: String,
}

impl ValidationFailure {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn is_valid_path(path: &str) -> bool {
    !path.is_empty() && PATH_PATTERN.is_match(path)
}

/// Whether `value` resolves to an absolute URL once any `{0}` placeholder is
/// substituted. Relative references fail to parse without a base, which is
/// exactly the required check.
pub fn is_absolute_endpoint(value: &str) -> bool {
    let substituted = value.replace(ENDPOINT_PLACEHOLDER, "0");
    reqwest::Url::parse(&substituted).is_ok()
}

/// Walks the whole aggregate, including nested regions and ajax requests,
/// into a flat failure list. Never mutates its input and never fails on
/// malformed field values; malformed values become failures.
pub fn validate_registration(registration: &AppRegistration) -> Vec<ValidationFailure> {
    let mut failures = Vec::new();

    if registration.path.trim().is_empty() {
        failures.push(ValidationFailure::new("path", "path is required"));
    } else if !is_valid_path(&registration.path) {
        failures.push(ValidationFailure::new(
            "path",
            "path may contain letters, digits, '.', ',', '/', '-' and '_', and must start and end with a letter or digit",
        ));
    }

    check_markup(&mut failures, "offlineHtml", registration.offline_html.as_deref());
    check_markup(
        &mut failures,
        "phaseBannerHtml",
        registration.phase_banner_html.as_deref(),
    );

    for (index, region) in registration.regions.iter().enumerate() {
        for failure in validate_region(region) {
            failures.push(ValidationFailure::new(
                format!("regions[{index}].{}", failure.field),
                failure.message,
            ));
        }
    }

    for (index, request) in registration.ajax_requests.iter().enumerate() {
        for failure in validate_ajax_request(request) {
            failures.push(ValidationFailure::new(
                format!("ajaxRequests[{index}].{}", failure.field),
                failure.message,
            ));
        }
    }

    failures
}

/// Region self-validation: endpoint required and absolute, offline HTML
/// well formed if present.
pub fn validate_region(region: &Region) -> Vec<ValidationFailure> {
    let mut failures = Vec::new();
    check_endpoint(
        &mut failures,
        "regionEndpoint",
        region.region_endpoint.as_deref(),
    );
    check_markup(&mut failures, "offlineHtml", region.offline_html.as_deref());
    failures
}

/// Ajax request self-validation: non-empty name, endpoint required and
/// absolute, offline HTML well formed if present.
pub fn validate_ajax_request(request: &AjaxRequest) -> Vec<ValidationFailure> {
    let mut failures = Vec::new();
    if request.name.trim().is_empty() {
        failures.push(ValidationFailure::new("name", "name is required"));
    }
    check_endpoint(
        &mut failures,
        "ajaxEndpoint",
        request.ajax_endpoint.as_deref(),
    );
    check_markup(&mut failures, "offlineHtml", request.offline_html.as_deref());
    failures
}

fn check_endpoint(failures: &mut Vec<ValidationFailure>, field: &str, value: Option<&str>) {
    match value {
        None => failures.push(ValidationFailure::new(field, format!("{field} is required"))),
        Some(endpoint) if endpoint.trim().is_empty() => {
            failures.push(ValidationFailure::new(field, format!("{field} is required")));
        }
        Some(endpoint) if !is_absolute_endpoint(endpoint) => {
            failures.push(ValidationFailure::new(
                field,
                format!("{field} must be an absolute URL"),
            ));
        }
        Some(_) => {}
    }
}

fn check_markup(failures: &mut Vec<ValidationFailure>, field: &str, value: Option<&str>) {
    if let Some(fragment) = value
        && let Err(error) = markup::ensure_well_formed(fragment)
    {
        failures.push(ValidationFailure::new(field, error.to_string()));
    }
}
