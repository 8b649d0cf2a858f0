#![cfg_attr(test, allow(clippy::panic, clippy::unwrap_used, clippy::expect_used))]

//! Canonical application-registration records for a composed web shell.
//!
//! One registration document exists per site path, describing how the shell
//! renders and routes to a registered sub-application: layout, page regions,
//! ajax endpoints, CDN script assets, and externally-sourced page locations.
//! Four independent producers mutate that document: the direct mutation
//! pipeline, the legacy change-feed reconciler, the page-location webhook
//! reconciler, and the periodic asset-hash refresher. Every merge is written
//! to converge under at-least-once, possibly out-of-order delivery.

pub mod assets;
pub mod config;
pub mod legacy;
pub mod mapper;
pub mod markup;
pub mod model;
pub mod mutation;
pub mod page_locations;
pub mod patch;
pub mod store;
pub mod validate;


pub use config::Config;
pub use model::{AjaxRequest, AppRegistration, PageLocation, PageRegion, Region};
pub use mutation::{MutationOutcome, MutationPipeline, ReplacedPayload, status_for};
pub use store::{FileRegistrationStore, RegistrationStore, UpsertOutcome};
