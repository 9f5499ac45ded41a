//! FHIR access for IBS Care.
//!
//! - [`FhirClient`] performs bearer-authenticated reads, searches and creates
//!   against the tenant's FHIR base.
//! - [`model`] turns raw FHIR JSON into the view-models the dashboard serves.
//! - [`dashboard`] loads every clinical panel concurrently.
//! - [`scoring`] talks to the IBS analysis and prediction backend.

pub mod client;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod model;
pub mod scoring;

pub use client::FhirClient;
pub use config::{FhirSettings, ScoringSettings};
pub use dashboard::{Dashboard, ResourceState, load_dashboard, load_processed_data};
pub use error::{FhirClientError, FhirResult};
pub use scoring::{IbsAssessment, ProcessedFhirData, ScoringClient, ScoringError};
