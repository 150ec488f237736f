//! Application status derived from the state of an application's features and
//! bundles. Nothing here is stored; the status is recomputed on every call.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleState {
    Installed,
    Resolved,
    Starting,
    Stopping,
    Active,
    Uninstalled,
}

/// State reported by the dependency-injection layer on top of the bundle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtendedBundleState {
    Active,
    Failure,
    Waiting,
    Starting,
    GracePeriod,
    Stopping,
    Installed,
    Resolved,
    /// Not managed by the injection layer.
    #[default]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleInfo {
    pub symbolic_name: String,
    pub state: BundleState,
    #[serde(default)]
    pub extended_state: ExtendedBundleState,
    #[serde(default)]
    pub fragment: bool,
}

impl BundleInfo {
    pub fn new(symbolic_name: &str, state: BundleState) -> Self {
        Self {
            symbolic_name: symbolic_name.to_string(),
            state,
            extended_state: ExtendedBundleState::Unknown,
            fragment: false,
        }
    }

    pub fn with_extended_state(mut self, extended_state: ExtendedBundleState) -> Self {
        self.extended_state = extended_state;
        self
    }

    pub fn fragment(mut self) -> Self {
        self.fragment = true;
        self
    }

    fn is_active(&self) -> bool {
        let state_active =
            self.state == BundleState::Active || (self.fragment && self.state == BundleState::Resolved);
        let extended_active = matches!(
            self.extended_state,
            ExtendedBundleState::Active | ExtendedBundleState::Unknown
        );
        state_active && extended_active
    }

    fn is_failed(&self) -> bool {
        self.state == BundleState::Installed
            || (self.state == BundleState::Resolved && !self.fragment)
            || self.extended_state == ExtendedBundleState::Failure
    }

    fn is_transitional(&self) -> bool {
        matches!(self.state, BundleState::Starting | BundleState::Stopping)
            || matches!(
                self.extended_state,
                ExtendedBundleState::Waiting
                    | ExtendedBundleState::Starting
                    | ExtendedBundleState::GracePeriod
                    | ExtendedBundleState::Stopping
            )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureInfo {
    pub name: String,
    pub installed: bool,
}

impl FeatureInfo {
    pub fn new(name: &str, installed: bool) -> Self {
        Self {
            name: name.to_string(),
            installed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub name: String,
    #[serde(default)]
    pub main_feature: Option<String>,
    #[serde(default)]
    pub features: Vec<FeatureInfo>,
    #[serde(default)]
    pub bundles: Vec<BundleInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationState {
    Active,
    Inactive,
    Failed,
    Unknown,
}

impl fmt::Display for ApplicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ApplicationState::Active => "ACTIVE",
            ApplicationState::Inactive => "INACTIVE",
            ApplicationState::Failed => "FAILED",
            ApplicationState::Unknown => "UNKNOWN",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationStatus {
    pub application: String,
    pub state: ApplicationState,
    pub error_features: Vec<String>,
    pub error_bundles: Vec<String>,
}

impl ApplicationStatus {
    fn unknown(application: &Application) -> Self {
        Self {
            application: application.name.clone(),
            state: ApplicationState::Unknown,
            error_features: Vec::new(),
            error_bundles: Vec::new(),
        }
    }
}

/// Derives the status of `application`.
///
/// * `ACTIVE`: the main feature (every feature when there is none) is installed
///   and every bundle is active.
/// * `FAILED`: the features are installed but some bundle is installed only,
///   resolved without being a fragment, or failed in the injection layer.
/// * `INACTIVE`: the features are not installed and no bundle is failing or in
///   transition.
/// * `UNKNOWN`: anything else, including a main feature the application does
///   not list.
pub fn compute_status(application: &Application) -> ApplicationStatus {
    let features_installed = match &application.main_feature {
        Some(main) => match application.features.iter().find(|feature| &feature.name == main) {
            Some(feature) => feature.installed,
            None => {
                debug!(application = %application.name, feature = %main, "main feature not listed");
                return ApplicationStatus::unknown(application);
            }
        },
        None if application.features.is_empty() => {
            return ApplicationStatus::unknown(application);
        }
        None => application.features.iter().all(|feature| feature.installed),
    };

    let error_features = application
        .features
        .iter()
        .filter(|feature| !feature.installed)
        .map(|feature| feature.name.clone())
        .collect::<Vec<_>>();
    let error_bundles = application
        .bundles
        .iter()
        .filter(|bundle| bundle.is_failed())
        .map(|bundle| bundle.symbolic_name.clone())
        .collect::<Vec<_>>();
    let transitional = application.bundles.iter().any(BundleInfo::is_transitional);

    let state = if features_installed {
        if application.bundles.iter().all(BundleInfo::is_active) {
            ApplicationState::Active
        } else if !error_bundles.is_empty() {
            ApplicationState::Failed
        } else {
            ApplicationState::Unknown
        }
    } else {
        let failing = application
            .bundles
            .iter()
            .any(|bundle| bundle.extended_state == ExtendedBundleState::Failure);
        if failing || transitional {
            ApplicationState::Unknown
        } else {
            ApplicationState::Inactive
        }
    };

    ApplicationStatus {
        application: application.name.clone(),
        state,
        error_features,
        error_bundles,
    }
}
