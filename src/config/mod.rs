//! Configuration for ztp-e2e

pub mod settings;

pub use settings::{
    ArgoCdSettings, ClustersConfig, ConfigError, IbuSettings, PowerSettings, ReportSettings,
    Settings, TalmSettings,
};
