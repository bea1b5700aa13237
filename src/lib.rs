pub mod auth;
pub mod catalog;
pub mod core;
pub mod providers;
pub mod settings;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use crate::core::types::*;
pub use providers::model_instance::ModelInstance;
pub use providers::watsonx::WatsonxAdapter;
pub use settings::{CallSettings, SettingKey, SettingsContext};
