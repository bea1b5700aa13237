pub mod model_instance;
pub(crate) mod translator_contract;
pub mod watsonx;
pub mod watsonx_translate;
