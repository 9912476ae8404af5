pub mod config;
pub mod gateway;
pub mod lifecycle;
pub mod metrics;
pub mod record;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use gateway::{ApsGateway, GatewayError, Manifest, ManifestStatus, TranslationGateway};
pub use lifecycle::{IngestRequest, LifecycleConfig, LifecycleController, LifecycleError};
pub use record::{
    MetadataUpdate, ModelRecord, RecordError, RecordFilter, RecordStatus, RecordStore,
    SqliteRecordStore,
};
