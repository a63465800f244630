//! Built-in SimpleOBS components.
//!
//! Small, dependency-free implementations of every capability contract,
//! used by the CLI and as a reference for third-party plugins.

pub mod encoder;
pub mod filter;
pub mod output;
pub mod source;

pub use encoder::RawEncoder;
pub use filter::GainFilter;
pub use output::{FileOutput, NullOutput};
pub use source::{ColorSource, MediaFormat, ToneSource};

use simpleobs_common::config::AppConfig;
use simpleobs_engine::ComponentRegistry;

pub const COLOR_SOURCE: &str = "color_source";
pub const TONE_SOURCE: &str = "tone_source";
pub const RAW_ENCODER: &str = "raw_encoder";
pub const NULL_OUTPUT: &str = "null_output";
pub const FILE_OUTPUT: &str = "file_output";
pub const GAIN_FILTER: &str = "gain_filter";

/// Register every built-in factory. Sources produce frames in the format
/// described by `config`.
pub fn register_builtins(registry: &ComponentRegistry, config: &AppConfig) {
    let format = MediaFormat::from_app_config(config);

    registry.register_source(COLOR_SOURCE, move |name: &str| {
        Ok(ColorSource::new(name, format))
    });
    registry.register_source(TONE_SOURCE, move |name: &str| {
        Ok(ToneSource::new(name, format))
    });
    registry.register_encoder(RAW_ENCODER, |name: &str| Ok(RawEncoder::new(name)));
    registry.register_output(NULL_OUTPUT, |name: &str| Ok(NullOutput::new(name)));
    registry.register_output(FILE_OUTPUT, FileOutput::from_name);
    registry.register_filter(GAIN_FILTER, |name: &str| Ok(GainFilter::new(name, 1.0)));

    tracing::debug!(factories = registry.len(), "Registered built-in components");
}

#[cfg(test)]
mod tests {
    use super::*;
    use simpleobs_engine::ComponentKind;

    #[test]
    fn test_register_builtins_covers_every_kind() {
        let registry = ComponentRegistry::new();
        register_builtins(&registry, &AppConfig::default());

        assert_eq!(
            registry.type_ids(ComponentKind::Source),
            vec![COLOR_SOURCE, TONE_SOURCE]
        );
        assert_eq!(registry.type_ids(ComponentKind::Encoder), vec![RAW_ENCODER]);
        assert_eq!(
            registry.type_ids(ComponentKind::Output),
            vec![FILE_OUTPUT, NULL_OUTPUT]
        );
        assert_eq!(registry.type_ids(ComponentKind::Filter), vec![GAIN_FILTER]);
    }

    #[test]
    fn test_created_components_keep_their_names() {
        let registry = ComponentRegistry::new();
        register_builtins(&registry, &AppConfig::default());

        let source = registry.create_source(COLOR_SOURCE, "Background").unwrap();
        assert_eq!(source.name(), "Background");
        assert_eq!(source.component_type(), COLOR_SOURCE);

        let output = registry.create_output(NULL_OUTPUT, "sink").unwrap();
        assert_eq!(output.component_type(), NULL_OUTPUT);
    }

    #[test]
    fn test_same_name_instances_get_distinct_ids() {
        let registry = ComponentRegistry::new();
        register_builtins(&registry, &AppConfig::default());

        let first = registry.create_source(TONE_SOURCE, "Tone").unwrap();
        let second = registry.create_source(TONE_SOURCE, "Tone").unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(first.id(), first.id());
    }

    #[test]
    fn test_file_output_rejects_empty_path() {
        let registry = ComponentRegistry::new();
        register_builtins(&registry, &AppConfig::default());
        assert!(registry.create_output(FILE_OUTPUT, "").is_err());
    }
}
