mod settings;

pub use settings::{
    Config, MimicDefaults, TomlConfig, TomlDefaults, DEFAULT_DEPTH, EXAMPLE_CONFIG,
};
