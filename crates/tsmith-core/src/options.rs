//! Compiler option schema and effective option sets.
//!
//! Options form a closed, enumerated schema ([`CompilerOption`]). Keys outside
//! the schema are kept verbatim in a passthrough bucket so that reading and
//! rewriting a configuration never loses data.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Allowed values for `target`.
pub const TARGET_VALUES: &[&str] = &[
    "ES3", "ES5", "ES6", "ES2015", "ES2016", "ES2017", "ES2018", "ES2019", "ES2020", "ES2021",
    "ES2022", "ESNext",
];

/// Allowed values for `module`.
pub const MODULE_VALUES: &[&str] = &[
    "None", "CommonJS", "AMD", "System", "UMD", "ES6", "ES2015", "ES2020", "ES2022", "ESNext",
];

/// Allowed values for `moduleResolution`.
pub const MODULE_RESOLUTION_VALUES: &[&str] = &["node", "classic"];

/// Value shape of a schema option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Bool,
    /// Free-form path; made absolute by config parsing.
    Path,
    /// String restricted to a fixed set, compared case-insensitively.
    Enum(&'static [&'static str]),
    List,
}

/// Options known to the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CompilerOption {
    Target,
    Module,
    ModuleResolution,
    Strict,
    EsModuleInterop,
    SkipLibCheck,
    ForceConsistentCasingInFileNames,
    Declaration,
    DeclarationMap,
    SourceMap,
    NoEmit,
    OutDir,
    RootDir,
    BaseUrl,
    Lib,
}

impl CompilerOption {
    pub const ALL: &'static [CompilerOption] = &[
        Self::Target,
        Self::Module,
        Self::ModuleResolution,
        Self::Strict,
        Self::EsModuleInterop,
        Self::SkipLibCheck,
        Self::ForceConsistentCasingInFileNames,
        Self::Declaration,
        Self::DeclarationMap,
        Self::SourceMap,
        Self::NoEmit,
        Self::OutDir,
        Self::RootDir,
        Self::BaseUrl,
        Self::Lib,
    ];

    /// Name as spelled in `compilerOptions`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Target => "target",
            Self::Module => "module",
            Self::ModuleResolution => "moduleResolution",
            Self::Strict => "strict",
            Self::EsModuleInterop => "esModuleInterop",
            Self::SkipLibCheck => "skipLibCheck",
            Self::ForceConsistentCasingInFileNames => "forceConsistentCasingInFileNames",
            Self::Declaration => "declaration",
            Self::DeclarationMap => "declarationMap",
            Self::SourceMap => "sourceMap",
            Self::NoEmit => "noEmit",
            Self::OutDir => "outDir",
            Self::RootDir => "rootDir",
            Self::BaseUrl => "baseUrl",
            Self::Lib => "lib",
        }
    }

    pub fn kind(self) -> OptionKind {
        match self {
            Self::Target => OptionKind::Enum(TARGET_VALUES),
            Self::Module => OptionKind::Enum(MODULE_VALUES),
            Self::ModuleResolution => OptionKind::Enum(MODULE_RESOLUTION_VALUES),
            Self::Strict
            | Self::EsModuleInterop
            | Self::SkipLibCheck
            | Self::ForceConsistentCasingInFileNames
            | Self::Declaration
            | Self::DeclarationMap
            | Self::SourceMap
            | Self::NoEmit => OptionKind::Bool,
            Self::OutDir | Self::RootDir | Self::BaseUrl => OptionKind::Path,
            Self::Lib => OptionKind::List,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|o| o.name() == name)
    }
}

impl fmt::Display for CompilerOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed option value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Text(String),
    List(Vec<String>),
}

impl OptionValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Text(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().cloned().map(Value::String).collect()),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<String>> for OptionValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

/// Why a JSON value was rejected for a schema option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionError {
    /// Value has the wrong JSON type.
    WrongType {
        option: CompilerOption,
        expected: &'static str,
    },
    /// Enum-valued option with a value outside its allowed set.
    NotAllowed {
        option: CompilerOption,
        value: String,
    },
}

impl OptionError {
    pub fn option(&self) -> CompilerOption {
        match self {
            Self::WrongType { option, .. } | Self::NotAllowed { option, .. } => *option,
        }
    }
}

impl fmt::Display for OptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongType { option, expected } => {
                write!(f, "Compiler option '{}' requires a value of type {}.", option, expected)
            }
            Self::NotAllowed { option, .. } => {
                let allowed = match option.kind() {
                    OptionKind::Enum(values) => values.join(", "),
                    _ => String::new(),
                };
                write!(f, "Argument for '--{}' option must be: {}.", option, allowed)
            }
        }
    }
}

/// Parse one JSON value against the schema entry for `option`.
pub fn parse_option_value(option: CompilerOption, value: &Value) -> Result<OptionValue, OptionError> {
    match option.kind() {
        OptionKind::Bool => value.as_bool().map(OptionValue::Bool).ok_or(OptionError::WrongType {
            option,
            expected: "boolean",
        }),
        OptionKind::Path => value
            .as_str()
            .map(|s| OptionValue::Text(s.to_string()))
            .ok_or(OptionError::WrongType {
                option,
                expected: "string",
            }),
        OptionKind::Enum(allowed) => {
            let text = value.as_str().ok_or(OptionError::WrongType {
                option,
                expected: "string",
            })?;
            if allowed.iter().any(|a| a.eq_ignore_ascii_case(text)) {
                Ok(OptionValue::Text(text.to_string()))
            } else {
                Err(OptionError::NotAllowed {
                    option,
                    value: text.to_string(),
                })
            }
        }
        OptionKind::List => {
            let items = value.as_array().ok_or(OptionError::WrongType {
                option,
                expected: "list",
            })?;
            items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .map(OptionValue::List)
                .ok_or(OptionError::WrongType {
                    option,
                    expected: "list",
                })
        }
    }
}

/// Where an effective option value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionSource {
    Default,
    Config,
    Request,
}

/// A flat option set: schema options plus an unvalidated passthrough bucket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectiveOptions {
    values: BTreeMap<CompilerOption, OptionValue>,
    passthrough: Map<String, Value>,
}

impl EffectiveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, option: CompilerOption, value: impl Into<OptionValue>) -> Self {
        self.set(option, value);
        self
    }

    pub fn set(&mut self, option: CompilerOption, value: impl Into<OptionValue>) {
        self.values.insert(option, value.into());
    }

    pub fn remove(&mut self, option: CompilerOption) -> Option<OptionValue> {
        self.values.remove(&option)
    }

    pub fn get(&self, option: CompilerOption) -> Option<&OptionValue> {
        self.values.get(&option)
    }

    pub fn get_bool(&self, option: CompilerOption) -> Option<bool> {
        self.get(option).and_then(OptionValue::as_bool)
    }

    pub fn get_str(&self, option: CompilerOption) -> Option<&str> {
        self.get(option).and_then(OptionValue::as_str)
    }

    /// Unknown keys, preserved verbatim.
    pub fn passthrough(&self) -> &Map<String, Value> {
        &self.passthrough
    }

    pub fn set_passthrough(&mut self, key: impl Into<String>, value: Value) {
        self.passthrough.insert(key.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.passthrough.is_empty()
    }

    /// Schema entries in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (CompilerOption, &OptionValue)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }

    /// Every key name, schema and passthrough alike.
    pub fn keys(&self) -> Vec<String> {
        self.values
            .keys()
            .map(|k| k.name().to_string())
            .chain(self.passthrough.keys().cloned())
            .collect()
    }

    /// Build from a `compilerOptions` JSON object.
    ///
    /// Schema keys with rejected values are dropped and reported; unknown keys
    /// go to the passthrough bucket.
    pub fn from_json_map(map: &Map<String, Value>) -> (Self, Vec<OptionError>) {
        let mut options = Self::new();
        let mut errors = Vec::new();

        for (key, value) in map {
            match CompilerOption::from_name(key) {
                Some(option) => match parse_option_value(option, value) {
                    Ok(parsed) => options.set(option, parsed),
                    Err(e) => errors.push(e),
                },
                None => options.set_passthrough(key.clone(), value.clone()),
            }
        }

        (options, errors)
    }

    /// Render as a `compilerOptions` JSON object.
    pub fn to_json_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        for (option, value) in &self.values {
            map.insert(option.name().to_string(), value.to_json());
        }
        for (key, value) in &self.passthrough {
            map.insert(key.clone(), value.clone());
        }
        map
    }

    /// Keys of `overlay` replace keys of `self`; everything else is kept.
    pub fn overlay(mut self, overlay: &EffectiveOptions) -> Self {
        for (option, value) in &overlay.values {
            self.values.insert(*option, value.clone());
        }
        for (key, value) in &overlay.passthrough {
            self.passthrough.insert(key.clone(), value.clone());
        }
        self
    }
}

/// Effective options together with the origin of every key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayeredOptions {
    pub options: EffectiveOptions,
    pub origins: BTreeMap<String, OptionSource>,
}

impl LayeredOptions {
    pub fn origin(&self, key: &str) -> Option<OptionSource> {
        self.origins.get(key).copied()
    }
}

/// Merge three layers under the fixed rule request > config > default.
///
/// This is the only place precedence is decided; every compile and check path
/// goes through it.
pub fn layer(
    defaults: &EffectiveOptions,
    config: &EffectiveOptions,
    request: &EffectiveOptions,
) -> LayeredOptions {
    let mut origins = BTreeMap::new();
    for (source, layer) in [
        (OptionSource::Default, defaults),
        (OptionSource::Config, config),
        (OptionSource::Request, request),
    ] {
        for key in layer.keys() {
            origins.insert(key, source);
        }
    }

    let options = defaults.clone().overlay(config).overlay(request);
    LayeredOptions { options, origins }
}

/// ECMAScript target levels, ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScriptTarget {
    Es3,
    Es5,
    Es2015,
    Es2016,
    Es2017,
    Es2018,
    Es2019,
    Es2020,
    Es2021,
    Es2022,
    EsNext,
}

impl ScriptTarget {
    /// Parse a `target` value; `ES6` is an alias of `ES2015`.
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value.to_uppercase().as_str() {
            "ES3" => Self::Es3,
            "ES5" => Self::Es5,
            "ES6" | "ES2015" => Self::Es2015,
            "ES2016" => Self::Es2016,
            "ES2017" => Self::Es2017,
            "ES2018" => Self::Es2018,
            "ES2019" => Self::Es2019,
            "ES2020" => Self::Es2020,
            "ES2021" => Self::Es2021,
            "ES2022" => Self::Es2022,
            "ESNEXT" => Self::EsNext,
            _ => return None,
        })
    }
}
