//! Beat configuration.
//!
//! Loaded from a YAML file whose `wmibeat-ohm2` section (or the whole
//! document, if that key is absent) looks like:
//!
//! ```yaml
//! wmibeat-ohm2:
//!   period: 10s
//!   classes:
//!     - class: Win32_Fan
//!       fields: [Name, DesiredSpeed]
//!       objecttitlecolumn: Name
//!   namespaces:
//!     - namespace: OpenHardwareMonitor
//!       class: Sensor
//!       metric_name_combined_fields: [SensorType, Name]
//!       metric_value_field: Value
//!       whereclause: SensorType = 'Temperature'
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::util::parse_duration;

/// Name of the configuration section.
pub const CONFIG_SECTION: &str = "wmibeat-ohm2";

/// Poll period used when none is configured.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be read.
    Io(std::io::Error),
    /// Config file is not valid YAML or has the wrong shape.
    Parse(serde_yaml::Error),
    /// Config parsed but violates a constraint.
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "cannot read config: {}", e),
            ConfigError::Parse(e) => write!(f, "cannot parse config: {}", e),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(e: serde_yaml::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// A request for all rows of one class with a fixed projection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClassQuery {
    pub class: String,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default, rename = "whereclause", deserialize_with = "empty_as_none")]
    pub where_clause: Option<String>,
    /// Field whose value keys the rows of this class.
    #[serde(default, rename = "objecttitlecolumn", deserialize_with = "empty_as_none")]
    pub title_field: Option<String>,
}

impl ClassQuery {
    pub fn new(class: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            class: class.into(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            where_clause: None,
            title_field: None,
        }
    }

    pub fn with_title(mut self, field: impl Into<String>) -> Self {
        self.title_field = Some(field.into());
        self
    }

    pub fn with_where(mut self, clause: impl Into<String>) -> Self {
        self.where_clause = Some(clause.into());
        self
    }

    /// Classes without fields are never polled.
    pub fn is_eligible(&self) -> bool {
        !self.fields.is_empty()
    }
}

/// A request that flattens rows of one class into individually named metrics.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NamespaceQuery {
    /// Namespace below `root\`, e.g. `OpenHardwareMonitor`.
    pub namespace: String,
    pub class: String,
    /// Fields whose values are appended to the metric name, in order.
    #[serde(default, rename = "metric_name_combined_fields")]
    pub name_fields: Vec<String>,
    /// Field holding the metric value.
    #[serde(rename = "metric_value_field")]
    pub value_field: String,
    #[serde(default, rename = "whereclause", deserialize_with = "empty_as_none")]
    pub where_clause: Option<String>,
}

impl NamespaceQuery {
    pub fn new(
        namespace: impl Into<String>,
        class: impl Into<String>,
        name_fields: &[&str],
        value_field: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            class: class.into(),
            name_fields: name_fields.iter().map(|f| f.to_string()).collect(),
            value_field: value_field.into(),
            where_clause: None,
        }
    }

    pub fn with_where(mut self, clause: impl Into<String>) -> Self {
        self.where_clause = Some(clause.into());
        self
    }

    /// Provider path of the namespace, e.g. `root\OpenHardwareMonitor`.
    pub fn path(&self) -> String {
        format!("root\\{}", self.namespace)
    }

    /// Name fields followed by the value field.
    pub fn projected_fields(&self) -> Vec<String> {
        let mut fields = self.name_fields.clone();
        fields.push(self.value_field.clone());
        fields
    }
}

/// The `wmibeat-ohm2` configuration section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BeatConfig {
    #[serde(default = "default_period", deserialize_with = "deserialize_period")]
    pub period: Duration,
    #[serde(default)]
    pub classes: Vec<ClassQuery>,
    #[serde(default)]
    pub namespaces: Vec<NamespaceQuery>,
}

impl Default for BeatConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            classes: Vec::new(),
            namespaces: Vec::new(),
        }
    }
}

impl BeatConfig {
    /// Loads and validates the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parses and validates configuration from YAML text.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let document: serde_yaml::Value = serde_yaml::from_str(content)?;
        let section = match document.get(CONFIG_SECTION) {
            Some(section) => section.clone(),
            None => document,
        };

        let config = if section.is_null() {
            Self::default()
        } else {
            serde_yaml::from_value(section)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks constraints serde cannot express.
    ///
    /// Classes without fields are not rejected here; the collector warns
    /// about them and leaves them out.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.period.is_zero() {
            return Err(ConfigError::Invalid("period must be positive".to_string()));
        }

        for (i, class) in self.classes.iter().enumerate() {
            if class.class.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("classes[{}]: empty class", i)));
            }
        }

        for (i, ns) in self.namespaces.iter().enumerate() {
            if ns.namespace.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "namespaces[{}]: empty namespace",
                    i
                )));
            }
            if ns.class.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "namespaces[{}]: empty class",
                    i
                )));
            }
            if ns.value_field.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "namespaces[{}]: empty metric_value_field",
                    i
                )));
            }
            if ns.name_fields.contains(&ns.value_field) {
                return Err(ConfigError::Invalid(format!(
                    "namespaces[{}]: metric_value_field {} is also a name field",
                    i, ns.value_field
                )));
            }
        }

        Ok(())
    }
}

fn default_period() -> Duration {
    DEFAULT_PERIOD
}

fn deserialize_period<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Period {
        Seconds(u64),
        Text(String),
    }

    match Period::deserialize(deserializer)? {
        Period::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Period::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

fn empty_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
wmibeat-ohm2:
  period: 10s
  classes:
    - class: Win32_Fan
      fields: [Name, DesiredSpeed]
      objecttitlecolumn: Name
    - class: Win32_PerfFormattedData_PerfOS_Memory
      fields: [AvailableMBytes]
      whereclause: ""
    - class: Win32_Empty
  namespaces:
    - namespace: OpenHardwareMonitor
      class: Sensor
      metric_name_combined_fields: [SensorType, Name]
      metric_value_field: Value
      whereclause: SensorType = 'Temperature'
"#;

    #[test]
    fn test_load_sample() {
        let config = BeatConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(config.period, Duration::from_secs(10));
        assert_eq!(config.classes.len(), 3);

        let fan = &config.classes[0];
        assert_eq!(fan.class, "Win32_Fan");
        assert_eq!(fan.fields, vec!["Name", "DesiredSpeed"]);
        assert_eq!(fan.title_field.as_deref(), Some("Name"));
        assert!(fan.where_clause.is_none());

        assert!(config.classes[1].where_clause.is_none());
        assert!(!config.classes[2].is_eligible());

        let ns = &config.namespaces[0];
        assert_eq!(ns.path(), "root\\OpenHardwareMonitor");
        assert_eq!(ns.projected_fields(), vec!["SensorType", "Name", "Value"]);
        assert_eq!(ns.where_clause.as_deref(), Some("SensorType = 'Temperature'"));
    }

    #[test]
    fn test_bare_section_and_defaults() {
        let config = BeatConfig::from_yaml_str("classes:\n  - class: Win32_Fan\n    fields: [Name]\n")
            .unwrap();
        assert_eq!(config.period, DEFAULT_PERIOD);
        assert_eq!(config.classes.len(), 1);

        let empty = BeatConfig::from_yaml_str("").unwrap();
        assert_eq!(empty, BeatConfig::default());
    }

    #[test]
    fn test_only_empty_optional_keys_are_absent() {
        let yaml = r#"
classes:
  - class: Win32_Fan
    fields: [Name]
    objecttitlecolumn: ''
    whereclause: ' '
"#;
        let config = BeatConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.classes[0].title_field, None);
        assert_eq!(config.classes[0].where_clause.as_deref(), Some(" "));
    }

    #[test]
    fn test_period_as_seconds() {
        let config = BeatConfig::from_yaml_str("period: 30").unwrap();
        assert_eq!(config.period, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_configs() {
        assert!(matches!(
            BeatConfig::from_yaml_str("period: 0s"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            BeatConfig::from_yaml_str("period: soon"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            BeatConfig::from_yaml_str(
                "namespaces:\n  - namespace: OHM\n    class: Sensor\n    metric_value_field: \"\"\n"
            ),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            BeatConfig::from_yaml_str(
                "namespaces:\n  - namespace: OHM\n    class: Sensor\n    metric_name_combined_fields: [Value]\n    metric_value_field: Value\n"
            ),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wmibeat.yml");
        std::fs::write(&path, SAMPLE).unwrap();
        assert_eq!(BeatConfig::load(&path).unwrap().classes.len(), 3);

        assert!(matches!(
            BeatConfig::load(&dir.path().join("missing.yml")),
            Err(ConfigError::Io(_))
        ));
    }
}
