//! Collector that runs every configured class and namespace against one session.
//!
//! The `Collector` owns the query configuration and produces the merged
//! `wmi` mapping for one tick. It never keeps state between ticks.

use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use super::class::collect_class;
use super::namespace::collect_namespace;
use crate::config::{BeatConfig, ClassQuery, NamespaceQuery};
use crate::event::{WmiFields, WmiValue};
use crate::provider::Session;

/// Counters describing one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Classes that contributed an entry.
    pub classes: usize,
    /// Classes skipped because their query failed.
    pub classes_failed: usize,
    /// Namespace metrics written (before key merging).
    pub metrics: usize,
    /// Namespaces skipped because connecting or querying failed.
    pub namespaces_failed: usize,
    /// Rows dropped across all classes and namespaces.
    pub rows_dropped: usize,
    /// Time spent polling.
    pub elapsed: Duration,
}

/// Runs the configured queries and merges their output.
#[derive(Debug, Clone)]
pub struct Collector {
    classes: Vec<ClassQuery>,
    namespaces: Vec<NamespaceQuery>,
}

impl Collector {
    /// Creates a collector for the given configuration.
    ///
    /// Classes without fields are reported once here and never polled.
    pub fn new(config: &BeatConfig) -> Self {
        let classes = config
            .classes
            .iter()
            .filter(|class| {
                if !class.is_eligible() {
                    warn!("No fields defined for class {}. Skipping", class.class);
                }
                class.is_eligible()
            })
            .cloned()
            .collect();

        Self {
            classes,
            namespaces: config.namespaces.clone(),
        }
    }

    /// Classes that will be polled, in declaration order.
    pub fn classes(&self) -> &[ClassQuery] {
        &self.classes
    }

    /// Namespace entries that will be polled, in declaration order.
    pub fn namespaces(&self) -> &[NamespaceQuery] {
        &self.namespaces
    }

    /// Polls every class, then every namespace, and merges the results.
    ///
    /// Failures never escape: a class or namespace that cannot be queried is
    /// logged and left out. On key collisions the later write wins.
    pub fn poll(&self, session: &dyn Session) -> (WmiFields, TickReport) {
        let start = Instant::now();
        let mut fields = WmiFields::new();
        let mut report = TickReport::default();

        for class in &self.classes {
            match collect_class(session, class) {
                Ok(collection) => {
                    debug!(
                        "class `{}`: {} rows, {} dropped",
                        class.class,
                        collection.value.len(),
                        collection.dropped
                    );
                    report.classes += 1;
                    report.rows_dropped += collection.dropped;
                    fields.insert(class.class.clone(), WmiValue::Class(collection.value));
                }
                Err(e) => {
                    error!("cannot query class `{}`: {}", class.class, e);
                    report.classes_failed += 1;
                }
            }
        }

        for ns in &self.namespaces {
            match collect_namespace(session, ns) {
                Ok(collection) => {
                    debug!(
                        "namespace `{}` class `{}`: {} metrics, {} dropped",
                        ns.namespace,
                        ns.class,
                        collection.metrics.len(),
                        collection.dropped
                    );
                    report.metrics += collection.metrics.len();
                    report.rows_dropped += collection.dropped;
                    for (name, value) in collection.metrics {
                        fields.insert(name, WmiValue::Metric(value));
                    }
                }
                Err(e) => {
                    error!(
                        "cannot collect namespace `{}`, skipping it: {}",
                        ns.namespace, e
                    );
                    report.namespaces_failed += 1;
                }
            }
        }

        report.elapsed = start.elapsed();
        (fields, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::event::{ClassValue, RowValues};
    use crate::provider::mock::mock_row;
    use crate::provider::{DEFAULT_NAMESPACE, MockProvider, Provider, Value};

    const OHM: &str = "root\\OpenHardwareMonitor";

    fn config(classes: Vec<ClassQuery>, namespaces: Vec<NamespaceQuery>) -> BeatConfig {
        BeatConfig {
            classes,
            namespaces,
            ..BeatConfig::default()
        }
    }

    fn hardware() -> MockProvider {
        MockProvider::new()
            .with_rows(
                DEFAULT_NAMESPACE,
                "Fan",
                vec![
                    mock_row(&[("Name", Value::from("Fan1")), ("RPM", Value::from(1200))]),
                    mock_row(&[("Name", Value::from("Fan2")), ("RPM", Value::from(900))]),
                ],
            )
            .with_rows(
                DEFAULT_NAMESPACE,
                "Win32_Processor",
                vec![mock_row(&[("LoadPercentage", Value::from(7))])],
            )
            .with_rows(
                OHM,
                "Sensor",
                vec![mock_row(&[
                    ("SensorType", Value::from("Temperature")),
                    ("Name", Value::from("CPU Core #1")),
                    ("Value", Value::from("45.3")),
                ])],
            )
    }

    #[test]
    fn test_fan_class_end_to_end() {
        let provider = hardware();
        let collector = Collector::new(&config(
            vec![ClassQuery::new("Fan", &["Name", "RPM"]).with_title("Name")],
            Vec::new(),
        ));
        let session = provider.connect().unwrap();

        let (fields, report) = collector.poll(&*session);
        let json = serde_json::to_value(&fields).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "Fan": {
                    "Fan1": {"Name": "Fan1", "RPM": 1200},
                    "Fan2": {"Name": "Fan2", "RPM": 900}
                }
            })
        );
        assert_eq!(report.classes, 1);
        assert_eq!(report.rows_dropped, 0);
    }

    #[test]
    fn test_sensor_namespace_end_to_end() {
        let provider = hardware();
        let collector = Collector::new(&config(
            Vec::new(),
            vec![NamespaceQuery::new(
                "OpenHardwareMonitor",
                "Sensor",
                &["SensorType", "Name"],
                "Value",
            )],
        ));
        let session = provider.connect().unwrap();

        let (fields, report) = collector.poll(&*session);
        assert_eq!(
            fields.get("OpenHardwareMonitor_Sensor_Temperature_CPUCore1"),
            Some(&WmiValue::Metric("45.3".to_string()))
        );
        assert_eq!(report.metrics, 1);
    }

    #[test]
    fn test_class_without_fields_is_never_polled() {
        let provider = hardware();
        let collector = Collector::new(&config(
            vec![
                ClassQuery::new("Fan", &[]),
                ClassQuery::new("Win32_Processor", &["LoadPercentage"]),
            ],
            Vec::new(),
        ));
        assert_eq!(collector.classes().len(), 1);

        let session = provider.connect().unwrap();
        let (fields, _) = collector.poll(&*session);
        assert!(!fields.contains_key("Fan"));
        assert!(fields.contains_key("Win32_Processor"));
        assert_eq!(
            provider.executed_queries(),
            vec!["SELECT LoadPercentage FROM Win32_Processor"]
        );
    }

    #[test]
    fn test_failures_are_isolated() {
        let provider = hardware()
            .fail_execute("Fan")
            .fail_namespace("root\\Missing");
        let collector = Collector::new(&config(
            vec![
                ClassQuery::new("Fan", &["Name"]),
                ClassQuery::new("Win32_Processor", &["LoadPercentage"]),
            ],
            vec![
                NamespaceQuery::new("Missing", "Sensor", &["Name"], "Value"),
                NamespaceQuery::new("OpenHardwareMonitor", "Sensor", &["Name"], "Value"),
            ],
        ));
        let tracker = provider.tracker();
        let session = provider.connect().unwrap();

        let (fields, report) = collector.poll(&*session);
        assert!(!fields.contains_key("Fan"));
        assert_eq!(
            fields.get("Win32_Processor"),
            Some(&WmiValue::Class(ClassValue::Rows(vec![
                vec![("LoadPercentage", Value::from(7))]
                    .into_iter()
                    .collect::<RowValues>()
            ])))
        );
        assert_eq!(
            fields.get("OpenHardwareMonitor_Sensor_CPUCore1"),
            Some(&WmiValue::Metric("45.3".to_string()))
        );
        assert_eq!(report.classes_failed, 1);
        assert_eq!(report.namespaces_failed, 1);

        // Everything but the root session has been released.
        assert_eq!(tracker.live(), 1);
    }

    #[test]
    fn test_later_writes_win_on_key_collision() {
        let provider = hardware()
            .with_rows(
                DEFAULT_NAMESPACE,
                "OpenHardwareMonitor_Fan",
                vec![mock_row(&[("Name", Value::from("class"))])],
            )
            .with_rows(
                OHM,
                "Fan",
                vec![mock_row(&[("Value", Value::from("namespace"))])],
            );
        // The namespace entry has no name fields, so its metric is named
        // "OpenHardwareMonitor_Fan" like the class. Namespaces are written last.
        let collector = Collector::new(&config(
            vec![ClassQuery::new("OpenHardwareMonitor_Fan", &["Name"])],
            vec![NamespaceQuery::new("OpenHardwareMonitor", "Fan", &[], "Value")],
        ));
        let session = provider.connect().unwrap();

        let (fields, report) = collector.poll(&*session);
        assert_eq!(report.classes, 1);
        assert_eq!(report.metrics, 1);
        assert_eq!(fields.len(), 1);
        assert_eq!(
            fields.get("OpenHardwareMonitor_Fan"),
            Some(&WmiValue::Metric("namespace".to_string()))
        );
    }

    #[test]
    fn test_duplicate_metric_names_keep_last_row() {
        let provider = MockProvider::new().with_rows(
            OHM,
            "Sensor",
            vec![
                mock_row(&[("Name", Value::from("CPU #1")), ("Value", Value::from(1))]),
                mock_row(&[("Name", Value::from("CPU 1")), ("Value", Value::from(2))]),
            ],
        );
        let collector = Collector::new(&config(
            Vec::new(),
            vec![NamespaceQuery::new("OpenHardwareMonitor", "Sensor", &["Name"], "Value")],
        ));
        let session = provider.connect().unwrap();

        let (fields, report) = collector.poll(&*session);
        assert_eq!(report.metrics, 2);
        assert_eq!(
            fields,
            BTreeMap::from([(
                "OpenHardwareMonitor_Sensor_CPU1".to_string(),
                WmiValue::Metric("2".to_string())
            )])
        );
    }

    #[test]
    fn test_demo_config_and_fixture() {
        let demos = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("demos");
        let config = BeatConfig::load(&demos.join("wmibeat.yml")).unwrap();
        let provider = MockProvider::from_fixture(&demos.join("fixture.json")).unwrap();

        let collector = Collector::new(&config);
        let session = provider.connect().unwrap();
        let (wmi, report) = collector.poll(&*session);

        assert_eq!(report.classes, 3);
        assert_eq!(report.classes_failed, 0);
        assert_eq!(report.metrics, 2);

        let Some(WmiValue::Class(ClassValue::Keyed(fans))) = wmi.get("Win32_Fan") else {
            panic!("Win32_Fan should be keyed by Name");
        };
        assert_eq!(fans.len(), 2);
        assert_eq!(fans["Fan1"].get("DesiredSpeed"), Some(&Value::Integer(1200)));

        let Some(WmiValue::Class(ClassValue::Rows(disks))) = wmi.get("Win32_LogicalDisk") else {
            panic!("Win32_LogicalDisk should be an ordered list");
        };
        assert_eq!(disks.len(), 1);
        assert_eq!(disks[0].get("DeviceID"), Some(&Value::from("C:")));

        assert_eq!(
            wmi.get("OpenHardwareMonitor_Sensor_Temperature_CPUCore1"),
            Some(&WmiValue::Metric("45.3".to_string()))
        );
        assert!(wmi.contains_key("OpenHardwareMonitor_Sensor_Temperature_CPUCore2"));
        assert!(!wmi.contains_key("OpenHardwareMonitor_Sensor_Load_CPUTotal"));
    }
}
