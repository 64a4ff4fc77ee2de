//! Metrics export for pool statistics

use crate::statistics::PoolStatistics;
use std::collections::HashMap;

impl PoolStatistics {
    /// Export counters and membership gauges as a flat string map
    ///
    /// # Examples
    ///
    /// ```
    /// use resource_pool::StatisticsRegistry;
    ///
    /// let registry = StatisticsRegistry::for_pool();
    /// registry.increment("requests");
    ///
    /// let exported = registry.snapshot("p").export();
    /// assert_eq!(exported["requests"], "1");
    /// assert_eq!(exported["idle"], "0");
    /// ```
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics: HashMap<String, String> = self
            .counters
            .iter()
            .map(|(name, stat)| (name.clone(), stat.value.to_string()))
            .collect();
        metrics.insert("idle".to_string(), self.idle.to_string());
        metrics.insert("busy".to_string(), self.busy.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Render pool statistics in Prometheus text exposition format
    ///
    /// Every counter becomes a gauge named `resourcepool_<counter>` labelled
    /// with its pool; `tags` are attached as constant labels.
    ///
    /// # Examples
    ///
    /// ```
    /// use resource_pool::{MetricsExporter, StatisticsRegistry};
    /// use std::collections::HashMap;
    ///
    /// let registry = StatisticsRegistry::for_pool();
    /// registry.increment("requests");
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = MetricsExporter::export_prometheus(&[registry.snapshot("orders")], Some(&tags)).unwrap();
    /// assert!(output.contains("resourcepool_requests"));
    /// assert!(output.contains("pool=\"orders\""));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_prometheus(
        stats: &[PoolStatistics],
        tags: Option<&HashMap<String, String>>,
    ) -> Result<String, prometheus::Error> {
        use prometheus::{Encoder, IntGaugeVec, Opts, Registry, TextEncoder};
        use std::collections::BTreeMap;

        let registry = Registry::new();
        let mut gauges: BTreeMap<String, IntGaugeVec> = BTreeMap::new();
        let mut gauge = |name: &str, help: &str| -> Result<IntGaugeVec, prometheus::Error> {
            let metric = format!("resourcepool_{}", sanitize(name));
            if let Some(existing) = gauges.get(&metric) {
                return Ok(existing.clone());
            }
            let mut opts = Opts::new(metric.clone(), help.to_string());
            if let Some(tags) = tags {
                opts = opts.const_labels(tags.clone());
            }
            let vec = IntGaugeVec::new(opts, &["pool"])?;
            registry.register(Box::new(vec.clone()))?;
            gauges.insert(metric, vec.clone());
            Ok(vec)
        };

        for pool in stats {
            gauge("idle_containers", "Idle containers")?
                .with_label_values(&[pool.pool.as_str()])
                .set(pool.idle as i64);
            gauge("busy_containers", "Busy containers")?
                .with_label_values(&[pool.pool.as_str()])
                .set(pool.busy as i64);
            for (name, stat) in &pool.counters {
                let help = format!("Pool counter {name} ({:?})", stat.kind);
                gauge(name, &help)?
                    .with_label_values(&[pool.pool.as_str()])
                    .set(stat.value);
            }
        }

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(feature = "metrics")]
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}
