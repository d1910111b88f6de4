use chilicon_rs::api;
use chilicon_rs::model::{Api, KWh, NO_DATA};
use prometheus::{Encoder, GaugeVec, TextEncoder};
use std::sync::Mutex;

lazy_static! {
    static ref ENERGY_TODAY_GAUGE: GaugeVec = register_gauge_vec!(
        opts!(
            "energy_today",
            "total amount of energy generated in current day (in kWh)",
        ),
        &["installation"],
    )
    .unwrap();
}

/// Last known good daily energy value, kept across polling cycles so that a
/// failed fetch keeps reporting the previous reading. Starts empty; a cycle
/// that fails before the first success reports nothing at all.
pub struct EnergyCache {
    value: Mutex<Option<KWh>>,
}

impl EnergyCache {
    pub fn new() -> EnergyCache {
        EnergyCache {
            value: Mutex::new(None),
        }
    }

    fn store(&self, kwh: KWh) {
        if let Ok(mut value) = self.value.lock() {
            *value = Some(kwh);
        } else {
            log::trace!("Unable to lock energy cache mutex, value not stored")
        }
    }

    fn last(&self) -> Option<KWh> {
        self.value.lock().ok().and_then(|value| *value)
    }
}

/// Collect today's generated energy from `api`, updating the Prometheus
/// exporter registry. A cycle without usable data falls back to the cached
/// value; the cached value itself is only ever overwritten by a success.
pub async fn collect(api: &Api, cache: &EnergyCache) -> Result<(), api::Error> {
    let kwh = api::fetch_data(api, true).await?;

    let reported = if kwh == NO_DATA {
        log::warn!("no value returned from cloud, using last value instead");
        cache.last()
    } else {
        cache.store(kwh);
        Some(kwh)
    };

    match reported {
        Some(kwh) => {
            ENERGY_TODAY_GAUGE
                .with_label_values(&[&api.installation_hash])
                .set(kwh);
            log::debug!("updated energy: {}", kwh);
        }
        None => log::warn!("no saved value for energy found, skipping update"),
    }

    Ok(())
}

/// Read metrics from Prometheus exporter registry.
pub async fn read() -> Result<String, api::Error> {
    // Gather the metrics.
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).or(Err(api::Error::FormatError))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn test_api(url: String, hash: &str) -> Api {
        api::api(
            api::client().unwrap(),
            url,
            String::from("user"),
            String::from("secret"),
            String::from(hash),
        )
    }

    fn gauge_for(hash: &str) -> f64 {
        ENERGY_TODAY_GAUGE.with_label_values(&[hash]).get()
    }

    #[tokio::test]
    async fn collect_falls_back_to_cached_value() {
        let cache = EnergyCache::new();

        let mut ok_server = mockito::Server::new_async().await;
        ok_server
            .mock("GET", "/ajax/fetchOwnerUpdate")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[[600,600],[],[]]")
            .create_async()
            .await;

        let api = test_api(ok_server.url(), "cache-test");
        collect(&api, &cache).await.unwrap();
        assert!((gauge_for("cache-test") - 0.1).abs() < 1e-12);

        let mut failing_server = mockito::Server::new_async().await;
        failing_server
            .mock("GET", "/ajax/fetchOwnerUpdate")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let api = test_api(failing_server.url(), "cache-test");
        collect(&api, &cache).await.unwrap();
        assert!((gauge_for("cache-test") - 0.1).abs() < 1e-12);
        assert_eq!(cache.last(), Some(0.1));
    }

    #[tokio::test]
    async fn collect_reports_nothing_before_first_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/ajax/fetchOwnerUpdate")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let api = test_api(server.url(), "cold-start");
        let cache = EnergyCache::new();

        collect(&api, &cache).await.unwrap();
        assert_eq!(cache.last(), None);
        assert_eq!(gauge_for("cold-start"), 0.0);
    }
}
