#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate prometheus;
#[macro_use]
extern crate rocket;

use chilicon_rs::api;
use chilicon_rs::model::Api;
use config::Config;
use rocket::State;
use std::sync::Mutex;
use std::time::Instant;

mod metrics;

use metrics::EnergyCache;

const API_URL: &str = "https://cloud.chiliconpower.com";
const DEFAULT_INTERVAL: i64 = 1800;

#[derive(Clone, serde::Deserialize)]
pub struct ChiliconConfig {
    api_url: String,
    username: String,
    password: String,
    installation_hash: String,
    interval: u64,
}

/// Structure containing state for API handlers.
pub struct StateData {
    api: Api,
    interval: u64,
    energy: EnergyCache,
    /// Timestamp of last successful metric collection via `metrics::collect()`
    timestamp: Mutex<Option<Instant>>,
}

impl StateData {
    /// Updates `timestamp` to `now()`.
    fn touch(&self) {
        if let Ok(mut ts) = self.timestamp.lock() {
            *ts = Some(Instant::now());
        } else {
            log::trace!("Unable to lock timestamp mutex, will refresh again")
        }
    }

    /// Checks whether `interval_secs` elapsed since last `touch()`
    fn interval_elapsed(&self, interval_secs: u64) -> bool {
        let elapsed_opt = self
            .timestamp
            .lock()
            .ok()
            .and_then(|a| a.map(|b| b.elapsed().as_secs()));

        if let Some(elapsed) = elapsed_opt {
            elapsed > interval_secs
        } else {
            /* If there is None timestamp/elapsed, always return true to trigger action */
            true
        }
    }
}

pub fn read_settings() -> ChiliconConfig {
    let mut settings = Config::default();
    settings
        .merge(config::Environment::with_prefix("CHILICON"))
        .unwrap()
        .set_default("api_url", API_URL)
        .unwrap()
        .set_default("interval", DEFAULT_INTERVAL)
        .unwrap();

    settings.try_into().expect("Configuration error")
}

#[get("/metrics")]
async fn metrics_route(state: &State<StateData>) -> Result<String, api::Error> {
    if state.interval_elapsed(state.interval) {
        metrics::collect(&state.api, &state.energy).await?;
        state.touch();
    } else {
        log::info!("interval time not yet elapsed since last run; returning cached result")
    }
    metrics::read().await
}

#[get("/dump-update")]
async fn dump_update_route(state: &State<StateData>) -> Result<String, api::Error> {
    api::login(&state.api).await?;
    let dump = api::dump_owner_update(&state.api).await?;

    Ok(format!("{:#?}", dump))
}

#[rocket::main]
async fn main() -> Result<(), rocket::Error> {
    env_logger::init();

    let settings = read_settings();
    let client = api::client().expect("HTTP client error");
    let api = api::api(
        client,
        settings.api_url,
        settings.username,
        settings.password,
        settings.installation_hash,
    );

    match api::login(&api).await {
        Ok(true) => log::debug!("initial login succeeded"),
        Ok(false) => log::warn!("initial login did not validate, will retry on first poll"),
        Err(e) => log::warn!("initial login failed: {:?}, will retry on first poll", e),
    }

    let state = StateData {
        api,
        interval: settings.interval,
        energy: EnergyCache::new(),
        timestamp: Mutex::new(None),
    };

    let _rocket = rocket::build()
        .manage(state)
        .mount("/", routes![metrics_route, dump_update_route])
        .launch()
        .await?;

    Ok(())
}
