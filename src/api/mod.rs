pub mod endpoint;
pub mod error;
pub mod response;

use crate::model;
use crate::model::KWh;
pub use error::Error;
use http::StatusCode;
use reqwest::header::{HOST, LOCATION, REFERER};
use response::OwnerUpdate;
use serde_json::Value;

use std::collections::HashMap;

/// `Host` header the cloud dashboard expects on data requests, regardless of
/// the URL used to reach it.
const OWNER_HOST: &str = "cloud.chiliconpower.com";

/// Build the shared transport: cookie store for the login session, redirect
/// following disabled so the login response's `Location` target can be
/// inspected instead of chased.
pub fn client() -> Result<reqwest::Client, Error> {
    reqwest::ClientBuilder::new()
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .or(Err(Error::InternalError))
}

pub fn api(
    client: reqwest::Client,
    api_url: String,
    username: String,
    password: String,
    installation_hash: String,
) -> model::Api {
    model::Api {
        api_url,
        username,
        password,
        installation_hash,
        client,
    }
}

/// Authenticate against the cloud dashboard, establishing session cookies in
/// the shared transport.
///
/// The dashboard signals a successful login only through the redirect target
/// of its response; there is no success field in the body. Returns `Ok(true)`
/// when the `Location` header points at the configured installation,
/// `Ok(false)` otherwise.
pub async fn login(api: &model::Api) -> Result<bool, Error> {
    let url = format!("{}{}", api.api_url, endpoint::LOGIN);

    let form = HashMap::from([
        ("username", api.username.to_owned()),
        ("password", api.password.to_owned()),
        ("Login", String::from("Login")),
    ]);

    let response = api
        .client
        .post(url)
        .form(&form)
        .send()
        .await
        .map_err(|e| Error::LoginError(e.to_string()))?;

    let expected = format!("{}{}", endpoint::INSTALLATION, api.installation_hash);
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if location != expected {
        log::warn!("Unexpected installation hash. Got: {}", location);
        return Ok(false);
    }
    Ok(true)
}

fn owner_update_request(api: &model::Api) -> reqwest::RequestBuilder {
    let today = chrono::Local::now().format("%Y-%m-%d");
    let url = format!("{}{}?today={}", api.api_url, endpoint::OWNER_UPDATE, today);
    let referer = format!(
        "{}{}{}",
        api.api_url,
        endpoint::INSTALLATION,
        api.installation_hash
    );

    api.client.get(url).header(HOST, OWNER_HOST).header(REFERER, referer)
}

/// Fetch today's owner update and reduce it to the energy generated so far,
/// in kWh.
///
/// A 400 or 401 response is taken as an expired session: with `allow_retry`,
/// one `login()` plus one further attempt is made, never more. Any other
/// non-200 response, or an attempt still failing after the re-login, resolves
/// to `NO_DATA` rather than an error; only transport faults and malformed
/// bodies surface as `Err`.
pub async fn fetch_data(api: &model::Api, allow_retry: bool) -> Result<KWh, Error> {
    let mut retries_left = if allow_retry { 1 } else { 0 };

    loop {
        let response = owner_update_request(api)
            .send()
            .await
            .map_err(|e| Error::ApiError(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::OK {
            let body = response
                .text()
                .await
                .map_err(|e| Error::ApiError(e.to_string()))?;
            let OwnerUpdate(day_data, _lifetime, _current) = serde_json::from_str(&body)
                .map_err(|e| Error::InvalidResponse(body.clone(), e.to_string()))?;
            return Ok(calculate_today(&day_data));
        }

        log::warn!("status code is not 200: {}", status);

        if retries_left > 0
            && (status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED)
        {
            retries_left -= 1;
            login(api).await?;
            log::info!("retrying owner update after login");
            continue;
        }

        return Ok(model::NO_DATA);
    }
}

/// Reduce a day's worth of 5-minute average-power readings (in watts) to the
/// energy generated, in kWh.
///
/// Each reading covers 1/12 of an hour and each watt is 1/1000 of a kilowatt,
/// so every real sample contributes `sample / 12000` kWh. Samples of -1 mark
/// periods without data (future, or nothing generated) and are skipped.
pub fn calculate_today(day_data: &[f64]) -> KWh {
    day_data
        .iter()
        .filter(|power| **power != model::NO_DATA)
        .map(|power| power / 12000.0)
        .sum()
}

/// Dump owner update
///
/// Fetch the raw owner-update payload for the configured installation as
/// untyped JSON, for feature-reporting purposes. Unlike `fetch_data`, any
/// non-200 response is an error here.
pub async fn dump_owner_update(api: &model::Api) -> Result<Value, Error> {
    let response = owner_update_request(api)
        .send()
        .await
        .map_err(|e| Error::ApiError(e.to_string()))?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(Error::ApiError(format!("status code is not 200: {}", status)));
    }

    let body = response
        .text()
        .await
        .map_err(|e| Error::ApiError(e.to_string()))?;
    serde_json::from_str(&body).map_err(|e| Error::InvalidResponse(body.clone(), e.to_string()))
}
