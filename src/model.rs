pub type KWh = f64;

/// Marks a 5-minute sample interval with no reading, and a polling cycle that
/// produced no usable value.
pub const NO_DATA: KWh = -1.0;

#[derive(Debug, Clone)]
pub struct Api {
    pub api_url: String,
    pub username: String,
    pub password: String,
    pub installation_hash: String,
    /// Shared transport carrying the session cookie jar. Built by the caller,
    /// never rebuilt or closed here.
    pub client: reqwest::Client,
}
