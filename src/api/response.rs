use serde::Deserialize;
use serde_json::Value;

/// Owner update payload: `[dayData, lifetimeData, currentData]`.
///
/// `dayData` holds one average-power reading in watts per 5-minute period of
/// the day (-1 for periods without data). The lifetime and current elements
/// are carried along untyped; nothing here consumes them.
#[derive(Debug, Deserialize)]
pub struct OwnerUpdate(pub Vec<f64>, pub Value, pub Value);
