//! Shapes API response types

use serde::Deserialize;

/// Response from the `hello` connectivity-check endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct HelloResponse {
    pub text: String,
}

/// Response from the `shapes` endpoint.
///
/// The backend answers rejected attestations inside a 200 body: the
/// `shape` field is absent and `status` carries the rejection code.
#[derive(Debug, Clone, Deserialize)]
pub struct ShapeResponse {
    #[serde(default)]
    pub shape: Option<String>,

    #[serde(default)]
    pub status: Option<u16>,
}

impl ShapeResponse {
    /// Whether the backend rejected the request's proof of legitimacy.
    pub fn is_rejected(&self) -> bool {
        self.status.is_some_and(|status| status >= 400)
    }
}
