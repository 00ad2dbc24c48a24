use secrecy::ExposeSecret;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;

use crate::client::config::ClientConfig;
use crate::client::consts::{API_KEY_PARAM, LIVE_PATH};

pub fn build_request(config: &ClientConfig) -> tokio_tungstenite::tungstenite::Result<Request> {
    format!(
        "{}{}?{}={}",
        config.base_url().trim_end_matches('/'),
        LIVE_PATH,
        API_KEY_PARAM,
        config.api_key().expose_secret()
    )
    .into_client_request()
}
