use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const CREDENTIALS_BASE_URL: &str = "https://rtc.live.cloudflare.com/v1/turn/keys";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum IceError {
    #[error("credential request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("credential endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
}

/// One ICE server entry for a browser's RTCPeerConnection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceServersResponse {
    #[serde(rename = "iceServers")]
    pub ice_servers: Vec<IceServer>,
}

#[derive(Debug, Serialize)]
struct GenerateIceServersRequest {
    ttl: u64,
}

/// Mint short-lived TURN credentials from the Cloudflare TURN API. No
/// retries; callers retry if they want to.
pub async fn generate_ice_servers(
    turn_key_id: &str,
    api_token: &str,
    ttl: u64,
) -> Result<IceServersResponse, IceError> {
    let url = format!("{CREDENTIALS_BASE_URL}/{turn_key_id}/credentials/generate-ice-servers");
    request_ice_servers(&url, api_token, ttl).await
}

pub(crate) async fn request_ice_servers(
    url: &str,
    api_token: &str,
    ttl: u64,
) -> Result<IceServersResponse, IceError> {
    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()?;

    let response = client
        .post(url)
        .bearer_auth(api_token)
        .json(&GenerateIceServersRequest { ttl })
        .send()
        .await?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        let body = response.text().await.unwrap_or_default();
        return Err(IceError::Status {
            status: status.as_u16(),
            body,
        });
    }

    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::extract::Json;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;

    use super::*;

    fn stub_response() -> IceServersResponse {
        IceServersResponse {
            ice_servers: vec![IceServer {
                urls: vec![
                    "stun:stun.cloudflare.com:3478".to_string(),
                    "turn:turn.cloudflare.com:3478?transport=udp".to_string(),
                ],
                username: "u".to_string(),
                credential: "c".to_string(),
            }],
        }
    }

    async fn spawn_stub(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[test]
    fn response_parses_provider_shape() {
        let json = r#"{"iceServers":[{"urls":["stun:stun.cloudflare.com:3478"],"username":"u","credential":"c"}]}"#;
        let parsed: IceServersResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.ice_servers.len(), 1);
        assert_eq!(parsed.ice_servers[0].username, "u");
    }

    #[tokio::test]
    async fn mints_credentials_on_200() {
        let app = Router::new().route(
            "/creds",
            post(
                |headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
                    assert_eq!(
                        headers.get("authorization").unwrap(),
                        "Bearer secret-token"
                    );
                    assert_eq!(body["ttl"], 3600);
                    Json(stub_response())
                },
            ),
        );
        let addr = spawn_stub(app).await;

        let got = request_ice_servers(&format!("http://{addr}/creds"), "secret-token", 3600)
            .await
            .unwrap();
        assert_eq!(got, stub_response());
    }

    #[tokio::test]
    async fn surfaces_non_200_with_body() {
        let app = Router::new().route(
            "/creds",
            post(|| async { (StatusCode::FORBIDDEN, "invalid token") }),
        );
        let addr = spawn_stub(app).await;

        let err = request_ice_servers(&format!("http://{addr}/creds"), "bad", 3600)
            .await
            .unwrap_err();
        match err {
            IceError::Status { status, body } => {
                assert_eq!(status, 403);
                assert_eq!(body, "invalid token");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }
}
