//! [`RosbridgeTransport`] – controller-manager service calls over a
//! rosbridge-compatible WebSocket.
//!
//! The external control-manager exposes an "activate/deactivate named
//! controller" service on the real-time side.  This transport speaks the
//! rosbridge `call_service` JSON protocol to it:
//!
//! ```json
//! {"op": "call_service", "id": "…", "service": "/controller_manager/set_controller_state",
//!  "args": {"name": "parkour", "desired_state": "active"}}
//! ```
//!
//! and matches the `service_response` frame carrying the same `id`.  The
//! connection is opened lazily and reopened after any wire fault; the arbiter
//! serialises calls, so one connection is shared without contention.

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use strider_types::{DesiredState, SupervisorError};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::SwitchTransport;

type WsConnection = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default controller-manager service name.
pub const DEFAULT_SERVICE: &str = "/controller_manager/set_controller_state";

/// Switching transport backed by a rosbridge WebSocket endpoint.
pub struct RosbridgeTransport {
    /// `ws://host:port` of the rosbridge endpoint.
    url: String,
    service: String,
    conn: Mutex<Option<WsConnection>>,
}

impl RosbridgeTransport {
    /// Create a transport for `url` using [`DEFAULT_SERVICE`].
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_service(url, DEFAULT_SERVICE)
    }

    /// Create a transport calling a non-default service name.
    pub fn with_service(url: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            service: service.into(),
            conn: Mutex::new(None),
        }
    }

    /// The rosbridge URL this transport is configured to use.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn connect(&self) -> Result<WsConnection, SupervisorError> {
        let (ws, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| SupervisorError::Channel(format!("rosbridge connect to {}: {e}", self.url)))?;
        info!(url = %self.url, "connected to rosbridge");
        Ok(ws)
    }

    /// Wait for the `service_response` frame matching `call_id`.
    async fn await_response(
        ws: &mut WsConnection,
        call_id: &str,
        controller: &str,
    ) -> Result<(), SupervisorError> {
        while let Some(frame) = ws.next().await {
            let frame = frame.map_err(|e| SupervisorError::Transport {
                controller: controller.to_string(),
                details: format!("websocket error: {e}"),
            })?;

            let Message::Text(text) = frame else {
                continue;
            };
            let value: serde_json::Value = match serde_json::from_str(&text) {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "ignoring malformed rosbridge frame");
                    continue;
                }
            };
            if value["op"] != "service_response" || value["id"] != call_id {
                debug!(op = %value["op"], "ignoring unrelated rosbridge frame");
                continue;
            }

            if value["result"].as_bool() == Some(true) {
                return Ok(());
            }
            let details = value["values"]["error_detail"]
                .as_str()
                .unwrap_or("service reported failure")
                .to_string();
            return Err(SupervisorError::Transport {
                controller: controller.to_string(),
                details,
            });
        }

        Err(SupervisorError::Transport {
            controller: controller.to_string(),
            details: "rosbridge connection closed before response".into(),
        })
    }
}

#[async_trait::async_trait]
impl SwitchTransport for RosbridgeTransport {
    async fn request(
        &self,
        controller: &str,
        desired: DesiredState,
    ) -> Result<(), SupervisorError> {
        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }
        let Some(ws) = guard.as_mut() else {
            return Err(SupervisorError::Channel("rosbridge connection missing".into()));
        };

        let call_id = Uuid::new_v4().to_string();
        let desired_str = match desired {
            DesiredState::Active => "active",
            DesiredState::Inactive => "inactive",
        };
        let frame = json!({
            "op": "call_service",
            "id": call_id,
            "service": self.service,
            "args": {
                "name": controller,
                "desired_state": desired_str,
            },
        });
        debug!(controller, desired = desired_str, "issuing switch request");

        let send_result = ws.send(Message::Text(frame.to_string().into())).await;
        if let Err(e) = send_result {
            // Drop the broken connection so the next call reconnects.
            *guard = None;
            return Err(SupervisorError::Transport {
                controller: controller.to_string(),
                details: format!("websocket send: {e}"),
            });
        }

        let outcome = Self::await_response(ws, &call_id, controller).await;
        if outcome.is_err() {
            *guard = None;
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    /// Minimal in-process rosbridge endpoint answering `call_service` frames.
    async fn serve_one(listener: TcpListener, result: bool, error_detail: Option<&str>) {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("handshake");

        while let Some(Ok(Message::Text(text))) = ws.next().await {
            let frame: serde_json::Value = serde_json::from_str(&text).expect("frame json");
            assert_eq!(frame["op"], "call_service");

            let mut values = json!({});
            if let Some(detail) = error_detail {
                values = json!({ "error_detail": detail });
            }
            let reply = json!({
                "op": "service_response",
                "id": frame["id"],
                "service": frame["service"],
                "result": result,
                "values": values,
            });
            ws.send(Message::Text(reply.to_string().into()))
                .await
                .expect("reply");
        }
    }

    async fn bound_listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        (listener, format!("ws://{addr}"))
    }

    #[tokio::test]
    async fn successful_service_call_returns_ok() {
        let (listener, url) = bound_listener().await;
        tokio::spawn(serve_one(listener, true, None));

        let transport = RosbridgeTransport::new(url);
        transport
            .request("normal", DesiredState::Active)
            .await
            .expect("service call must succeed");
    }

    #[tokio::test]
    async fn failed_service_call_carries_error_detail() {
        let (listener, url) = bound_listener().await;
        tokio::spawn(serve_one(listener, false, Some("controller is busy")));

        let transport = RosbridgeTransport::new(url);
        let err = transport
            .request("parkour", DesiredState::Active)
            .await
            .expect_err("service reported failure");
        match err {
            SupervisorError::Transport { controller, details } => {
                assert_eq!(controller, "parkour");
                assert!(details.contains("busy"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn connection_refused_is_a_channel_error() {
        // Bind-then-drop guarantees nothing is listening on the port.
        let (listener, url) = bound_listener().await;
        drop(listener);

        let transport = RosbridgeTransport::new(url);
        let err = transport
            .request("normal", DesiredState::Active)
            .await
            .expect_err("nothing listening");
        assert!(matches!(err, SupervisorError::Channel(_)));
    }

    #[tokio::test]
    async fn calls_reuse_one_connection() {
        let (listener, url) = bound_listener().await;
        tokio::spawn(serve_one(listener, true, None));

        let transport = RosbridgeTransport::new(url);
        transport
            .request("normal", DesiredState::Inactive)
            .await
            .expect("first call");
        // Second call rides the same accepted connection; a second accept
        // would hang serve_one and fail the test by timeout.
        transport
            .request("safe_hold", DesiredState::Active)
            .await
            .expect("second call");
    }
}
