//! Proxy handlers for the hotel data service.
//!
//! Every route forwards verb+path+body upstream and passes the upstream's
//! status and body back to the caller. Mutating routes additionally publish
//! the matching event(s) to the hub — but only after a 2xx upstream
//! response, and exactly once per accepted call. Transport failures become a
//! route-specific `500 {"error": ...}` and publish nothing.

use std::sync::Arc;

use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::warn;

use concierge_core::errors::UpstreamError;
use concierge_core::events::GatewayEvent;
use concierge_upstream::{Method, UpstreamApi, UpstreamResponse};

use crate::hub::EventHub;

/// Shared state for the proxy handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub upstream: Arc<dyn UpstreamApi>,
    pub hub: Arc<EventHub>,
}

impl GatewayState {
    pub fn new(upstream: Arc<dyn UpstreamApi>, hub: Arc<EventHub>) -> Self {
        Self { upstream, hub }
    }
}

/// All `/api` routes in one table. Nested under `/api` by the server, so
/// paths here are prefix-free; forwarded paths carry the full upstream form.
pub fn api_router() -> Router<GatewayState> {
    Router::new()
        .route("/rooms", get(list_rooms).post(create_room))
        .route("/rooms/availability", get(room_availability))
        .route("/rooms/status/summary", get(status_summary))
        .route("/rooms/{id}", get(get_room))
        .route("/rooms/{id}/status", put(update_room_status))
        .route("/rooms/{id}/checkin", post(check_in))
        .route("/rooms/{id}/checkout", post(check_out))
        .route("/reservations", get(list_reservations).post(create_reservation))
        .route("/reservations/{id}", get(get_reservation))
        .route("/reservations/{id}/cancel", post(cancel_reservation))
        .route("/reservations/room/{room_id}", get(room_reservations))
        .route("/init", post(init_data))
}

// ── Read routes (proxy only, no events) ──

async fn list_rooms(State(state): State<GatewayState>) -> Response {
    proxy_read(&state, "/api/rooms".into(), "Failed to fetch rooms").await
}

async fn get_room(State(state): State<GatewayState>, Path(id): Path<String>) -> Response {
    proxy_read(&state, format!("/api/rooms/{id}"), "Failed to fetch room").await
}

async fn room_availability(State(state): State<GatewayState>, RawQuery(query): RawQuery) -> Response {
    let path = match query {
        Some(q) => format!("/api/rooms/availability?{q}"),
        None => "/api/rooms/availability".into(),
    };
    proxy_read(&state, path, "Failed to fetch room availability").await
}

async fn status_summary(State(state): State<GatewayState>) -> Response {
    proxy_read(
        &state,
        "/api/rooms/status/summary".into(),
        "Failed to fetch status summary",
    )
    .await
}

async fn list_reservations(State(state): State<GatewayState>) -> Response {
    proxy_read(&state, "/api/reservations".into(), "Failed to fetch reservations").await
}

async fn get_reservation(State(state): State<GatewayState>, Path(id): Path<String>) -> Response {
    proxy_read(
        &state,
        format!("/api/reservations/{id}"),
        "Failed to fetch reservation",
    )
    .await
}

async fn room_reservations(
    State(state): State<GatewayState>,
    Path(room_id): Path<String>,
) -> Response {
    proxy_read(
        &state,
        format!("/api/reservations/room/{room_id}"),
        "Failed to fetch room reservations",
    )
    .await
}

// ── Mutating routes (proxy; publish on 2xx) ──

async fn create_room(State(state): State<GatewayState>, Json(body): Json<Value>) -> Response {
    let requested = body.clone();
    forward_mutation(
        &state,
        Method::POST,
        "/api/rooms".into(),
        Some(body),
        "Failed to create room",
        move |resp| {
            let room = resp.body.get("room").cloned().unwrap_or(requested);
            vec![GatewayEvent::room_created(room)]
        },
    )
    .await
}

async fn update_room_status(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let status = body
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    forward_mutation(
        &state,
        Method::PUT,
        format!("/api/rooms/{id}/status"),
        Some(body),
        "Failed to update room status",
        move |_resp| vec![GatewayEvent::room_status_update(id, status)],
    )
    .await
}

async fn check_in(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let guest_name = body
        .get("guest_name")
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
        .to_string();
    forward_mutation(
        &state,
        Method::POST,
        format!("/api/rooms/{id}/checkin"),
        Some(body),
        "Failed to check in guest",
        move |_resp| vec![GatewayEvent::guest_checkin(id, guest_name)],
    )
    .await
}

async fn check_out(State(state): State<GatewayState>, Path(id): Path<String>) -> Response {
    forward_mutation(
        &state,
        Method::POST,
        format!("/api/rooms/{id}/checkout"),
        None,
        "Failed to check out guest",
        move |resp| {
            let guest_name = resp
                .body
                .get("guest_name")
                .and_then(Value::as_str)
                .map(str::to_owned);
            vec![GatewayEvent::guest_checkout(id, guest_name)]
        },
    )
    .await
}

async fn create_reservation(
    State(state): State<GatewayState>,
    Json(body): Json<Value>,
) -> Response {
    forward_mutation(
        &state,
        Method::POST,
        "/api/reservations".into(),
        Some(body),
        "Failed to create reservation",
        |resp| {
            let mut events = vec![GatewayEvent::reservation_created(&resp.body)];
            // The upstream reports the room's side effect alongside the
            // reservation; surface it as its own event, after the primary.
            if let Some(update) = resp.body.get("room_status_update") {
                events.extend(GatewayEvent::room_status_transition(update));
            }
            events
        },
    )
    .await
}

async fn cancel_reservation(State(state): State<GatewayState>, Path(id): Path<String>) -> Response {
    forward_mutation(
        &state,
        Method::POST,
        format!("/api/reservations/{id}/cancel"),
        None,
        "Failed to cancel reservation",
        move |_resp| vec![GatewayEvent::reservation_cancelled(id)],
    )
    .await
}

async fn init_data(State(state): State<GatewayState>) -> Response {
    forward_mutation(
        &state,
        Method::POST,
        "/api/init".into(),
        None,
        "Failed to initialize data",
        |resp| {
            let rooms_count = resp.body.get("rooms_count").and_then(Value::as_i64);
            vec![GatewayEvent::rooms_initialized(rooms_count)]
        },
    )
    .await
}

// ── Shared forward/respond plumbing ──

async fn proxy_read(state: &GatewayState, path: String, fallback: &str) -> Response {
    match state.upstream.get(&path).await {
        Ok(resp) => upstream_response(resp),
        Err(e) => upstream_failure(fallback, &e),
    }
}

/// Forward one mutating request. On a 2xx upstream response, publish the
/// events produced by `events` — in the order returned — before responding.
async fn forward_mutation<F>(
    state: &GatewayState,
    method: Method,
    path: String,
    body: Option<Value>,
    fallback: &str,
    events: F,
) -> Response
where
    F: FnOnce(&UpstreamResponse) -> Vec<GatewayEvent>,
{
    match state.upstream.send(method, &path, body.as_ref()).await {
        Ok(resp) => {
            if resp.is_success() {
                for event in events(&resp) {
                    state.hub.publish(&event).await;
                }
            }
            upstream_response(resp)
        }
        Err(e) => upstream_failure(fallback, &e),
    }
}

/// Pass the upstream's status and JSON body through untouched.
fn upstream_response(resp: UpstreamResponse) -> Response {
    let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(resp.body)).into_response()
}

fn upstream_failure(fallback: &str, error: &UpstreamError) -> Response {
    warn!(error = %error, kind = error.error_kind(), "upstream request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": fallback})),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriber::SubscriberRegistry;
    use concierge_upstream::MockUpstream;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Harness {
        state: GatewayState,
        mock: Arc<MockUpstream>,
        registry: Arc<SubscriberRegistry>,
    }

    fn harness(mock: MockUpstream) -> Harness {
        let registry = Arc::new(SubscriberRegistry::new(32));
        let hub = Arc::new(EventHub::new(Arc::clone(&registry)));
        let mock = Arc::new(mock);
        let state = GatewayState::new(Arc::clone(&mock) as Arc<dyn UpstreamApi>, hub);
        Harness {
            state,
            mock,
            registry,
        }
    }

    async fn response_json(response: Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn drain_events(rx: &mut mpsc::Receiver<String>) -> Vec<Value> {
        let mut events = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            events.push(serde_json::from_str(&frame).unwrap());
        }
        events
    }

    #[tokio::test]
    async fn room_status_update_publishes_and_passes_through() {
        let h = harness(MockUpstream::with_response(
            200,
            json!({"id": 5, "status": "occupied"}),
        ));
        let (_id, mut rx) = h.registry.register();

        let response = update_room_status(
            State(h.state.clone()),
            Path("5".into()),
            Json(json!({"status": "occupied"})),
        )
        .await;

        let (status, body) = response_json(response).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"id": 5, "status": "occupied"}));

        let events = drain_events(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "room_status_update");
        assert_eq!(events[0]["roomId"], "5");
        assert_eq!(events[0]["status"], "occupied");
        assert!(events[0]["timestamp"].is_string());

        // Verb, path, and body all forwarded.
        let requests = h.mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::PUT);
        assert_eq!(requests[0].path, "/api/rooms/5/status");
        assert_eq!(requests[0].body.as_ref().unwrap()["status"], "occupied");
    }

    #[tokio::test]
    async fn reservation_creation_publishes_two_events_in_order() {
        let upstream_body = json!({
            "success": true,
            "reservation_id": 12,
            "room_id": "5",
            "guest_name": "Ada",
            "check_in_date": "2026-08-10",
            "check_out_date": "2026-08-12",
            "room_status_update": {
                "room_id": "5",
                "previous_status": "available",
                "new_status": "occupied",
            },
        });
        let h = harness(MockUpstream::with_response(201, upstream_body.clone()));
        let (_id, mut rx) = h.registry.register();

        let response = create_reservation(
            State(h.state.clone()),
            Json(json!({"room_id": "5", "guest_name": "Ada"})),
        )
        .await;

        let (status, body) = response_json(response).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, upstream_body);

        let events = drain_events(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["type"], "reservation_created");
        assert_eq!(events[0]["reservationId"], "12");
        assert_eq!(events[1]["type"], "room_status_update");
        assert_eq!(events[1]["roomId"], "5");
        assert_eq!(events[1]["previousStatus"], "available");
        assert_eq!(events[1]["newStatus"], "occupied");
    }

    #[tokio::test]
    async fn reservation_without_status_sub_object_publishes_one_event() {
        let h = harness(MockUpstream::with_response(
            201,
            json!({"reservation_id": 3, "room_id": 7}),
        ));
        let (_id, mut rx) = h.registry.register();

        let _ = create_reservation(State(h.state.clone()), Json(json!({"room_id": 7}))).await;

        let events = drain_events(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "reservation_created");
    }

    #[tokio::test]
    async fn upstream_transport_failure_is_500_with_route_message() {
        let h = harness(MockUpstream::with_error(UpstreamError::Network(
            "connection refused".into(),
        )));
        let (_id, mut rx) = h.registry.register();

        let response =
            create_reservation(State(h.state.clone()), Json(json!({"room_id": 5}))).await;

        let (status, body) = response_json(response).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "Failed to create reservation"}));
        assert!(drain_events(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn upstream_timeout_is_treated_like_network_error() {
        let h = harness(MockUpstream::with_error(UpstreamError::Timeout(
            Duration::from_secs(30),
        )));
        let (_id, mut rx) = h.registry.register();

        let response = update_room_status(
            State(h.state.clone()),
            Path("5".into()),
            Json(json!({"status": "occupied"})),
        )
        .await;

        let (status, body) = response_json(response).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "Failed to update room status"}));
        assert!(drain_events(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn upstream_business_error_passes_through_without_events() {
        let h = harness(MockUpstream::with_response(
            409,
            json!({"error": "Room is not available for these dates"}),
        ));
        let (_id, mut rx) = h.registry.register();

        let response =
            create_reservation(State(h.state.clone()), Json(json!({"room_id": 5}))).await;

        let (status, body) = response_json(response).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Room is not available for these dates");
        assert!(drain_events(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn read_route_proxies_without_events() {
        let h = harness(MockUpstream::with_response(
            200,
            json!({"rooms": [{"id": 101}]}),
        ));
        let (_id, mut rx) = h.registry.register();

        let response = list_rooms(State(h.state.clone())).await;
        let (status, body) = response_json(response).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rooms"][0]["id"], 101);
        assert!(drain_events(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn availability_forwards_query_string() {
        let h = harness(MockUpstream::new());
        let _ = room_availability(
            State(h.state.clone()),
            RawQuery(Some("check_in=2026-08-10&check_out=2026-08-12".into())),
        )
        .await;

        let requests = h.mock.requests();
        assert_eq!(
            requests[0].path,
            "/api/rooms/availability?check_in=2026-08-10&check_out=2026-08-12"
        );
    }

    #[tokio::test]
    async fn check_in_publishes_guest_checkin() {
        let h = harness(MockUpstream::with_response(
            200,
            json!({"success": true, "room_id": 203, "guest_name": "Grace"}),
        ));
        let (_id, mut rx) = h.registry.register();

        let _ = check_in(
            State(h.state.clone()),
            Path("203".into()),
            Json(json!({"guest_name": "Grace"})),
        )
        .await;

        let events = drain_events(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "guest_checkin");
        assert_eq!(events[0]["roomId"], "203");
        assert_eq!(events[0]["guestName"], "Grace");
    }

    #[tokio::test]
    async fn check_out_publishes_guest_checkout() {
        let h = harness(MockUpstream::with_response(
            200,
            json!({"success": true, "room_id": 203, "guest_name": "Grace"}),
        ));
        let (_id, mut rx) = h.registry.register();

        let _ = check_out(State(h.state.clone()), Path("203".into())).await;

        let events = drain_events(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "guest_checkout");
        assert_eq!(events[0]["roomId"], "203");
        assert_eq!(events[0]["guestName"], "Grace");
    }

    #[tokio::test]
    async fn cancel_publishes_reservation_cancelled() {
        let h = harness(MockUpstream::with_response(
            200,
            json!({"success": true, "reservation_id": 12}),
        ));
        let (_id, mut rx) = h.registry.register();

        let _ = cancel_reservation(State(h.state.clone()), Path("12".into())).await;

        let events = drain_events(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "reservation_cancelled");
        assert_eq!(events[0]["reservationId"], "12");
    }

    #[tokio::test]
    async fn create_room_publishes_room_created() {
        let h = harness(MockUpstream::with_response(
            201,
            json!({"success": true, "room": {"id": 101, "room_number": "101", "floor": 1}}),
        ));
        let (_id, mut rx) = h.registry.register();

        let _ = create_room(
            State(h.state.clone()),
            Json(json!({"id": 101, "room_number": "101", "floor": 1})),
        )
        .await;

        let events = drain_events(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "room_created");
        assert_eq!(events[0]["room"]["id"], 101);
    }

    #[tokio::test]
    async fn init_publishes_rooms_initialized() {
        let h = harness(MockUpstream::with_response(
            201,
            json!({"success": true, "rooms_count": 15}),
        ));
        let (_id, mut rx) = h.registry.register();

        let _ = init_data(State(h.state.clone())).await;

        let events = drain_events(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "rooms_initialized");
        assert_eq!(events[0]["roomsCount"], 15);
    }

    #[tokio::test]
    async fn mutation_makes_exactly_one_upstream_attempt() {
        let h = harness(MockUpstream::with_error(UpstreamError::Network(
            "refused".into(),
        )));

        let _ = cancel_reservation(State(h.state.clone()), Path("1".into())).await;
        assert_eq!(h.mock.call_count(), 1);
    }
}
