use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current time as an ISO-8601 string, the timestamp format carried by
/// every broadcast event and by the health endpoint.
pub fn iso_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// State-change notifications broadcast to subscriber connections.
///
/// Events are immutable and serialized to a single JSON text frame:
/// `{"type": "...", ...fields, "timestamp": "<ISO-8601>"}`. The timestamp is
/// stamped by the gateway when the event is constructed, not by the upstream
/// service. Ids are stringified on the wire (`"roomId": "5"`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GatewayEvent {
    #[serde(rename = "room_created")]
    RoomCreated {
        room: Value,
        timestamp: String,
    },

    #[serde(rename = "room_status_update")]
    RoomStatusUpdate {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<String>,
        #[serde(rename = "previousStatus", skip_serializing_if = "Option::is_none")]
        previous_status: Option<String>,
        #[serde(rename = "newStatus", skip_serializing_if = "Option::is_none")]
        new_status: Option<String>,
        timestamp: String,
    },

    #[serde(rename = "guest_checkin")]
    GuestCheckin {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(rename = "guestName")]
        guest_name: String,
        timestamp: String,
    },

    #[serde(rename = "guest_checkout")]
    GuestCheckout {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(rename = "guestName", skip_serializing_if = "Option::is_none")]
        guest_name: Option<String>,
        timestamp: String,
    },

    #[serde(rename = "reservation_created")]
    ReservationCreated {
        #[serde(rename = "reservationId", skip_serializing_if = "Option::is_none")]
        reservation_id: Option<String>,
        #[serde(rename = "roomId", skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
        #[serde(rename = "guestName", skip_serializing_if = "Option::is_none")]
        guest_name: Option<String>,
        #[serde(rename = "checkInDate", skip_serializing_if = "Option::is_none")]
        check_in_date: Option<String>,
        #[serde(rename = "checkOutDate", skip_serializing_if = "Option::is_none")]
        check_out_date: Option<String>,
        timestamp: String,
    },

    #[serde(rename = "reservation_cancelled")]
    ReservationCancelled {
        #[serde(rename = "reservationId")]
        reservation_id: String,
        timestamp: String,
    },

    #[serde(rename = "rooms_initialized")]
    RoomsInitialized {
        #[serde(rename = "roomsCount", skip_serializing_if = "Option::is_none")]
        rooms_count: Option<i64>,
        timestamp: String,
    },
}

impl GatewayEvent {
    pub fn room_created(room: Value) -> Self {
        Self::RoomCreated {
            room,
            timestamp: iso_timestamp(),
        }
    }

    /// Status change driven by a `PUT .../status` request: carries the
    /// requested status.
    pub fn room_status_update(room_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self::RoomStatusUpdate {
            room_id: room_id.into(),
            status: Some(status.into()),
            previous_status: None,
            new_status: None,
            timestamp: iso_timestamp(),
        }
    }

    /// Status change derived from an upstream `room_status_update` sub-object
    /// (`{room_id, previous_status, new_status}`). Returns `None` when the
    /// sub-object carries no room id.
    pub fn room_status_transition(update: &Value) -> Option<Self> {
        let room_id = update.get("room_id").and_then(id_string)?;
        Some(Self::RoomStatusUpdate {
            room_id,
            status: None,
            previous_status: update
                .get("previous_status")
                .and_then(Value::as_str)
                .map(str::to_owned),
            new_status: update
                .get("new_status")
                .and_then(Value::as_str)
                .map(str::to_owned),
            timestamp: iso_timestamp(),
        })
    }

    pub fn guest_checkin(room_id: impl Into<String>, guest_name: impl Into<String>) -> Self {
        Self::GuestCheckin {
            room_id: room_id.into(),
            guest_name: guest_name.into(),
            timestamp: iso_timestamp(),
        }
    }

    pub fn guest_checkout(room_id: impl Into<String>, guest_name: Option<String>) -> Self {
        Self::GuestCheckout {
            room_id: room_id.into(),
            guest_name,
            timestamp: iso_timestamp(),
        }
    }

    /// Built from the upstream's reservation-created response body.
    pub fn reservation_created(body: &Value) -> Self {
        Self::ReservationCreated {
            reservation_id: body.get("reservation_id").and_then(id_string),
            room_id: body.get("room_id").and_then(id_string),
            guest_name: body
                .get("guest_name")
                .and_then(Value::as_str)
                .map(str::to_owned),
            check_in_date: body
                .get("check_in_date")
                .and_then(Value::as_str)
                .map(str::to_owned),
            check_out_date: body
                .get("check_out_date")
                .and_then(Value::as_str)
                .map(str::to_owned),
            timestamp: iso_timestamp(),
        }
    }

    pub fn reservation_cancelled(reservation_id: impl Into<String>) -> Self {
        Self::ReservationCancelled {
            reservation_id: reservation_id.into(),
            timestamp: iso_timestamp(),
        }
    }

    pub fn rooms_initialized(rooms_count: Option<i64>) -> Self {
        Self::RoomsInitialized {
            rooms_count,
            timestamp: iso_timestamp(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RoomCreated { .. } => "room_created",
            Self::RoomStatusUpdate { .. } => "room_status_update",
            Self::GuestCheckin { .. } => "guest_checkin",
            Self::GuestCheckout { .. } => "guest_checkout",
            Self::ReservationCreated { .. } => "reservation_created",
            Self::ReservationCancelled { .. } => "reservation_cancelled",
            Self::RoomsInitialized { .. } => "rooms_initialized",
        }
    }
}

/// Ids arrive from JSON as either strings or numbers; the wire format wants
/// strings.
fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
