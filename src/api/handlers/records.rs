//! Patient records with field-level encryption.
//!
//! Clinical content (condition, treatment, notes) never reaches the database
//! in plaintext: it is folded into one JSON object, encrypted by the process
//! cipher, and stored as an opaque string. Reads decrypt transiently; a
//! ciphertext that fails to decrypt is a hard error, not missing data.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{PgPool, Row};
use tracing::{Instrument, error};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::crypto::FieldCipher;

use super::auth::principal::require_auth;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CreateRecordRequest {
    pub patient_id: Uuid,
    pub condition: String,
    pub treatment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RecordResponse {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub condition: String,
    pub treatment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[utoipa::path(
    post,
    path = "/v1/records",
    request_body = CreateRecordRequest,
    responses(
        (status = 201, description = "Record stored with encrypted clinical fields"),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Only doctors create records", body = String)
    ),
    tag = "records"
)]
pub async fn create_record(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    cipher: Extension<FieldCipher>,
    payload: Option<Json<CreateRecordRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if principal.role != "doctor" {
        return (StatusCode::FORBIDDEN, "Only doctors create records".to_string()).into_response();
    }

    let request: CreateRecordRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };
    if request.condition.trim().is_empty() || request.treatment.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            "Missing condition or treatment".to_string(),
        )
            .into_response();
    }

    let clinical = json!({
        "condition": request.condition,
        "treatment": request.treatment,
        "notes": request.notes,
    });
    let encrypted = match cipher.encrypt(&clinical) {
        Ok(encrypted) => encrypted,
        Err(err) => {
            error!("Failed to encrypt record payload: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let query = r"
        INSERT INTO patient_records (patient_id, doctor_id, encrypted_data)
        VALUES ($1, $2, $3)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(request.patient_id)
        .bind(principal.user_id)
        .bind(&encrypted)
        .execute(&pool.0)
        .instrument(span)
        .await;

    match result {
        Ok(_) => StatusCode::CREATED.into_response(),
        Err(err) => {
            error!("Failed to insert patient record: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/records",
    responses(
        (status = 200, description = "Decrypted records visible to the caller", body = [RecordResponse]),
        (status = 401, description = "Not authenticated")
    ),
    tag = "records"
)]
pub async fn list_records(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    cipher: Extension<FieldCipher>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    // Patients see their own records, doctors the ones they authored.
    let query = r"
        SELECT id, patient_id, doctor_id, encrypted_data, created_at
        FROM patient_records
        WHERE patient_id = $1 OR doctor_id = $1
        ORDER BY created_at DESC
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = match sqlx::query(query)
        .bind(principal.user_id)
        .fetch_all(&pool.0)
        .instrument(span)
        .await
    {
        Ok(rows) => rows,
        Err(err) => {
            error!("Failed to fetch patient records: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let id: Uuid = row.get("id");
        let encrypted: String = row.get("encrypted_data");
        // An undecryptable row signals key or integrity trouble; surfacing it
        // beats returning a silently incomplete list.
        let clinical = match cipher.decrypt(&encrypted) {
            Ok(value) => value,
            Err(err) => {
                error!(record_id = %id, "Failed to decrypt patient record: {err}");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };
        records.push(RecordResponse {
            id,
            patient_id: row.get("patient_id"),
            doctor_id: row.get("doctor_id"),
            condition: string_field(&clinical, "condition"),
            treatment: string_field(&clinical, "treatment"),
            notes: clinical
                .get("notes")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string),
            created_at: row.get("created_at"),
        });
    }

    (StatusCode::OK, Json(records)).into_response()
}

fn string_field(value: &serde_json::Value, key: &str) -> String {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clinical_payload_round_trips_through_cipher() {
        let cipher = FieldCipher::new(&[7u8; 32]).expect("cipher");
        let clinical = json!({
            "condition": "hypertension",
            "treatment": "lisinopril 10mg",
            "notes": null,
        });
        let encrypted = cipher.encrypt(&clinical).expect("encrypt");
        let decrypted = cipher.decrypt(&encrypted).expect("decrypt");
        assert_eq!(string_field(&decrypted, "condition"), "hypertension");
        assert_eq!(string_field(&decrypted, "treatment"), "lisinopril 10mg");
        assert!(decrypted.get("notes").is_some_and(serde_json::Value::is_null));
    }

    #[test]
    fn missing_fields_render_empty() {
        let value = json!({});
        assert_eq!(string_field(&value, "condition"), "");
    }
}
