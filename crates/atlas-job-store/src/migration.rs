//! Read-time schema migration.
//!
//! `get()` applies an in-memory migration to the current schema
//! version and flags the record for a background rewrite; callers
//! never observe an old shape. Migrating twice must equal migrating
//! once (§8 testable property), so each step is written to be
//! idempotent against its own output.

use atlas_types::{Job, CURRENT_SCHEMA_VERSION};

/// The one prior schema this workspace knows how to migrate from.
/// Differences from 1.0.0: no `heartbeat` field, and the failure
/// message lived under `errorMessage` instead of `error`.
const LEGACY_SCHEMA_VERSION: &str = "0.9.0";

pub struct MigrationOutcome {
    pub job: Job,
    pub rewritten: bool,
}

/// Migrate a raw stored record to the current schema. Returns the
/// parsed `Job` plus whether a rewrite is owed to the store.
pub fn migrate_to_current(mut raw: serde_json::Value) -> Result<MigrationOutcome, serde_json::Error> {
    let stored_version = raw
        .get("schemaVersion")
        .and_then(|v| v.as_str())
        .unwrap_or(LEGACY_SCHEMA_VERSION)
        .to_string();

    let mut rewritten = false;

    if stored_version == LEGACY_SCHEMA_VERSION {
        if let Some(obj) = raw.as_object_mut() {
            if let Some(legacy_error) = obj.remove("errorMessage") {
                obj.entry("error").or_insert(legacy_error);
            }
            obj.entry("heartbeat").or_insert(serde_json::Value::Null);
            obj.insert(
                "schemaVersion".to_string(),
                serde_json::Value::String(CURRENT_SCHEMA_VERSION.to_string()),
            );
            rewritten = true;
        }
    } else if stored_version != CURRENT_SCHEMA_VERSION {
        // Unknown future/foreign version: best effort, stamp current
        // version on read so later reads short-circuit. Idempotent:
        // a record already stamped current never re-enters this arm.
        if let Some(obj) = raw.as_object_mut() {
            obj.insert(
                "schemaVersion".to_string(),
                serde_json::Value::String(CURRENT_SCHEMA_VERSION.to_string()),
            );
        }
        rewritten = true;
    }

    let job: Job = serde_json::from_value(raw)?;
    Ok(MigrationOutcome { job, rewritten })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn legacy_record() -> serde_json::Value {
        json!({
            "id": "00000000-0000-0000-0000-000000000001",
            "type": "sync-extract",
            "status": "failed",
            "url": "https://example.com",
            "params": {"extractionInstructions": "title"},
            "errorMessage": "fetch timed out",
            "createdAt": "2026-01-01T00:00:00Z",
            "updatedAt": "2026-01-01T00:00:05Z",
            "logs": [],
            "correlationId": "corr-1",
        })
    }

    #[test]
    fn migrates_legacy_error_message_field() {
        let outcome = migrate_to_current(legacy_record()).expect("migration succeeds");
        assert!(outcome.rewritten);
        assert_eq!(outcome.job.error.as_deref(), Some("fetch timed out"));
        assert_eq!(outcome.job.schema_version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn migrating_twice_equals_migrating_once() {
        let once = migrate_to_current(legacy_record()).unwrap();
        let raw_again = serde_json::to_value(&once.job).unwrap();
        let twice = migrate_to_current(raw_again).unwrap();
        assert!(!twice.rewritten);
        assert_eq!(once.job.error, twice.job.error);
        assert_eq!(once.job.schema_version, twice.job.schema_version);
    }
}
